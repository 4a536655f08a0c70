use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CabinStatus {
    Active,
    Idle,
    LongBreak,
    Empty,
}

impl Default for CabinStatus {
    fn default() -> Self {
        CabinStatus::Empty
    }
}

impl CabinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinStatus::Active => "active",
            CabinStatus::Idle => "idle",
            CabinStatus::LongBreak => "long_break",
            CabinStatus::Empty => "empty",
        }
    }
}

/// A monitored physical cabin with a camera feed and an optional assigned
/// occupant. Status and session fields are mutated only by the state machine
/// apply path or by assignment actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cabin {
    pub cabin_no: i64,
    pub camera_url: String,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub status: CabinStatus,
    /// Non-null exactly while the cabin is `Active`.
    pub current_session_start: Option<DateTime<Utc>>,
    /// Seconds accumulated in the current active session.
    pub current_session_duration: i64,
    pub last_activity: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cabin {
    pub fn new(cabin_no: i64, camera_url: String, now: DateTime<Utc>) -> Self {
        Self {
            cabin_no,
            camera_url,
            student_id: None,
            student_name: None,
            status: CabinStatus::Empty,
            current_session_start: None,
            current_session_duration: 0,
            last_activity: None,
            created_at: now,
            updated_at: now,
        }
    }
}
