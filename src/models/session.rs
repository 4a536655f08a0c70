use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DetectionMethod;

/// A closed, immutable record of one continuous period a cabin was active.
/// Created only when a cabin leaves `Active` with enough accumulated time;
/// never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub cabin_no: i64,
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Seconds the cabin was active.
    pub duration: i64,
    pub detection_method: DetectionMethod,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn close(
        cabin_no: i64,
        student_id: Option<String>,
        student_name: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration: i64,
        detection_method: DetectionMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cabin_no,
            student_id,
            student_name,
            start_time,
            end_time,
            duration,
            detection_method,
            created_at: end_time,
        }
    }
}
