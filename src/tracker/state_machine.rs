use chrono::{DateTime, Utc};

use crate::config::DetectionConfig;
use crate::models::{Cabin, CabinStatus, DetectionMethod, DetectionResult, SessionRecord};

/// How an ongoing session's duration is advanced while a cabin stays active.
#[derive(Debug, Clone, Copy)]
pub enum DurationAdvance {
    /// Scheduler-driven results: add the poll interval each cycle.
    ByInterval(i64),
    /// Externally ingested results: recompute from the session start.
    SinceSessionStart,
}

/// The full set of mutations one detection applies to a cabin record.
/// Produced by [`evaluate`]; persisted atomically by the caller.
#[derive(Debug)]
pub struct StatusUpdate {
    pub status: CabinStatus,
    pub session_start: Option<DateTime<Utc>>,
    pub session_duration: i64,
    pub last_activity: DateTime<Utc>,
    pub closed_session: Option<SessionRecord>,
}

/// Map a detection result plus the cabin's current record to its next state.
///
/// Pure function: persistence of the returned update happens in the caller's
/// apply step. Priority order: camera error wins, then activity, then the
/// idle brightness band, then long break.
pub fn evaluate(
    cabin: &Cabin,
    detection: &DetectionResult,
    now: DateTime<Utc>,
    advance: DurationAdvance,
    config: &DetectionConfig,
) -> StatusUpdate {
    let status = next_status(detection, config);

    let mut update = StatusUpdate {
        status,
        session_start: None,
        session_duration: 0,
        last_activity: now,
        closed_session: None,
    };

    if status == CabinStatus::Active {
        match cabin.current_session_start {
            Some(start) if cabin.status == CabinStatus::Active => {
                update.session_start = Some(start);
                update.session_duration = match advance {
                    DurationAdvance::ByInterval(secs) => cabin.current_session_duration + secs,
                    DurationAdvance::SinceSessionStart => (now - start).num_seconds().max(0),
                };
            }
            _ => {
                // Entering active from any other state starts a new session.
                update.session_start = Some(now);
                update.session_duration = 0;
            }
        }
        return update;
    }

    // Leaving active closes the open session; accumulated time at or below
    // the minimum is noise and is discarded. Session fields are cleared
    // either way.
    if cabin.status == CabinStatus::Active {
        if let Some(start) = cabin.current_session_start {
            if cabin.current_session_duration > config.min_session_secs {
                update.closed_session = Some(SessionRecord::close(
                    cabin.cabin_no,
                    cabin.student_id.clone(),
                    cabin.student_name.clone(),
                    start,
                    now,
                    cabin.current_session_duration,
                    DetectionMethod::Tracking,
                ));
            }
        }
    }

    update
}

fn next_status(detection: &DetectionResult, config: &DetectionConfig) -> CabinStatus {
    if detection.error.is_some() {
        // Camera unreachable: conservative default, never fabricate occupancy.
        CabinStatus::Empty
    } else if detection.is_active {
        CabinStatus::Active
    } else if detection.brightness > config.idle_brightness_threshold {
        CabinStatus::Idle
    } else {
        CabinStatus::LongBreak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_cabin(status: CabinStatus, session_secs: i64, now: DateTime<Utc>) -> Cabin {
        let mut cabin = Cabin::new(3, "http://camera.local/3".to_string(), now);
        cabin.student_id = Some("s-42".to_string());
        cabin.student_name = Some("Jae".to_string());
        cabin.status = status;
        if status == CabinStatus::Active {
            cabin.current_session_start = Some(now - Duration::seconds(session_secs));
            cabin.current_session_duration = session_secs;
        }
        cabin
    }

    fn detection(is_active: bool, brightness: f64) -> DetectionResult {
        DetectionResult {
            is_active,
            confidence: if is_active { 0.8 } else { 0.1 },
            method: DetectionMethod::MotionDetection,
            brightness,
            motion_detected: is_active,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn entering_active_starts_a_fresh_session() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Empty, 0, now);

        let update = evaluate(
            &cabin,
            &detection(true, 0.6),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::Active);
        assert_eq!(update.session_start, Some(now));
        assert_eq!(update.session_duration, 0);
        assert!(update.closed_session.is_none());
    }

    #[test]
    fn staying_active_advances_duration_by_poll_interval() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Active, 45, now);

        let update = evaluate(
            &cabin,
            &detection(true, 0.6),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::Active);
        assert_eq!(update.session_start, cabin.current_session_start);
        assert_eq!(update.session_duration, 50);
        assert!(update.closed_session.is_none());
    }

    #[test]
    fn ingested_results_recompute_duration_from_session_start() {
        let now = Utc::now();
        let mut cabin = test_cabin(CabinStatus::Active, 45, now);
        cabin.current_session_start = Some(now - Duration::seconds(300));

        let update = evaluate(
            &cabin,
            &detection(true, 0.6),
            now,
            DurationAdvance::SinceSessionStart,
            &DetectionConfig::default(),
        );

        assert_eq!(update.session_duration, 300);
    }

    #[test]
    fn repeated_active_results_never_close_a_session() {
        let now = Utc::now();
        let mut cabin = test_cabin(CabinStatus::Active, 45, now);

        for _ in 0..10 {
            let update = evaluate(
                &cabin,
                &detection(true, 0.6),
                now,
                DurationAdvance::ByInterval(5),
                &DetectionConfig::default(),
            );
            assert!(update.closed_session.is_none());
            cabin.current_session_duration = update.session_duration;
        }

        assert_eq!(cabin.current_session_duration, 95);
    }

    #[test]
    fn short_session_is_discarded_on_transition_to_idle() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Active, 45, now);

        let update = evaluate(
            &cabin,
            &detection(false, 0.35),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::Idle);
        assert!(update.closed_session.is_none());
        assert_eq!(update.session_start, None);
        assert_eq!(update.session_duration, 0);
    }

    #[test]
    fn long_session_is_recorded_on_transition_to_long_break() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Active, 120, now);

        let update = evaluate(
            &cabin,
            &detection(false, 0.1),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::LongBreak);
        let record = update.closed_session.expect("session should be recorded");
        assert_eq!(record.duration, 120);
        assert_eq!(record.cabin_no, cabin.cabin_no);
        assert_eq!(record.student_id, cabin.student_id);
        assert_eq!(record.start_time, cabin.current_session_start.unwrap());
        assert_eq!(record.end_time, now);
        assert_eq!(record.detection_method, DetectionMethod::Tracking);
    }

    #[test]
    fn camera_error_downgrades_to_empty_and_closes_open_session() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Active, 120, now);

        let offline = DetectionResult::camera_offline("connection timed out".to_string(), now);
        let update = evaluate(
            &cabin,
            &offline,
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::Empty);
        assert!(update.closed_session.is_some());
        assert_eq!(update.session_start, None);
        assert_eq!(update.session_duration, 0);
    }

    #[test]
    fn brightness_band_separates_idle_from_long_break() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Empty, 0, now);
        let config = DetectionConfig::default();

        let idle = evaluate(
            &cabin,
            &detection(false, 0.35),
            now,
            DurationAdvance::ByInterval(5),
            &config,
        );
        assert_eq!(idle.status, CabinStatus::Idle);

        let dark = evaluate(
            &cabin,
            &detection(false, 0.2),
            now,
            DurationAdvance::ByInterval(5),
            &config,
        );
        assert_eq!(dark.status, CabinStatus::LongBreak);
    }

    #[test]
    fn non_active_transitions_still_refresh_last_activity() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Idle, 0, now);

        let update = evaluate(
            &cabin,
            &detection(false, 0.1),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert_eq!(update.status, CabinStatus::LongBreak);
        assert_eq!(update.last_activity, now);
        assert!(update.closed_session.is_none());
    }

    #[test]
    fn session_exactly_at_minimum_is_not_recorded() {
        let now = Utc::now();
        let cabin = test_cabin(CabinStatus::Active, 60, now);

        let update = evaluate(
            &cabin,
            &detection(false, 0.1),
            now,
            DurationAdvance::ByInterval(5),
            &DetectionConfig::default(),
        );

        assert!(update.closed_session.is_none());
    }
}
