use anyhow::{Context, Result};
use chrono::Utc;
use image::GrayImage;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::DetectionConfig;
use crate::models::{DetectionMethod, DetectionResult};

use super::brightness;
use super::frame_source::FrameSource;
use super::motion::MotionDetector;
use super::smoothing::DetectionSmoother;

/// Analyzer state for one cabin: previous-frame buffer and detection
/// history. Never shared across cabins.
struct CabinAnalyzers {
    motion: MotionDetector,
    smoother: DetectionSmoother,
}

/// Runs the full detection pipeline for a cabin: fetch a snapshot, score
/// motion and brightness, smooth the raw classification.
///
/// Per-cabin analyzer state lives in a map keyed by cabin number. The
/// scheduler never runs two inspections of the same cabin concurrently, so
/// each cabin's inner lock is uncontended in practice.
pub struct CabinInspector {
    config: DetectionConfig,
    frames: FrameSource,
    analyzers: Mutex<HashMap<i64, Arc<Mutex<CabinAnalyzers>>>>,
}

impl CabinInspector {
    pub fn new(config: DetectionConfig) -> Self {
        let frames = FrameSource::new(Duration::from_secs(config.camera_timeout_secs));
        Self {
            config,
            frames,
            analyzers: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a frame and classify the cabin.
    ///
    /// A camera that cannot be reached yields a degraded offline result
    /// (`Ok`). An undecodable payload or a worker failure is an `Err`; the
    /// caller logs it and keeps the cabin's previous status.
    pub async fn inspect(&self, cabin_no: i64, camera_url: &str) -> Result<DetectionResult> {
        let url = camera_url.to_string();
        let source = self.frames.clone();
        let bytes = tokio::task::spawn_blocking(move || source.fetch(&url))
            .await
            .context("frame fetch worker join failed")?;

        let Some(bytes) = bytes else {
            return Ok(DetectionResult::camera_offline(
                "camera offline or unreachable".to_string(),
                Utc::now(),
            ));
        };

        let analyzers = self.analyzers_for(cabin_no);
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let gray = decode_grayscale(&bytes)?;
            let mut guard = analyzers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Ok(analyze_frame(&mut guard, &gray, &config))
        })
        .await
        .context("analysis worker join failed")?
    }

    /// Drop analyzer state for cabins that are no longer monitored, so a
    /// cabin that is later reassigned starts from a fresh baseline.
    pub fn retain_cabins(&self, monitored: &HashSet<i64>) {
        let mut map = self
            .analyzers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.retain(|cabin_no, _| monitored.contains(cabin_no));
    }

    fn analyzers_for(&self, cabin_no: i64) -> Arc<Mutex<CabinAnalyzers>> {
        let mut map = self
            .analyzers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(cabin_no)
            .or_insert_with(|| {
                Arc::new(Mutex::new(CabinAnalyzers {
                    motion: MotionDetector::new(
                        self.config.motion_threshold,
                        self.config.min_motion_area,
                    ),
                    smoother: DetectionSmoother::new(
                        self.config.smoothing_window,
                        self.config.smoothing_majority,
                    ),
                }))
            })
            .clone()
    }
}

fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage> {
    let img = image::load_from_memory(bytes).context("failed to decode camera frame")?;
    Ok(img.to_luma8())
}

fn analyze_frame(
    analyzers: &mut CabinAnalyzers,
    gray: &GrayImage,
    config: &DetectionConfig,
) -> DetectionResult {
    let (motion_detected, motion_confidence) = analyzers.motion.detect(gray);
    let brightness = brightness::score(gray);

    let raw_active = motion_detected || brightness > config.brightness_threshold;
    let smoothed = analyzers.smoother.smooth(raw_active);
    let is_active = if config.smoothing_enabled {
        smoothed
    } else {
        raw_active
    };

    DetectionResult {
        is_active,
        confidence: motion_confidence.max(brightness),
        method: if motion_detected {
            DetectionMethod::MotionDetection
        } else {
            DetectionMethod::BrightnessDetection
        },
        brightness,
        motion_detected,
        error: None,
        timestamp: Utc::now(),
    }
}
