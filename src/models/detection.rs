use anyhow::{anyhow, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The signal that justified an activity classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MotionDetection,
    BrightnessDetection,
    CameraOffline,
    Tracking,
    Manual,
}

impl Default for DetectionMethod {
    fn default() -> Self {
        DetectionMethod::Manual
    }
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::MotionDetection => "motion_detection",
            DetectionMethod::BrightnessDetection => "brightness_detection",
            DetectionMethod::CameraOffline => "camera_offline",
            DetectionMethod::Tracking => "tracking",
            DetectionMethod::Manual => "manual",
        }
    }
}

impl FromStr for DetectionMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "motion_detection" => Ok(DetectionMethod::MotionDetection),
            "brightness_detection" => Ok(DetectionMethod::BrightnessDetection),
            "camera_offline" => Ok(DetectionMethod::CameraOffline),
            "tracking" => Ok(DetectionMethod::Tracking),
            "manual" => Ok(DetectionMethod::Manual),
            _ => Err(anyhow!("unknown detection method '{value}'")),
        }
    }
}

/// One classification of a cabin's occupancy at a point in time, regardless
/// of whether it was computed locally or submitted by an external probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_active: bool,
    pub confidence: f64,
    pub method: DetectionMethod,
    pub brightness: f64,
    pub motion_detected: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    /// Degraded result for a camera that could not be reached.
    pub fn camera_offline(message: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            is_active: false,
            confidence: 0.0,
            method: DetectionMethod::CameraOffline,
            brightness: 0.0,
            motion_detected: false,
            error: Some(message),
            timestamp,
        }
    }
}

/// Detection payload submitted by an external probe, bypassing the local
/// camera analysis pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionSubmission {
    pub is_active: bool,
    #[serde(default)]
    pub method: DetectionMethod,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub brightness: Option<f64>,
}

impl DetectionSubmission {
    pub fn into_result(self, timestamp: DateTime<Utc>) -> DetectionResult {
        DetectionResult {
            is_active: self.is_active,
            confidence: self.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
            method: self.method,
            brightness: self.brightness.unwrap_or(0.0).clamp(0.0, 1.0),
            motion_detected: false,
            error: None,
            timestamp,
        }
    }
}
