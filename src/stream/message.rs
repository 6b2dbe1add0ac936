//! Messages pushed to the client

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::tracking::{AnchorFrame, Point3D};

pub const NO_FACE_MESSAGE: &str = "No face detected";
pub const CAPTURE_FAILED_ERROR: &str = "Failed to capture frame";

/// One message on the landmark stream.
///
/// Either `landmarks` (face present), `message` (no face) or `error` is set;
/// never more than one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Wall clock, seconds since the Unix epoch
    pub timestamp: f64,
    pub fps: f32,
    pub frame_count: u64,
    pub face_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<AnchorFrame>,
    /// Full raw landmark set, only when enabled in the stream config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_landmarks: Option<Vec<Point3D>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamMessage {
    fn base(fps: f32, frame_count: u64) -> Self {
        Self {
            timestamp: unix_timestamp(),
            fps,
            frame_count,
            face_detected: false,
            landmarks: None,
            all_landmarks: None,
            message: None,
            error: None,
        }
    }

    /// Face present, with resolved anchors
    pub fn anchors(anchors: AnchorFrame, fps: f32, frame_count: u64) -> Self {
        Self {
            face_detected: true,
            landmarks: Some(anchors),
            ..Self::base(fps, frame_count)
        }
    }

    /// Attach the full landmark set
    pub fn with_all_landmarks(mut self, points: Vec<Point3D>) -> Self {
        self.all_landmarks = Some(points);
        self
    }

    /// Frame processed, no face in it
    pub fn no_face(fps: f32, frame_count: u64) -> Self {
        Self {
            message: Some(NO_FACE_MESSAGE.to_string()),
            ..Self::base(fps, frame_count)
        }
    }

    /// Abnormal condition
    pub fn error(description: impl Into<String>, fps: f32, frame_count: u64) -> Self {
        Self {
            error: Some(description.into()),
            ..Self::base(fps, frame_count)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Current wall-clock time as fractional seconds
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
