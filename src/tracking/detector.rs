//! Landmark detector contract
//!
//! The face landmark model is a black box: a BGR pixel buffer goes in, at
//! most one face's landmark set comes out. "No face" is a normal result,
//! not an error.

use futures::future::BoxFuture;

use crate::camera::Frame;
use crate::config::DetectorConfig;
use crate::error::DetectorError;

use super::landmarks::RawLandmarkSet;

/// Settings handed to a detector at construction time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub max_faces: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl From<&DetectorConfig> for DetectorSettings {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            max_faces: config.max_faces,
            min_detection_confidence: config.min_detection_confidence,
            min_tracking_confidence: config.min_tracking_confidence,
        }
    }
}

/// A face landmark model.
///
/// Implementations own their model state exclusively; one session, one
/// detector. `process` must finish in bounded time and must tolerate being
/// dropped part way; the next call still has to answer for its own frame.
pub trait LandmarkDetector: Send {
    /// Detect the primary face in `frame`.
    ///
    /// Resolves to `Ok(None)` when no face clears the confidence threshold.
    fn process<'a>(
        &'a mut self,
        frame: &'a Frame,
    ) -> BoxFuture<'a, Result<Option<RawLandmarkSet>, DetectorError>>;

    /// Release the model. Repeat calls are no-ops.
    fn release(&mut self);
}
