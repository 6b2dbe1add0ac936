//! Per-session resource acquisition

use futures::future::{BoxFuture, FutureExt};

use crate::camera::FrameSource;
use crate::config::{CameraConfig, DetectorConfig};
use crate::error::{CameraError, DetectorError};
use crate::tracking::{FaceMeshProcess, LandmarkDetector};

/// Opens the camera and detector a session owns.
///
/// Each call opens a fresh instance; nothing is shared between sessions.
/// Opening may take a while (device negotiation, model load) and is awaited
/// against the session's shutdown signal.
pub trait SessionBackend: Send + Sync {
    fn open_frame_source<'a>(
        &'a self,
        config: &'a CameraConfig,
    ) -> BoxFuture<'a, Result<FrameSource, CameraError>>;

    fn open_detector<'a>(
        &'a self,
        config: &'a DetectorConfig,
    ) -> BoxFuture<'a, Result<Box<dyn LandmarkDetector>, DetectorError>>;
}

/// Real camera plus the face mesh helper process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SessionBackend for SystemBackend {
    fn open_frame_source<'a>(
        &'a self,
        config: &'a CameraConfig,
    ) -> BoxFuture<'a, Result<FrameSource, CameraError>> {
        let config = config.clone();
        async move {
            // Device open blocks until the driver answers
            tokio::task::spawn_blocking(move || FrameSource::open(&config))
                .await
                .map_err(|e| CameraError::Worker(e.to_string()))?
        }
        .boxed()
    }

    fn open_detector<'a>(
        &'a self,
        config: &'a DetectorConfig,
    ) -> BoxFuture<'a, Result<Box<dyn LandmarkDetector>, DetectorError>> {
        async move {
            let detector: Box<dyn LandmarkDetector> =
                Box::new(FaceMeshProcess::spawn(config).await?);
            Ok(detector)
        }
        .boxed()
    }
}

/// Camera and detector held for a session's lifetime.
///
/// Either slot may be empty if initialization stopped part way. Both are
/// released on [`SessionResources::release`] or drop, once.
#[derive(Default)]
pub struct SessionResources {
    pub source: Option<FrameSource>,
    pub detector: Option<Box<dyn LandmarkDetector>>,
}

impl SessionResources {
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        if let Some(mut detector) = self.detector.take() {
            detector.release();
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}
