//! Stream session state machine
//!
//! One session per connected client. The session opens its own camera and
//! detector, then loops capture → detect → resolve → emit until the client
//! goes away or the server shuts down. Resources are released exactly once
//! on every exit path.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::camera::FrameSource;
use crate::config::{CameraConfig, Config, DetectorConfig, StreamConfig};
use crate::error::MirrorError;
use crate::tracking::{anchors, AnchorFrame, LandmarkDetector, RawLandmarkSet};

use super::backend::{SessionBackend, SessionResources};
use super::message::{StreamMessage, CAPTURE_FAILED_ERROR};

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Streaming,
    Closing,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Initializing => write!(f, "initializing"),
            SessionPhase::Streaming => write!(f, "streaming"),
            SessionPhase::Closing => write!(f, "closing"),
            SessionPhase::Closed => write!(f, "closed"),
        }
    }
}

/// Result of one capture → detect → resolve step
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Face found and resolved
    Face {
        anchors: AnchorFrame,
        raw: RawLandmarkSet,
    },
    /// Frame processed, no face in it
    NoFace,
    /// The camera produced no frame
    CaptureFailed,
    /// Processing failed for this frame only
    Failed(String),
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Client went away
    Disconnected,
    /// Server is shutting down
    Shutdown,
    /// Camera or detector could not be opened
    InitFailed,
}

/// What a finished session reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: u64,
    pub frames_processed: u64,
    pub exit: SessionExit,
    pub phase: SessionPhase,
}

/// A single client's streaming loop
pub struct StreamSession {
    id: u64,
    camera: CameraConfig,
    detector: DetectorConfig,
    stream: StreamConfig,
    phase: SessionPhase,
    frame_count: u64,
}

impl StreamSession {
    pub fn new(id: u64, config: &Config) -> Self {
        Self {
            id,
            camera: config.camera.clone(),
            detector: config.detector.clone(),
            stream: config.stream.clone(),
            phase: SessionPhase::Initializing,
            frame_count: 0,
        }
    }

    fn transition(&mut self, next: SessionPhase) {
        tracing::debug!("Session {}: {} -> {}", self.id, self.phase, next);
        self.phase = next;
    }

    /// Run the session to completion.
    ///
    /// Messages go out through `outbound` in production order. A closed
    /// `outbound` is the disconnect signal; a message on `shutdown` stops
    /// the session at its next await, including mid-initialization and
    /// mid-detection.
    pub async fn run(
        mut self,
        backend: &dyn SessionBackend,
        outbound: mpsc::Sender<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SessionSummary {
        tracing::info!("Session {} started", self.id);

        let mut resources = SessionResources::default();

        let initialized = tokio::select! {
            biased;
            _ = shutdown.recv() => Err(SessionExit::Shutdown),
            _ = outbound.closed() => Err(SessionExit::Disconnected),
            result = self.initialize(backend, &mut resources) => Ok(result),
        };

        let exit = match initialized {
            Err(exit) => exit,
            Ok(Ok(())) => {
                self.transition(SessionPhase::Streaming);
                self.stream(&mut resources, &outbound, &mut shutdown).await
            }
            Ok(Err(e)) => {
                tracing::error!("Session {} failed to initialize: {}", self.id, e);
                self.transition(SessionPhase::Closing);
                let report = StreamMessage::error(format!("Server error: {}", e), 0.0, 0);
                // Best effort; the client may already be gone
                let _ = outbound.try_send(report);
                SessionExit::InitFailed
            }
        };

        if self.phase != SessionPhase::Closing {
            self.transition(SessionPhase::Closing);
        }
        resources.release();
        self.transition(SessionPhase::Closed);

        tracing::info!(
            "Session {} closed ({:?}). Total frames processed: {}",
            self.id,
            exit,
            self.frame_count
        );

        SessionSummary {
            id: self.id,
            frames_processed: self.frame_count,
            exit,
            phase: self.phase,
        }
    }

    async fn initialize(
        &mut self,
        backend: &dyn SessionBackend,
        resources: &mut SessionResources,
    ) -> Result<(), MirrorError> {
        resources.source = Some(backend.open_frame_source(&self.camera).await?);
        resources.detector = Some(backend.open_detector(&self.detector).await?);
        tracing::info!("Session {}: camera and detector initialized", self.id);
        Ok(())
    }

    async fn stream(
        &mut self,
        resources: &mut SessionResources,
        outbound: &mpsc::Sender<StreamMessage>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionExit {
        let (Some(source), Some(detector)) =
            (resources.source.as_mut(), resources.detector.as_mut())
        else {
            return SessionExit::InitFailed;
        };

        loop {
            if outbound.is_closed() {
                return SessionExit::Disconnected;
            }
            if !matches!(
                shutdown.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                return SessionExit::Shutdown;
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.recv() => return SessionExit::Shutdown,
                _ = outbound.closed() => return SessionExit::Disconnected,
                outcome = self.cycle(source, &mut **detector) => outcome,
            };
            let (message, delay) = self.package(outcome, source.current_fps());

            tokio::select! {
                biased;
                _ = shutdown.recv() => return SessionExit::Shutdown,
                sent = outbound.send(message) => {
                    if sent.is_err() {
                        return SessionExit::Disconnected;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => return SessionExit::Shutdown,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One capture → detect → resolve step. Never fails; failures are
    /// reported in the outcome.
    async fn cycle(
        &mut self,
        source: &mut FrameSource,
        detector: &mut dyn LandmarkDetector,
    ) -> CycleOutcome {
        let Some(frame) = source.capture() else {
            return CycleOutcome::CaptureFailed;
        };

        match detector.process(&frame).await {
            Ok(Some(raw)) => {
                self.frame_count += 1;
                CycleOutcome::Face {
                    anchors: anchors::resolve(&raw),
                    raw,
                }
            }
            Ok(None) => {
                self.frame_count += 1;
                CycleOutcome::NoFace
            }
            Err(e) => CycleOutcome::Failed(e.to_string()),
        }
    }

    fn package(&self, outcome: CycleOutcome, fps: f32) -> (StreamMessage, Duration) {
        let cycle_delay = Duration::from_millis(self.stream.cycle_delay_ms);
        let retry_delay = Duration::from_millis(self.stream.retry_delay_ms);

        match outcome {
            CycleOutcome::Face { anchors, raw } => {
                let mut message = StreamMessage::anchors(anchors, fps, self.frame_count);
                if self.stream.include_all_landmarks {
                    message = message.with_all_landmarks(raw.points().to_vec());
                }
                (message, cycle_delay)
            }
            CycleOutcome::NoFace => (StreamMessage::no_face(fps, self.frame_count), cycle_delay),
            CycleOutcome::CaptureFailed => (
                StreamMessage::error(CAPTURE_FAILED_ERROR, fps, self.frame_count),
                retry_delay,
            ),
            CycleOutcome::Failed(description) => {
                tracing::warn!("Session {}: error in processing loop: {}", self.id, description);
                (
                    StreamMessage::error(description, fps, self.frame_count),
                    retry_delay,
                )
            }
        }
    }
}
