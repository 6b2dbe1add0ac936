//! Camera module
//!
//! Frame acquisition for the streaming pipeline:
//! - `FrameSource`: owns one camera device, tracks throughput
//! - `FpsCounter`: one-second windowed frame rate
//! - `worker`: capture thread for devices that cannot leave their thread
//! - `native`: nokhwa-backed device (`native-camera` feature)

pub mod fps;
#[cfg(feature = "native-camera")]
pub mod native;
pub mod worker;

pub use fps::FpsCounter;

use crate::config::CameraConfig;
use crate::error::CameraError;

/// A captured BGR pixel buffer, row-major, 3 bytes per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// An opened capture device.
///
/// A failed read returns `None`; it is an expected, transient outcome.
pub trait CameraDevice: Send {
    /// Read the next frame
    fn read_frame(&mut self) -> Option<Frame>;

    /// Resolution the device actually negotiated, if known
    fn negotiated_size(&self) -> Option<(u32, u32)> {
        None
    }

    /// Human-readable device name
    fn name(&self) -> String;

    /// Release the device handle
    fn release(&mut self);
}

/// Frame producer for one session.
///
/// The device is released at most once, on the first call to
/// [`FrameSource::release`] or on drop, whichever comes first.
pub struct FrameSource {
    device: Option<Box<dyn CameraDevice>>,
    width: u32,
    height: u32,
    fps: FpsCounter,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("is_open", &self.is_open())
            .field("fps", &self.fps.fps())
            .finish()
    }
}

impl FrameSource {
    /// Open the configured camera.
    ///
    /// Fails if the device cannot be opened; this is never retried.
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        #[cfg(feature = "native-camera")]
        {
            let device = native::NativeCamera::open(config)?;
            Ok(Self::with_device(Box::new(device), config))
        }

        #[cfg(not(feature = "native-camera"))]
        {
            Err(CameraError::Unsupported(format!(
                "camera {} requested but this build lacks the `native-camera` feature",
                config.device_id
            )))
        }
    }

    /// Wrap an already-opened device
    pub fn with_device(device: Box<dyn CameraDevice>, config: &CameraConfig) -> Self {
        match device.negotiated_size() {
            Some((w, h)) => tracing::info!(
                "Camera initialized: {} at {}x{} (requested {}x{})",
                device.name(),
                w,
                h,
                config.width,
                config.height
            ),
            None => tracing::info!(
                "Camera initialized: {} (requested {}x{})",
                device.name(),
                config.width,
                config.height
            ),
        }

        Self {
            device: Some(device),
            width: config.width,
            height: config.height,
            fps: FpsCounter::new(),
        }
    }

    /// Capture one frame; `None` if the device is released or the read failed.
    pub fn capture(&mut self) -> Option<Frame> {
        let device = self.device.as_mut()?;

        match device.read_frame() {
            Some(frame) => {
                self.fps.record();
                Some(frame)
            }
            None => {
                tracing::debug!("Failed to capture frame");
                None
            }
        }
    }

    /// Frame rate at the last window boundary
    pub fn current_fps(&self) -> f32 {
        self.fps.fps()
    }

    /// Configured (nominal) frame size
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Release the device. Repeat calls are no-ops.
    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            tracing::info!("Camera released");
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Device that replays a script of reads, then repeats the last entry.
    pub struct ScriptedCamera {
        script: VecDeque<bool>,
        last: bool,
        pub releases: Arc<AtomicUsize>,
    }

    impl ScriptedCamera {
        /// `true` entries yield a frame, `false` entries a failed read
        pub fn new(script: &[bool]) -> Self {
            Self {
                script: script.iter().copied().collect(),
                last: script.last().copied().unwrap_or(true),
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn always_ok() -> Self {
            Self::new(&[true])
        }
    }

    impl CameraDevice for ScriptedCamera {
        fn read_frame(&mut self) -> Option<Frame> {
            let ok = self.script.pop_front().unwrap_or(self.last);
            ok.then(|| Frame::new(2, 1, vec![10, 20, 30, 40, 50, 60]))
        }

        fn negotiated_size(&self) -> Option<(u32, u32)> {
            Some((640, 480))
        }

        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
