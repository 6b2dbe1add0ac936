//! nokhwa camera device
//!
//! nokhwa's `Camera` is not `Send`, so it is opened and driven on a
//! [`CaptureWorker`] thread.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

use super::worker::{CaptureDevice, CaptureWorker, WorkerTimeouts};
use super::{CameraDevice, Frame};
use crate::config::CameraConfig;
use crate::error::CameraError;

struct OpenedCamera {
    name: String,
    width: u32,
    height: u32,
}

/// Camera device running on its own capture thread
pub struct NativeCamera {
    worker: CaptureWorker,
    name: String,
    negotiated: (u32, u32),
}

impl NativeCamera {
    /// Open the device on a new capture thread
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let settings = config.clone();
        let (worker, opened) = CaptureWorker::spawn(
            format!("camera-{}", config.device_id),
            WorkerTimeouts::default(),
            move || open_camera(&settings),
        )?;

        Ok(Self {
            worker,
            name: opened.name,
            negotiated: (opened.width, opened.height),
        })
    }
}

impl CameraDevice for NativeCamera {
    fn read_frame(&mut self) -> Option<Frame> {
        self.worker.read_frame()
    }

    fn negotiated_size(&self) -> Option<(u32, u32)> {
        Some(self.negotiated)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn release(&mut self) {
        self.worker.release();
    }
}

/// nokhwa handle living on the capture thread
struct NokhwaDevice {
    camera: Camera,
}

impl CaptureDevice for NokhwaDevice {
    fn grab(&mut self) -> Option<Frame> {
        let buffer = match self.camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::debug!("Camera read failed: {}", e);
                return None;
            }
        };

        let image = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("Frame decode failed: {}", e);
                return None;
            }
        };

        let (width, height) = (image.width(), image.height());
        let mut data = image.into_raw();
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }

        Some(Frame::new(width, height, data))
    }

    fn stop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}

fn open_camera(config: &CameraConfig) -> Result<(NokhwaDevice, OpenedCamera), CameraError> {
    let open_failed = |reason: String| CameraError::OpenFailed {
        device: config.device_id,
        reason,
    };

    let format = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::MJPEG,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

    let mut camera = Camera::new(CameraIndex::Index(config.device_id), requested)
        .map_err(|e| open_failed(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| open_failed(e.to_string()))?;

    let resolution = camera.resolution();
    let opened = OpenedCamera {
        name: camera.info().human_name(),
        width: resolution.width(),
        height: resolution.height(),
    };

    Ok((NokhwaDevice { camera }, opened))
}
