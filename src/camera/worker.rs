//! Capture thread
//!
//! Device handles that are not `Send` (nokhwa's among them) live on a
//! dedicated thread. The owning side sends grab requests and waits a bounded
//! time for each frame. At most one grab is in flight: a grab that outlives
//! its wait is picked up by the next read instead of queueing another.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::Frame;
use crate::error::CameraError;

/// Device state owned by the capture thread
pub trait CaptureDevice {
    /// Grab and convert one frame
    fn grab(&mut self) -> Option<Frame>;

    /// Stop streaming; called once when the thread exits
    fn stop(&mut self);
}

/// Waits applied by [`CaptureWorker`]
#[derive(Debug, Clone, Copy)]
pub struct WorkerTimeouts {
    pub open: Duration,
    pub grab: Duration,
    pub release: Duration,
}

impl Default for WorkerTimeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(10),
            grab: Duration::from_millis(500),
            release: Duration::from_secs(1),
        }
    }
}

enum CaptureCommand {
    Grab(SyncSender<Option<Frame>>),
    Stop,
}

/// Handle to a capture thread
pub struct CaptureWorker {
    commands: Sender<CaptureCommand>,
    /// Reply slot of a grab that timed out and is still running
    pending: Option<Receiver<Option<Frame>>>,
    thread: Option<JoinHandle<()>>,
    timeouts: WorkerTimeouts,
}

impl CaptureWorker {
    /// Start a capture thread and open the device on it.
    ///
    /// `open` runs on the new thread and returns the device plus whatever
    /// the caller wants to know about it.
    pub fn spawn<D, I, F>(
        name: String,
        timeouts: WorkerTimeouts,
        open: F,
    ) -> Result<(Self, I), CameraError>
    where
        D: CaptureDevice,
        I: Send + 'static,
        F: FnOnce() -> Result<(D, I), CameraError> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_capture_thread(open, command_rx, ready_tx))
            .map_err(|e| CameraError::Worker(e.to_string()))?;

        let info = match ready_rx.recv_timeout(timeouts.open) {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread stops on its own once the open call returns
                let _ = command_tx.send(CaptureCommand::Stop);
                return Err(CameraError::Worker(format!(
                    "device did not open within {:?}",
                    timeouts.open
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                return Err(CameraError::Worker("capture thread exited".to_string()));
            }
        };

        let worker = Self {
            commands: command_tx,
            pending: None,
            thread: Some(thread),
            timeouts,
        };
        Ok((worker, info))
    }

    /// Next frame, or `None` if the grab failed or did not finish in time
    pub fn read_frame(&mut self) -> Option<Frame> {
        let reply = match self.pending.take() {
            Some(reply) => reply,
            None => {
                let (reply_tx, reply_rx) = mpsc::sync_channel(1);
                self.commands.send(CaptureCommand::Grab(reply_tx)).ok()?;
                reply_rx
            }
        };

        match reply.recv_timeout(self.timeouts.grab) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                self.pending = Some(reply);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Whether a grab is still outstanding
    pub fn grab_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Stop the thread. Waits a bounded time, then detaches a thread that
    /// is stuck inside the driver.
    pub fn release(&mut self) {
        let _ = self.commands.send(CaptureCommand::Stop);
        self.pending = None;

        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + self.timeouts.release;
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        if thread.is_finished() {
            if thread.join().is_err() {
                tracing::warn!("Camera thread panicked during shutdown");
            }
        } else {
            tracing::warn!("Camera thread still busy after release; detaching");
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture_thread<D, I, F>(
    open: F,
    commands: Receiver<CaptureCommand>,
    ready: SyncSender<Result<I, CameraError>>,
) where
    D: CaptureDevice,
    F: FnOnce() -> Result<(D, I), CameraError>,
{
    let mut device = match open() {
        Ok((mut device, info)) => {
            if ready.send(Ok(info)).is_err() {
                device.stop();
                return;
            }
            device
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            CaptureCommand::Grab(reply) => {
                let _ = reply.send(device.grab());
            }
            CaptureCommand::Stop => break,
        }
    }

    device.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Each grab waits for a token on `gate`
    struct GatedDevice {
        gate: Receiver<()>,
        grabs: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl CaptureDevice for GatedDevice {
        fn grab(&mut self) -> Option<Frame> {
            self.grabs.fetch_add(1, Ordering::SeqCst);
            self.gate.recv().ok()?;
            Some(Frame::new(1, 1, vec![0, 0, 0]))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Gated {
        worker: CaptureWorker,
        open_gate: Sender<()>,
        grabs: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    fn gated() -> Gated {
        let (open_gate, gate) = mpsc::channel();
        let grabs = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));

        let device = GatedDevice {
            gate,
            grabs: grabs.clone(),
            stops: stops.clone(),
        };
        let timeouts = WorkerTimeouts {
            open: Duration::from_secs(5),
            grab: Duration::from_millis(50),
            release: Duration::from_millis(200),
        };
        let (worker, name) =
            CaptureWorker::spawn("camera-test".to_string(), timeouts, move || {
                Ok((device, "gated"))
            })
            .unwrap();
        assert_eq!(name, "gated");

        Gated {
            worker,
            open_gate,
            grabs,
            stops,
        }
    }

    #[test]
    fn test_grab_returns_frame() {
        let mut g = gated();
        g.open_gate.send(()).unwrap();
        assert!(g.worker.read_frame().is_some());
        assert!(!g.worker.grab_pending());

        g.worker.release();
        assert_eq!(g.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_grab_is_reused_not_queued() {
        let mut g = gated();

        assert!(g.worker.read_frame().is_none());
        assert!(g.worker.read_frame().is_none());
        assert!(g.worker.read_frame().is_none());
        assert!(g.worker.grab_pending());
        assert_eq!(g.grabs.load(Ordering::SeqCst), 1);

        // the device recovers: the outstanding grab is delivered
        g.open_gate.send(()).unwrap();
        assert!(g.worker.read_frame().is_some());

        // and exactly one new grab follows, no backlog
        g.open_gate.send(()).unwrap();
        assert!(g.worker.read_frame().is_some());
        assert_eq!(g.grabs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_is_bounded_when_grab_is_stuck() {
        let mut g = gated();
        assert!(g.worker.read_frame().is_none());

        let started = Instant::now();
        g.worker.release();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(g.stops.load(Ordering::SeqCst), 0);

        // closing the gate unblocks the detached thread, which then stops
        drop(g.open_gate);
        let deadline = Instant::now() + Duration::from_secs(2);
        while g.stops.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(g.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let result = CaptureWorker::spawn::<GatedDevice, (), _>(
            "camera-test".to_string(),
            WorkerTimeouts::default(),
            || {
                Err(CameraError::OpenFailed {
                    device: 9,
                    reason: "busy".to_string(),
                })
            },
        );
        assert!(matches!(
            result,
            Err(CameraError::OpenFailed { device: 9, .. })
        ));
    }
}
