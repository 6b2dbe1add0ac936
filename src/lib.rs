//! Jewelry AR Mirror - facial anchor streaming service
//!
//! Captures frames from a local camera, runs them through a face landmark
//! model and streams stable jewelry anchors to WebSocket clients:
//! - Ear positions averaged over top/bottom landmark pairs
//! - Nose tip and head rotation (pitch, yaw, roll)
//! - Per-session frame counter and capture frame rate

pub mod camera;
pub mod config;
pub mod error;
pub mod stream;
pub mod tracking;
pub mod web;

pub use config::Config;
pub use error::{MirrorError, Result};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use stream::{SessionBackend, SystemBackend};

/// Application state shared across all connections
pub struct AppState {
    /// Current configuration
    pub config: RwLock<Config>,
    /// Shutdown signal
    pub shutdown_tx: broadcast::Sender<()>,
    /// Sessions currently streaming
    active_sessions: AtomicUsize,
    /// Sessions started since launch; also the session id source
    sessions_served: AtomicU64,
    /// Opens each session's camera and detector
    backend: Arc<dyn SessionBackend>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("active_sessions", &self.active_sessions())
            .field("sessions_served", &self.sessions_served())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create application state backed by the real camera and detector
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_backend(config, Arc::new(SystemBackend))
    }

    /// Create application state with a custom session backend
    pub fn with_backend(config: Config, backend: Arc<dyn SessionBackend>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            config: RwLock::new(config),
            shutdown_tx,
            active_sessions: AtomicUsize::new(0),
            sessions_served: AtomicU64::new(0),
            backend,
        })
    }

    /// Backend used to open session resources
    pub fn backend(&self) -> &dyn SessionBackend {
        self.backend.as_ref()
    }

    /// Register a new session; the returned guard unregisters it on drop
    pub fn begin_session(self: &Arc<Self>) -> ActiveSession {
        let id = self.sessions_served.fetch_add(1, Ordering::Relaxed) + 1;
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        ActiveSession {
            id,
            state: Arc::clone(self),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub fn sessions_served(&self) -> u64 {
        self.sessions_served.load(Ordering::Relaxed)
    }

    /// Subscribe to shutdown signal
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Registration of one live session
#[derive(Debug)]
pub struct ActiveSession {
    id: u64,
    state: Arc<AppState>,
}

impl ActiveSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.state.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_registration() {
        let state = AppState::new(Config::default());
        let first = state.begin_session();
        let second = state.begin_session();

        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(state.active_sessions(), 2);

        drop(first);
        assert_eq!(state.active_sessions(), 1);
        assert_eq!(state.sessions_served(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let state = AppState::new(Config::default());
        let mut rx = state.subscribe_shutdown();
        state.shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
