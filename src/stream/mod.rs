//! Stream module
//!
//! The per-client acquisition → streaming pipeline:
//! - `message`: the wire record sent to clients
//! - `backend`: opening and releasing a session's camera and detector
//! - `session`: the session state machine and its cycle loop

pub mod backend;
pub mod message;
pub mod session;

pub use backend::{SessionBackend, SessionResources, SystemBackend};
pub use message::StreamMessage;
pub use session::{CycleOutcome, SessionExit, SessionPhase, SessionSummary, StreamSession};
