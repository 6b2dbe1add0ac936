//! Error types for the jewelry mirror service

use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Web server error: {0}")]
    Web(#[from] WebError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Camera errors. All of these are construction-time failures; a failed
/// read during streaming is not an error, it is a missing frame.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera {device}: {reason}")]
    OpenFailed { device: u32, reason: String },

    #[error("Camera capture unsupported: {0}")]
    Unsupported(String),

    #[error("Camera worker error: {0}")]
    Worker(String),
}

/// Landmark detector errors
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to launch face mesh helper: {0}")]
    Spawn(String),

    #[error("Face mesh helper did not become ready: {0}")]
    NotReady(String),

    #[error("Face mesh helper I/O failed: {0}")]
    Io(String),

    #[error("Malformed face mesh reply: {0}")]
    MalformedReply(String),

    #[error("Face mesh helper reported: {0}")]
    Helper(String),

    #[error("Landmark set too small: expected at least {expected} points, got {actual}")]
    TooFewLandmarks { expected: usize, actual: usize },

    #[error("Face mesh helper did not answer within {0} ms")]
    Timeout(u64),

    #[error("Detector already released")]
    Released,
}

/// Transport-side errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Web server errors
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("Server failed: {0}")]
    Serve(String),
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, MirrorError>;
