//! Configuration parsing and management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, MirrorError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub stream: StreamConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `CAMERA_ID`-style overrides from an arbitrary lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CAMERA_ID") {
            self.camera.device_id = parse_override("CAMERA_ID", &v)?;
        }
        if let Some(v) = lookup("CAMERA_WIDTH") {
            self.camera.width = parse_override("CAMERA_WIDTH", &v)?;
        }
        if let Some(v) = lookup("CAMERA_HEIGHT") {
            self.camera.height = parse_override("CAMERA_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("HOST") {
            self.http.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.http.port = parse_override("PORT", &v)?;
        }
        if let Some(v) = lookup("MAX_NUM_FACES") {
            self.detector.max_faces = parse_override("MAX_NUM_FACES", &v)?;
        }
        if let Some(v) = lookup("MIN_DETECTION_CONFIDENCE") {
            self.detector.min_detection_confidence =
                parse_override("MIN_DETECTION_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("MIN_TRACKING_CONFIDENCE") {
            self.detector.min_tracking_confidence =
                parse_override("MIN_TRACKING_CONFIDENCE", &v)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(invalid("camera.width/height", "Resolution must be non-zero"));
        }

        if self.detector.max_faces == 0 {
            return Err(invalid("detector.max_faces", "At least one face must be tracked"));
        }

        if !(0.0..=1.0).contains(&self.detector.min_detection_confidence) {
            return Err(invalid(
                "detector.min_detection_confidence",
                "Confidence must be between 0.0 and 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.min_tracking_confidence) {
            return Err(invalid(
                "detector.min_tracking_confidence",
                "Confidence must be between 0.0 and 1.0",
            ));
        }

        if self.detector.program.trim().is_empty() {
            return Err(invalid("detector.program", "Helper program must be set"));
        }

        if self.detector.reply_timeout_ms == 0 || self.detector.ready_timeout_ms == 0 {
            return Err(invalid("detector.*_timeout_ms", "Timeouts must be greater than 0"));
        }

        if self.stream.queue_capacity == 0 {
            return Err(invalid("stream.queue_capacity", "Queue capacity must be greater than 0"));
        }

        if self.http.port == 0 {
            return Err(invalid("http.port", "Port must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> MirrorError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, &format!("cannot parse '{}'", value)))
}

/// Camera capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub device_id: u32,
    /// Requested frame width; the device may negotiate another size
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// Requested capture rate
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Face mesh helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Program used to launch the helper
    pub program: String,
    /// Arguments passed before the detector settings
    pub args: Vec<String>,
    /// Maximum number of faces the helper reports
    pub max_faces: u32,
    /// Minimum confidence for face detection
    pub min_detection_confidence: f32,
    /// Minimum confidence for landmark tracking
    pub min_tracking_confidence: f32,
    /// Upper bound on one frame exchange with the helper (milliseconds)
    pub reply_timeout_ms: u64,
    /// Upper bound on the helper loading its model (milliseconds)
    pub ready_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["scripts/face_mesh.py".to_string()],
            max_faces: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            reply_timeout_ms: 1000,
            ready_timeout_ms: 30_000,
        }
    }
}

/// Per-session streaming behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay after a successful cycle (milliseconds)
    pub cycle_delay_ms: u64,
    /// Delay after a capture failure or a failed cycle (milliseconds)
    pub retry_delay_ms: u64,
    /// Outbound messages buffered per client before backpressure
    pub queue_capacity: usize,
    /// Attach the full raw landmark set to face-present messages
    pub include_all_landmarks: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 1,
            retry_delay_ms: 33,
            queue_capacity: 8,
            include_all_landmarks: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// HTTP server host
    pub host: String,
    /// HTTP server port
    pub port: u16,
    /// Allowed origins for CORS; `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("jewelry-mirror");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/jewelry-mirror");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/jewelry-mirror");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("jewelry-mirror");
        }
    }

    PathBuf::from(".")
}
