//! Recorder configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/bus-recorder/recorder.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `bus.stream_addr`
//!
//! Everything else has defaults. The alert log defaults to
//! `alerts.log` next to the SQLite database, so both land on the same
//! volume.

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (deserialized from TOML)
// ---------------------------------------------------------------------------

/// Top-level recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub schema_version: u32,
    pub bus: BusConfig,
    pub storage: StorageConfig,
    pub detector: DetectorConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Address of the broker bridge's stream socket.
    pub stream_addr: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub window_secs: u64,
    pub threshold: usize,
    pub cooldown_secs: u64,
    pub idle_expiry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub mode: AlertMode,
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    File,
    None,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    bus: Option<RawBusConfig>,
    storage: Option<RawStorageConfig>,
    detector: Option<RawDetectorConfig>,
    alerts: Option<RawAlertConfig>,
}

#[derive(Debug, Deserialize)]
struct RawBusConfig {
    stream_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStorageConfig {
    sqlite_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDetectorConfig {
    window_secs: Option<u64>,
    threshold: Option<usize>,
    cooldown_secs: Option<u64>,
    idle_expiry_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawAlertConfig {
    mode: Option<String>,
    file: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load recorder config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<RecorderConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load recorder config from the default path
/// `/etc/bus-recorder/recorder.toml`.
pub fn load_config() -> Result<RecorderConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/bus-recorder/recorder.toml"))
}

/// Load recorder config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<RecorderConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // Validate schema_version
    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {}",
            schema_version
        )));
    }

    // Validate bus
    let raw_bus = raw
        .bus
        .ok_or_else(|| ConfigError::MissingField("bus".to_owned()))?;
    let stream_addr = raw_bus
        .stream_addr
        .ok_or_else(|| ConfigError::MissingField("bus.stream_addr".to_owned()))?;

    // Storage defaults
    let sqlite_path = match raw.storage {
        Some(s) => s
            .sqlite_path
            .unwrap_or_else(|| "/var/lib/bus-recorder/events.sqlite3".to_owned()),
        None => "/var/lib/bus-recorder/events.sqlite3".to_owned(),
    };

    // Detector defaults
    let detector = match raw.detector {
        Some(d) => DetectorConfig {
            window_secs: d.window_secs.unwrap_or(5),
            threshold: d.threshold.unwrap_or(10),
            cooldown_secs: d.cooldown_secs.unwrap_or(60),
            idle_expiry_secs: d.idle_expiry_secs.unwrap_or(300),
        },
        None => DetectorConfig {
            window_secs: 5,
            threshold: 10,
            cooldown_secs: 60,
            idle_expiry_secs: 300,
        },
    };
    if detector.window_secs == 0 {
        return Err(ConfigError::InvalidValue(
            "detector.window_secs must be positive".to_owned(),
        ));
    }
    if detector.threshold == 0 {
        return Err(ConfigError::InvalidValue(
            "detector.threshold must be positive".to_owned(),
        ));
    }

    // Alert defaults; the log lands next to the database unless
    // overridden.
    let default_alert_file = Path::new(&sqlite_path)
        .parent()
        .map_or_else(|| "alerts.log".to_owned(), |p| {
            p.join("alerts.log").display().to_string()
        });
    let alerts = match raw.alerts {
        Some(a) => AlertConfig {
            mode: parse_alert_mode(a.mode.as_deref().unwrap_or("file"))?,
            file: a.file.unwrap_or(default_alert_file),
        },
        None => AlertConfig {
            mode: AlertMode::File,
            file: default_alert_file,
        },
    };

    Ok(RecorderConfig {
        schema_version,
        bus: BusConfig { stream_addr },
        storage: StorageConfig { sqlite_path },
        detector,
        alerts,
    })
}

fn parse_alert_mode(mode: &str) -> Result<AlertMode, ConfigError> {
    match mode {
        "file" => Ok(AlertMode::File),
        "none" => Ok(AlertMode::None),
        other => Err(ConfigError::InvalidValue(format!(
            "alerts.mode must be \"file\" or \"none\", got \"{}\"",
            other
        ))),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
