use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relay: RelayConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

/// Listener addresses handed to the protocol engine, plus the shutdown mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub rtsp_address: String,
    pub udp_rtp_address: String,
    pub udp_rtcp_address: String,
    /// Release the publisher and wait for recordings before closing the engine.
    pub graceful_stop: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            rtsp_address: ":8554".to_string(),
            udp_rtp_address: ":8000".to_string(),
            udp_rtcp_address: ":8001".to_string(),
            graceful_stop: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    /// Directory recordings are written into
    pub storage_root: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// Output container passed to `-f` ("flv", "matroska", ...)
    pub format: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_root: PathBuf::from("."),
            ffmpeg_path: PathBuf::from("/usr/bin/ffmpeg"),
            format: "flv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "warning", "error"];

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    ///
    /// Environment keys use `__` between sections so that field names keep
    /// their underscores, e.g. `CASTRELAY_RECORDING__STORAGE_ROOT`.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CASTRELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Check the values the relay cannot start without.
    ///
    /// Returns every problem found rather than stopping at the first.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, addr) in [
            ("relay.rtsp_address", &self.relay.rtsp_address),
            ("relay.udp_rtp_address", &self.relay.udp_rtp_address),
            ("relay.udp_rtcp_address", &self.relay.udp_rtcp_address),
        ] {
            if let Err(e) = check_listen_address(addr) {
                errors.push(format!("{name}: {e}"));
            }
        }

        if self.recording.ffmpeg_path.as_os_str().is_empty() {
            errors.push("recording.ffmpeg_path is empty".to_string());
        }
        if self.recording.format.trim().is_empty() {
            errors.push("recording.format is empty".to_string());
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!("logging.level '{}' is not a known level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Same as [`Config::validate`] but folded into the crate error type.
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate().map_err(Error::Validation)
    }
}

/// Accepts `host:port` and `:port`.
fn check_listen_address(addr: &str) -> std::result::Result<(), String> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Err(format!("'{addr}' is missing a port"));
    };
    if host.chars().any(char::is_whitespace) {
        return Err(format!("'{addr}' has an invalid host"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{addr}' has an invalid port")),
        Ok(_) => Ok(()),
    }
}
