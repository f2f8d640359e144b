//! Configuration loading

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Config;

/// Default file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "castrelay.yaml";

/// Load and validate the relay configuration.
///
/// Config file search order:
/// 1. `CASTRELAY_CONFIG_PATH` environment variable (explicit path)
/// 2. `./castrelay.yaml`
/// 3. Environment variables and defaults only
pub fn load_config() -> Result<Config> {
    let config_path = locate_config_file(
        std::env::var_os("CASTRELAY_CONFIG_PATH").map(PathBuf::from),
        Path::new(DEFAULT_CONFIG_FILE),
    );

    let config = match &config_path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env()?
        }
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!(
        rtsp_address = %config.relay.rtsp_address,
        storage_root = %config.recording.storage_root.display(),
        graceful_stop = config.relay.graceful_stop,
        "Configuration loaded"
    );

    Ok(config)
}

fn locate_config_file(explicit: Option<PathBuf>, fallback: &Path) -> Option<PathBuf> {
    explicit
        .filter(|p| p.exists())
        .or_else(|| fallback.exists().then(|| fallback.to_path_buf()))
}
