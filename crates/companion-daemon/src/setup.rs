//! Config loading and filesystem setup.

use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use companion_types::UserId;
use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content =
            std::fs::read_to_string(&config_path).map_err(|source| DaemonError::Read {
                path: config_path.clone(),
                source,
            })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(std::env::temp_dir)
        .join("remap-companion")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("companion.toml")
}

/// Per-session runtime directory for sockets and state files.
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::state_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("remap-companion")
}

/// Effective uid of this process.
pub fn effective_uid() -> UserId {
    UserId(nix::unistd::geteuid().as_raw())
}

/// Create `path` and its parents, owner-only. An existing directory is left
/// as it is.
pub fn ensure_private_directory(path: &Path) -> std::io::Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}
