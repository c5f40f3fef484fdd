//! Companion configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DaemonError;
use crate::setup;

/// Floor for every configured interval; tokio rejects a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub remapper: RemapperConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub helpers: HelpersConfig,
}

impl Config {
    /// Reject values the observers and transports cannot run with.
    pub fn validate(&self) -> Result<(), DaemonError> {
        let intervals = [
            ("remapper.reconnect_interval_ms", self.remapper.reconnect_interval_ms),
            ("remapper.rebind_interval_ms", self.remapper.rebind_interval_ms),
            ("polling.interval_ms", self.polling.interval_ms),
            (
                "polling.version_check_interval_ms",
                self.polling.version_check_interval_ms,
            ),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(DaemonError::Config(format!("{key} must be greater than 0")));
            }
        }
        Ok(())
    }
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Files and directories the companion reads, writes or watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// User configuration directory, created owner-only on every session
    /// change.
    #[serde(default = "default_configuration_directory")]
    pub configuration_directory: PathBuf,
    /// Core configuration JSON watched while the remapper is connected.
    #[serde(default = "default_core_configuration_file")]
    pub core_configuration_file: PathBuf,
    /// Alerts file written by the remapper.
    #[serde(default = "default_alerts_file")]
    pub alerts_file: PathBuf,
    /// Version of the installed remapper package.
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
    /// Owned by the user of the active login session.
    #[serde(default = "default_console_path")]
    pub console_path: PathBuf,
    /// Endpoint socket and session state files.
    #[serde(default = "default_session_directory")]
    pub session_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            configuration_directory: default_configuration_directory(),
            core_configuration_file: default_core_configuration_file(),
            alerts_file: default_alerts_file(),
            version_file: default_version_file(),
            console_path: default_console_path(),
            session_directory: default_session_directory(),
        }
    }
}

impl PathsConfig {
    /// Socket the remapper dials to reach this companion.
    pub fn endpoint_socket(&self) -> PathBuf {
        self.session_directory.join("companion.sock")
    }

    pub fn system_preferences_file(&self) -> PathBuf {
        self.session_directory.join("system_preferences.json")
    }

    pub fn frontmost_application_file(&self) -> PathBuf {
        self.session_directory.join("frontmost_application.json")
    }

    pub fn input_source_file(&self) -> PathBuf {
        self.session_directory.join("input_source.json")
    }
}

/// Connection to the privileged remapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapperConfig {
    #[serde(default = "default_remapper_socket")]
    pub socket: PathBuf,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_rebind_interval_ms")]
    pub rebind_interval_ms: u64,
}

impl Default for RemapperConfig {
    fn default() -> Self {
        Self {
            socket: default_remapper_socket(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            rebind_interval_ms: default_rebind_interval_ms(),
        }
    }
}

impl RemapperConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms).max(MIN_INTERVAL)
    }

    pub fn rebind_interval(&self) -> Duration {
        Duration::from_millis(self.rebind_interval_ms).max(MIN_INTERVAL)
    }
}

/// Poll intervals for the file-backed observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_version_check_interval_ms")]
    pub version_check_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            version_check_interval_ms: default_version_check_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).max(MIN_INTERVAL)
    }

    pub fn version_check_interval(&self) -> Duration {
        Duration::from_millis(self.version_check_interval_ms).max(MIN_INTERVAL)
    }
}

/// Helper commands as argv arrays. An empty array disables the helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpersConfig {
    #[serde(default = "default_menu_command")]
    pub menu: Vec<String>,
    #[serde(default = "default_updater_command")]
    pub updater: Vec<String>,
    #[serde(default = "default_preferences_command")]
    pub preferences: Vec<String>,
}

impl Default for HelpersConfig {
    fn default() -> Self {
        Self {
            menu: default_menu_command(),
            updater: default_updater_command(),
            preferences: default_preferences_command(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_configuration_directory() -> PathBuf {
    setup::config_dir()
}

fn default_core_configuration_file() -> PathBuf {
    setup::config_dir().join("remap.json")
}

fn default_alerts_file() -> PathBuf {
    PathBuf::from("/run/remap-companion/alerts.json")
}

fn default_version_file() -> PathBuf {
    PathBuf::from("/usr/share/remap-companion/version")
}

fn default_console_path() -> PathBuf {
    PathBuf::from("/dev/console")
}

fn default_session_directory() -> PathBuf {
    setup::runtime_dir()
}

fn default_remapper_socket() -> PathBuf {
    PathBuf::from("/run/remap-companion/remapper.sock")
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_rebind_interval_ms() -> u64 {
    3000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_version_check_interval_ms() -> u64 {
    60_000
}

fn default_menu_command() -> Vec<String> {
    vec!["remap-companion-menu".to_string()]
}

fn default_updater_command() -> Vec<String> {
    vec![
        "remap-companion-updater".to_string(),
        "--check".to_string(),
    ]
}

fn default_preferences_command() -> Vec<String> {
    vec!["remap-companion-preferences".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("reconnect_interval_ms = 3000"));
        assert!(toml_str.contains("log_level = \"info\""));
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"

[paths]
configuration_directory = "/home/alice/.config/remap"
core_configuration_file = "/home/alice/.config/remap/remap.json"
alerts_file = "/var/run/remap/alerts.json"
version_file = "/opt/remap/version"
console_path = "/dev/console"
session_directory = "/run/user/1000/remap"

[remapper]
socket = "/var/run/remap/remapper.sock"
reconnect_interval_ms = 1000
rebind_interval_ms = 2000

[polling]
interval_ms = 250
version_check_interval_ms = 30000

[helpers]
menu = ["remap-menu", "--tray"]
updater = []
preferences = ["remap-preferences"]
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(
            config.paths.endpoint_socket(),
            PathBuf::from("/run/user/1000/remap/companion.sock")
        );
        assert_eq!(config.remapper.reconnect_interval(), Duration::from_secs(1));
        assert_eq!(config.remapper.rebind_interval(), Duration::from_secs(2));
        assert_eq!(config.polling.interval(), Duration::from_millis(250));
        assert_eq!(config.helpers.menu, vec!["remap-menu", "--tray"]);
        assert!(config.helpers.updater.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: Config = toml::from_str("[remapper]\nreconnect_interval_ms = 10\n").unwrap();
        assert_eq!(config.remapper.reconnect_interval_ms, 10);
        assert_eq!(config.remapper.rebind_interval_ms, 3000);
        assert_eq!(config.polling.interval_ms, 500);
        assert_eq!(config.helpers.preferences, default_preferences_command());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config: Config = toml::from_str("[remapper]\nrebind_interval_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("remapper.rebind_interval_ms"));
    }

    #[test]
    fn zero_interval_accessors_are_clamped() {
        let mut config = Config::default();
        config.polling.interval_ms = 0;
        config.polling.version_check_interval_ms = 0;
        config.remapper.reconnect_interval_ms = 0;
        config.remapper.rebind_interval_ms = 0;
        assert_eq!(config.polling.interval(), MIN_INTERVAL);
        assert_eq!(config.polling.version_check_interval(), MIN_INTERVAL);
        assert_eq!(config.remapper.reconnect_interval(), MIN_INTERVAL);
        assert_eq!(config.remapper.rebind_interval(), MIN_INTERVAL);
    }
}
