//! Preferences UI launcher.

use tracing::{info, warn};

use super::process::spawn_command;
use crate::PreferencesLauncher;

/// Launches the preferences UI by running a configured command.
pub struct CommandLauncher {
    command: Vec<String>,
}

impl CommandLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl PreferencesLauncher for CommandLauncher {
    fn launch_preferences(&self) {
        if self.command.is_empty() {
            warn!("no preferences command configured");
            return;
        }
        match spawn_command(&self.command, false) {
            Ok(mut child) => {
                info!(pid = ?child.id(), "preferences launched");
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(error = %e, "failed to launch preferences"),
        }
    }
}
