//! Production collaborator factory.

use std::path::Path;
use std::sync::Arc;

use companion_observers::unix::{
    CommandLauncher, ConsoleUserMonitor, FileVersionMonitor, JsonAlertsMonitor,
    JsonConfigurationMonitor, JsonFrontmostApplicationObserver, JsonInputSourceObserver,
    JsonSystemPreferencesMonitor, ProcessHelperManager,
};
use companion_observers::{
    AlertFileMonitor, ComponentFactory, ConfigurationMonitor, Endpoint,
    FrontmostApplicationObserver, HelperKind, HelperProcessManager, InputSourceObserver,
    PreferencesLauncher, RemapperClient, SessionUserMonitor, Signal, SystemPreferencesMonitor,
    VersionChanged, VersionMonitor,
};
use companion_protocol::{UnixReceiver, UnixRemapperClient};
use companion_types::UserId;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::error::DaemonError;
use crate::supervisor::SupervisorSettings;

/// Builds the socket, file and process backed collaborators from a
/// [`Config`].
pub struct UnixComponents {
    config: Config,
    user: UserId,
    runtime: Handle,
    version_changed: Signal<VersionChanged>,
}

impl UnixComponents {
    /// Must be called inside a tokio runtime. `version_changed` is raised
    /// when the installed package no longer matches this binary.
    pub fn new(
        config: Config,
        user: UserId,
        version_changed: Signal<VersionChanged>,
    ) -> Result<Self, DaemonError> {
        let runtime = Handle::try_current().map_err(|_| DaemonError::RuntimeUnavailable)?;
        Ok(Self {
            config,
            user,
            runtime,
            version_changed,
        })
    }

    /// Supervisor settings matching this factory's configuration.
    pub fn settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            alerts_file: self.config.paths.alerts_file.clone(),
            core_configuration_file: self.config.paths.core_configuration_file.clone(),
            user_configuration_directory: self.config.paths.configuration_directory.clone(),
            self_uid: self.user,
        }
    }
}

impl ComponentFactory for UnixComponents {
    fn session_user_monitor(&self) -> Box<dyn SessionUserMonitor> {
        Box::new(ConsoleUserMonitor::new(
            self.config.paths.console_path.clone(),
            self.config.polling.interval(),
        ))
    }

    fn version_monitor(&self) -> Arc<dyn VersionMonitor> {
        FileVersionMonitor::spawn(
            self.runtime.clone(),
            self.config.paths.version_file.clone(),
            env!("CARGO_PKG_VERSION"),
            self.config.polling.version_check_interval(),
            self.version_changed.clone(),
        )
    }

    fn alert_file_monitor(&self, path: &Path) -> Box<dyn AlertFileMonitor> {
        Box::new(JsonAlertsMonitor::alerts(
            path.to_path_buf(),
            self.config.polling.interval(),
        ))
    }

    fn endpoint(&self) -> Box<dyn Endpoint> {
        Box::new(UnixReceiver::new(
            self.config.paths.endpoint_socket(),
            self.config.remapper.rebind_interval(),
        ))
    }

    fn remapper_client(&self) -> Box<dyn RemapperClient> {
        Box::new(UnixRemapperClient::new(
            self.config.remapper.socket.clone(),
            self.user,
            self.config.remapper.reconnect_interval(),
        ))
    }

    fn configuration_monitor(&self, path: &Path) -> Arc<dyn ConfigurationMonitor> {
        Arc::new(JsonConfigurationMonitor::new(
            path.to_path_buf(),
            self.config.polling.interval(),
        ))
    }

    fn menu_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager> {
        Box::new(ProcessHelperManager::new(
            HelperKind::Menu,
            self.config.helpers.menu.clone(),
            configuration,
        ))
    }

    fn updater_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager> {
        Box::new(ProcessHelperManager::new(
            HelperKind::Updater,
            self.config.helpers.updater.clone(),
            configuration,
        ))
    }

    fn system_preferences_monitor(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn SystemPreferencesMonitor> {
        Box::new(JsonSystemPreferencesMonitor::with_configuration(
            self.config.paths.system_preferences_file(),
            self.config.polling.interval(),
            configuration,
        ))
    }

    fn frontmost_application_observer(&self) -> Box<dyn FrontmostApplicationObserver> {
        Box::new(JsonFrontmostApplicationObserver::new(
            self.config.paths.frontmost_application_file(),
            self.config.polling.interval(),
        ))
    }

    fn input_source_observer(&self) -> Box<dyn InputSourceObserver> {
        Box::new(JsonInputSourceObserver::new(
            self.config.paths.input_source_file(),
            self.config.polling.interval(),
        ))
    }

    fn preferences_launcher(&self) -> Box<dyn PreferencesLauncher> {
        Box::new(CommandLauncher::new(self.config.helpers.preferences.clone()))
    }
}
