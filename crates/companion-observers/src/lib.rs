//! Session observers and collaborator contracts for remap-companion.
//!
//! This crate defines the traits every collaborator of the session
//! supervisor implements. Each collaborator exposes an asynchronous
//! `start()` and one or more [`Signal`]s; nothing here is ever polled by the
//! supervisor. The file-backed Unix implementations live behind the `unix`
//! feature and the recording test doubles behind `mock`.

use std::path::Path;
use std::sync::Arc;

use companion_types::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences, UserId};
use tokio::sync::watch;

pub mod alert;
pub mod configuration;
pub mod error;
pub mod signal;

#[cfg(feature = "mock")]
pub mod mock;
#[cfg(all(unix, feature = "unix"))]
pub mod unix;

pub use alert::Alert;
pub use configuration::CoreConfiguration;
pub use error::ObserverError;
pub use signal::Signal;

/// Notifications raised by the local endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    Bound,
    BindFailed(String),
    Closed,
}

/// Notifications raised by the remapper client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    ConnectFailed(String),
    Closed,
}

/// Raised by a version monitor when the installed daemon version no longer
/// matches the running one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChanged {
    pub running: String,
    pub installed: String,
}

/// Reports the uid owning the active login session.
///
/// Fires at least once with the current owner after `start()`, then again on
/// every session switch.
pub trait SessionUserMonitor: Send {
    fn session_user_changed(&self) -> &Signal<UserId>;

    fn start(&mut self);
}

/// Checks that the running companion matches the installed daemon version.
///
/// Constructed already running; `manual_check` requests an extra check.
pub trait VersionMonitor: Send + Sync {
    fn manual_check(&self);
}

/// Watches the status file the remapper writes its alerts to.
pub trait AlertFileMonitor: Send {
    fn alerts_changed(&self) -> &Signal<Vec<Alert>>;

    fn start(&mut self);
}

/// Local listening endpoint the remapper dials into.
pub trait Endpoint: Send {
    fn events(&self) -> &Signal<EndpointEvent>;

    fn start(&mut self);

    /// Address the remapper should dial to reach this endpoint.
    fn address(&self) -> &Path;
}

/// Outbound connection to the remapper.
///
/// All operations are fire-and-forget; nothing is acknowledged.
pub trait RemapperClient: Send {
    fn events(&self) -> &Signal<ClientEvent>;

    fn start(&mut self);

    /// Tell the remapper where our endpoint listens.
    fn announce_self(&self, endpoint: &Path);

    fn forward_preferences(&self, preferences: &SystemPreferences);

    fn forward_frontmost_app(&self, application: &FrontmostApplication);

    fn forward_input_source(&self, identifiers: &InputSourceIdentifiers);
}

/// Watches the user's core configuration file.
///
/// Shared read-only by the child observers, hence `&self` everywhere.
pub trait ConfigurationMonitor: Send + Sync {
    fn start(&self);

    /// Subscribe to configuration updates. The value is `None` until the
    /// first successful load.
    fn subscribe(&self) -> watch::Receiver<Option<Arc<CoreConfiguration>>>;

    fn current(&self) -> Option<Arc<CoreConfiguration>> {
        let rx = self.subscribe();
        let current = rx.borrow().clone();
        current
    }
}

/// Which helper process a [`HelperProcessManager`] supervises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperKind {
    Menu,
    Updater,
}

impl std::fmt::Display for HelperKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Menu => write!(f, "menu"),
            Self::Updater => write!(f, "updater"),
        }
    }
}

/// Launches and stops a helper process according to the configuration it
/// was constructed with. Dropping the manager stops what it started.
pub trait HelperProcessManager: Send {
    fn kind(&self) -> HelperKind;
}

pub trait SystemPreferencesMonitor: Send {
    fn preferences_changed(&self) -> &Signal<SystemPreferences>;

    fn start(&mut self);
}

pub trait FrontmostApplicationObserver: Send {
    fn frontmost_app_changed(&self) -> &Signal<FrontmostApplication>;

    fn start(&mut self);
}

pub trait InputSourceObserver: Send {
    fn input_source_changed(&self) -> &Signal<InputSourceIdentifiers>;

    fn start(&mut self);
}

/// Opens the preferences UI so the user sees pending alerts.
pub trait PreferencesLauncher: Send {
    fn launch_preferences(&self);
}

/// Creates collaborator instances on demand.
///
/// The supervisor recreates endpoints, clients and the child group many
/// times over its life, so it holds a factory rather than instances.
/// Every method is called on the supervisor's queue worker, inside the
/// tokio runtime context.
pub trait ComponentFactory: Send + 'static {
    fn session_user_monitor(&self) -> Box<dyn SessionUserMonitor>;

    fn version_monitor(&self) -> Arc<dyn VersionMonitor>;

    fn alert_file_monitor(&self, path: &Path) -> Box<dyn AlertFileMonitor>;

    fn endpoint(&self) -> Box<dyn Endpoint>;

    fn remapper_client(&self) -> Box<dyn RemapperClient>;

    fn configuration_monitor(&self, path: &Path) -> Arc<dyn ConfigurationMonitor>;

    fn menu_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager>;

    fn updater_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager>;

    fn system_preferences_monitor(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn SystemPreferencesMonitor>;

    fn frontmost_application_observer(&self) -> Box<dyn FrontmostApplicationObserver>;

    fn input_source_observer(&self) -> Box<dyn InputSourceObserver>;

    fn preferences_launcher(&self) -> Box<dyn PreferencesLauncher>;
}
