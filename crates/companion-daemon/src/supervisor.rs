//! Session lifecycle supervisor.
//!
//! The [`Supervisor`] owns every session-scoped collaborator and keeps them in
//! step with the active login session and the remapper connection:
//!
//! ```text
//! session user == self ─► endpoint ──bound──► client ──connected──► child group
//! ```
//!
//! All of its state lives on a [`SerialQueue`] worker. Collaborator signals
//! only capture their payload and push a task; every creation, teardown and
//! forward happens inside those tasks, in arrival order. Endpoints, clients
//! and child groups carry a generation number so a notification from an
//! instance that has since been replaced is dropped.

use std::path::PathBuf;
use std::sync::Arc;

use companion_observers::{
    Alert, AlertFileMonitor, ClientEvent, ComponentFactory, ConfigurationMonitor, Endpoint,
    EndpointEvent, FrontmostApplicationObserver, HelperProcessManager, InputSourceObserver,
    PreferencesLauncher, RemapperClient, SessionUserMonitor, Signal, SystemPreferencesMonitor,
    VersionMonitor,
};
use companion_types::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences, UserId};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::DaemonError;
use crate::queue::{QueueHandle, SerialQueue};
use crate::setup::ensure_private_directory;
use crate::state::LifecycleState;

/// Frontmost-application changes from the event viewer are never forwarded;
/// the viewer inspects the remapper and would otherwise feed back into it.
const EVENT_VIEWER_BUNDLE_IDENTIFIERS: [&str; 2] = [
    "org.pqrs.Karabiner.EventViewer",
    "org.pqrs.Karabiner-EventViewer",
];

/// Static inputs to the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub alerts_file: PathBuf,
    pub core_configuration_file: PathBuf,
    pub user_configuration_directory: PathBuf,
    /// Effective uid of this process; only a session owned by it is served.
    pub self_uid: UserId,
}

/// Snapshot published after every supervisor task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: LifecycleState,
    pub session_user: Option<UserId>,
    pub endpoint: bool,
    pub client: bool,
    pub child_group: bool,
}

/// Per-login-session supervisor.
///
/// Dropping it (or calling [`Supervisor::shutdown`]) tears everything down
/// synchronously: tasks already queued run first, then the child group,
/// client, endpoint and session monitor are discarded in that order.
pub struct Supervisor {
    queue: SerialQueue<SupervisorState>,
    status: watch::Receiver<SupervisorStatus>,
}

impl Supervisor {
    /// Start supervising. Must be called inside a tokio runtime; the
    /// collaborators spawn their I/O onto it.
    pub fn new(
        factory: Box<dyn ComponentFactory>,
        settings: SupervisorSettings,
    ) -> Result<Self, DaemonError> {
        let runtime = Handle::try_current().map_err(|_| DaemonError::RuntimeUnavailable)?;
        let (status_tx, status_rx) = watch::channel(SupervisorStatus::default());

        let queue = SerialQueue::spawn("companion-supervisor", runtime, move |queue| {
            let mut state = SupervisorState::new(queue, factory, settings, status_tx);
            state.boot();
            state.publish();
            state
        })?;

        Ok(Self {
            queue,
            status: status_rx,
        })
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// Latest published status.
    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// Resolves once every task queued before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.push(move |_| {
            let _ = tx.send(());
        }) {
            let _ = rx.await;
        }
    }

    /// Tear everything down and stop the worker. Equivalent to dropping.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.queue.push(SupervisorState::teardown);
        self.queue.terminate();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointPhase {
    Binding,
    Bound,
    Down,
}

struct EndpointSlot {
    generation: u64,
    phase: EndpointPhase,
    endpoint: Box<dyn Endpoint>,
}

struct ClientSlot {
    generation: u64,
    client: Box<dyn RemapperClient>,
}

/// Configuration monitor plus the observers that read it. Created and
/// dropped as one.
struct ChildGroup {
    generation: u64,
    menu: Box<dyn HelperProcessManager>,
    updater: Box<dyn HelperProcessManager>,
    system_preferences: Box<dyn SystemPreferencesMonitor>,
    frontmost: Box<dyn FrontmostApplicationObserver>,
    input_source: Box<dyn InputSourceObserver>,
    configuration: Arc<dyn ConfigurationMonitor>,
}

/// Everything owned by the queue worker.
struct SupervisorState {
    queue: QueueHandle<SupervisorState>,
    factory: Box<dyn ComponentFactory>,
    settings: SupervisorSettings,
    status: watch::Sender<SupervisorStatus>,
    launcher: Box<dyn PreferencesLauncher>,
    version_monitor: Option<Arc<dyn VersionMonitor>>,
    alerts_monitor: Option<Box<dyn AlertFileMonitor>>,
    session_monitor: Option<Box<dyn SessionUserMonitor>>,
    session_user: Option<UserId>,
    children: Option<ChildGroup>,
    client: Option<ClientSlot>,
    endpoint: Option<EndpointSlot>,
    next_generation: u64,
}

impl SupervisorState {
    fn new(
        queue: QueueHandle<SupervisorState>,
        factory: Box<dyn ComponentFactory>,
        settings: SupervisorSettings,
        status: watch::Sender<SupervisorStatus>,
    ) -> Self {
        let launcher = factory.preferences_launcher();
        Self {
            queue,
            factory,
            settings,
            status,
            launcher,
            version_monitor: None,
            alerts_monitor: None,
            session_monitor: None,
            session_user: None,
            children: None,
            client: None,
            endpoint: None,
            next_generation: 0,
        }
    }

    fn boot(&mut self) {
        self.version_monitor = Some(self.factory.version_monitor());
        self.start_alerts_monitor();

        let mut monitor = self.factory.session_user_monitor();
        self.subscribe(monitor.session_user_changed(), Self::on_session_user);
        monitor.start();
        self.session_monitor = Some(monitor);
        info!(self_uid = %self.settings.self_uid, "supervisor started");
    }

    fn teardown(&mut self) {
        self.stop_endpoint();
        drop(self.session_monitor.take());
        self.publish();
        info!("supervisor stopped");
    }

    /// Route `signal` into a queued call of `handler`, followed by a status
    /// publish.
    fn subscribe<E, H>(&self, signal: &Signal<E>, handler: H)
    where
        E: Clone + Send + 'static,
        H: Fn(&mut SupervisorState, E) + Copy + Send + Sync + 'static,
    {
        let queue = self.queue.clone();
        signal.connect(move |event: &E| {
            let event = event.clone();
            queue.push(move |state| {
                handler(&mut *state, event);
                state.publish();
            });
        });
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn publish(&self) {
        let endpoint_binding = self
            .endpoint
            .as_ref()
            .is_some_and(|slot| slot.phase == EndpointPhase::Binding);
        let status = SupervisorStatus {
            state: LifecycleState::derive(
                endpoint_binding,
                self.client.is_some(),
                self.children.is_some(),
            ),
            session_user: self.session_user,
            endpoint: self.endpoint.is_some(),
            client: self.client.is_some(),
            child_group: self.children.is_some(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn manual_check(&self) {
        if let Some(monitor) = &self.version_monitor {
            monitor.manual_check();
        }
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    fn start_alerts_monitor(&mut self) {
        if self.alerts_monitor.is_some() {
            return;
        }
        let mut monitor = self.factory.alert_file_monitor(&self.settings.alerts_file);
        self.subscribe(monitor.alerts_changed(), Self::on_alerts);
        monitor.start();
        self.alerts_monitor = Some(monitor);
    }

    fn on_alerts(&mut self, alerts: Vec<Alert>) {
        info!(
            path = %self.settings.alerts_file.display(),
            count = alerts.len(),
            "alerts file updated"
        );
        if !alerts.is_empty() {
            self.launcher.launch_preferences();
        }
    }

    // -----------------------------------------------------------------------
    // Session identity
    // -----------------------------------------------------------------------

    fn on_session_user(&mut self, uid: UserId) {
        info!(%uid, "session user changed");
        self.session_user = Some(uid);
        self.manual_check();

        let directory = &self.settings.user_configuration_directory;
        if let Err(e) = ensure_private_directory(directory) {
            warn!(path = %directory.display(), error = %e, "failed to create configuration directory");
        }

        self.stop_endpoint();
        if uid == self.settings.self_uid {
            self.start_endpoint();
        } else {
            info!(%uid, self_uid = %self.settings.self_uid, "session not owned by this user, idling");
        }
    }

    // -----------------------------------------------------------------------
    // Endpoint
    // -----------------------------------------------------------------------

    fn start_endpoint(&mut self) {
        let generation = self.next_generation();
        let mut endpoint = self.factory.endpoint();
        self.subscribe(endpoint.events(), move |state, event| {
            state.on_endpoint_event(generation, event);
        });
        endpoint.start();
        debug!(generation, address = %endpoint.address().display(), "endpoint started");
        self.endpoint = Some(EndpointSlot {
            generation,
            phase: EndpointPhase::Binding,
            endpoint,
        });
    }

    fn stop_endpoint(&mut self) {
        self.stop_client();
        if let Some(slot) = self.endpoint.take() {
            debug!(generation = slot.generation, "endpoint discarded");
        }
    }

    fn on_endpoint_event(&mut self, generation: u64, event: EndpointEvent) {
        let Some(slot) = self
            .endpoint
            .as_mut()
            .filter(|slot| slot.generation == generation)
        else {
            debug!(generation, ?event, "dropping event from stale endpoint");
            return;
        };

        match event {
            EndpointEvent::Bound => {
                slot.phase = EndpointPhase::Bound;
                info!(address = %slot.endpoint.address().display(), "endpoint bound");
                self.stop_client();
                self.start_client();
            }
            EndpointEvent::BindFailed(reason) => {
                slot.phase = EndpointPhase::Down;
                warn!(%reason, "endpoint bind failed");
                self.stop_client();
            }
            EndpointEvent::Closed => {
                slot.phase = EndpointPhase::Down;
                warn!("endpoint closed");
                self.stop_client();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Client
    // -----------------------------------------------------------------------

    fn start_client(&mut self) {
        let generation = self.next_generation();
        let mut client = self.factory.remapper_client();
        self.subscribe(client.events(), move |state, event| {
            state.on_client_event(generation, event);
        });
        client.start();
        debug!(generation, "client started");
        self.client = Some(ClientSlot { generation, client });
    }

    fn stop_client(&mut self) {
        self.stop_children();
        if let Some(slot) = self.client.take() {
            debug!(generation = slot.generation, "client discarded");
        }
    }

    fn on_client_event(&mut self, generation: u64, event: ClientEvent) {
        if !self
            .client
            .as_ref()
            .is_some_and(|slot| slot.generation == generation)
        {
            debug!(generation, ?event, "dropping event from stale client");
            return;
        }

        match event {
            ClientEvent::Connected => {
                info!("connected to remapper");
                self.manual_check();
                if let (Some(client), Some(endpoint)) = (&self.client, &self.endpoint) {
                    client.client.announce_self(endpoint.endpoint.address());
                }
                self.stop_children();
                self.start_children();
            }
            ClientEvent::ConnectFailed(reason) => {
                info!(%reason, "remapper connection failed");
                self.manual_check();
                self.stop_children();
            }
            ClientEvent::Closed => {
                info!("remapper connection closed");
                self.manual_check();
                self.stop_children();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Child group
    // -----------------------------------------------------------------------

    fn start_children(&mut self) {
        let generation = self.next_generation();
        let configuration = self
            .factory
            .configuration_monitor(&self.settings.core_configuration_file);

        let menu = self.factory.menu_process_manager(&configuration);
        let updater = self.factory.updater_process_manager(&configuration);

        let mut system_preferences = self.factory.system_preferences_monitor(&configuration);
        self.subscribe(
            system_preferences.preferences_changed(),
            move |state, preferences| state.on_preferences(generation, preferences),
        );
        system_preferences.start();

        let mut frontmost = self.factory.frontmost_application_observer();
        self.subscribe(frontmost.frontmost_app_changed(), move |state, application| {
            state.on_frontmost_app(generation, application);
        });
        frontmost.start();

        let mut input_source = self.factory.input_source_observer();
        self.subscribe(input_source.input_source_changed(), move |state, identifiers| {
            state.on_input_source(generation, identifiers);
        });
        input_source.start();

        // Observers subscribe to the configuration first, then it loads.
        configuration.start();

        debug!(generation, "child group started");
        self.children = Some(ChildGroup {
            generation,
            menu,
            updater,
            system_preferences,
            frontmost,
            input_source,
            configuration,
        });
    }

    fn stop_children(&mut self) {
        let Some(children) = self.children.take() else {
            return;
        };
        let ChildGroup {
            generation,
            menu,
            updater,
            system_preferences,
            frontmost,
            input_source,
            configuration,
        } = children;
        debug!(
            generation,
            menu = %menu.kind(),
            updater = %updater.kind(),
            "child group discarded"
        );
        // The configuration monitor outlives every reader.
        drop(menu);
        drop(updater);
        drop(system_preferences);
        drop(frontmost);
        drop(input_source);
        drop(configuration);
    }

    /// Client to forward through, if the child group of `generation` is
    /// still the live one.
    fn forwarding_client(&self, generation: u64) -> Option<&dyn RemapperClient> {
        let live = self
            .children
            .as_ref()
            .is_some_and(|children| children.generation == generation);
        if !live {
            debug!(generation, "dropping event from stale child group");
            return None;
        }
        self.client.as_ref().map(|slot| slot.client.as_ref())
    }

    fn on_preferences(&mut self, generation: u64, preferences: SystemPreferences) {
        if let Some(client) = self.forwarding_client(generation) {
            client.forward_preferences(&preferences);
        }
    }

    fn on_frontmost_app(&mut self, generation: u64, application: FrontmostApplication) {
        if EVENT_VIEWER_BUNDLE_IDENTIFIERS.contains(&application.bundle_identifier.as_str()) {
            debug!(bundle = %application.bundle_identifier, "ignoring event viewer");
            return;
        }
        if let Some(client) = self.forwarding_client(generation) {
            client.forward_frontmost_app(&application);
        }
    }

    fn on_input_source(&mut self, generation: u64, identifiers: InputSourceIdentifiers) {
        if let Some(client) = self.forwarding_client(generation) {
            client.forward_input_source(&identifiers);
        }
    }
}
