//! Mock collaborators for testing.
//!
//! [`MockComponents`] is a [`ComponentFactory`] whose products record every
//! creation, start, drop and forwarded call into a shared log. Tests keep the
//! paired [`MockHandle`] to raise notifications on the most recently created
//! instance of each kind and to inspect the log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use companion_types::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences, UserId};
use tokio::sync::watch;

use crate::{
    Alert, AlertFileMonitor, ClientEvent, ComponentFactory, ConfigurationMonitor,
    CoreConfiguration, Endpoint, EndpointEvent, FrontmostApplicationObserver, HelperKind,
    HelperProcessManager, InputSourceObserver, PreferencesLauncher, RemapperClient,
    SessionUserMonitor, Signal, SystemPreferencesMonitor, VersionMonitor,
};

/// Kind of collaborator a [`MockCall`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    SessionUserMonitor,
    VersionMonitor,
    AlertFileMonitor,
    Endpoint,
    RemapperClient,
    ConfigurationMonitor,
    MenuProcessManager,
    UpdaterProcessManager,
    SystemPreferencesMonitor,
    FrontmostApplicationObserver,
    InputSourceObserver,
}

impl Component {
    /// Members of the child group.
    pub const CHILD_GROUP: [Component; 6] = [
        Component::ConfigurationMonitor,
        Component::MenuProcessManager,
        Component::UpdaterProcessManager,
        Component::SystemPreferencesMonitor,
        Component::FrontmostApplicationObserver,
        Component::InputSourceObserver,
    ];
}

/// Recorded collaborator activity.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Created(Component, u64),
    Started(Component, u64),
    Dropped(Component, u64),
    ManualCheck,
    AnnounceSelf(PathBuf),
    ForwardPreferences(SystemPreferences),
    ForwardFrontmostApp(FrontmostApplication),
    ForwardInputSource(InputSourceIdentifiers),
    LaunchPreferences,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    next_id: u64,
    live: HashMap<Component, u32>,
    session_user: Option<Signal<UserId>>,
    alerts: Option<Signal<Vec<Alert>>>,
    endpoint: Option<Signal<EndpointEvent>>,
    client: Option<Signal<ClientEvent>>,
    preferences: Option<Signal<SystemPreferences>>,
    frontmost: Option<Signal<FrontmostApplication>>,
    input_source: Option<Signal<InputSourceIdentifiers>>,
}

#[derive(Clone, Default)]
struct Recorder {
    state: Arc<Mutex<MockState>>,
}

impl Recorder {
    fn record(&self, call: MockCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn created(&self, component: Component) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        *state.live.entry(component).or_default() += 1;
        state.calls.push(MockCall::Created(component, id));
        id
    }

    fn dropped(&self, component: Component, id: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(live) = state.live.get_mut(&component) {
            *live = live.saturating_sub(1);
        }
        state.calls.push(MockCall::Dropped(component, id));
    }
}

/// Lifecycle bookkeeping shared by every mock collaborator.
struct Tracked {
    component: Component,
    id: u64,
    recorder: Recorder,
}

impl Tracked {
    fn new(component: Component, recorder: &Recorder) -> Self {
        Self {
            component,
            id: recorder.created(component),
            recorder: recorder.clone(),
        }
    }

    fn started(&self) {
        self.recorder
            .record(MockCall::Started(self.component, self.id));
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.recorder.dropped(self.component, self.id);
    }
}

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct MockSessionUserMonitor {
    tracked: Tracked,
    signal: Signal<UserId>,
}

impl SessionUserMonitor for MockSessionUserMonitor {
    fn session_user_changed(&self) -> &Signal<UserId> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }
}

struct MockVersionMonitor {
    tracked: Tracked,
}

impl VersionMonitor for MockVersionMonitor {
    fn manual_check(&self) {
        self.tracked.recorder.record(MockCall::ManualCheck);
    }
}

struct MockAlertFileMonitor {
    tracked: Tracked,
    signal: Signal<Vec<Alert>>,
}

impl AlertFileMonitor for MockAlertFileMonitor {
    fn alerts_changed(&self) -> &Signal<Vec<Alert>> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }
}

struct MockEndpoint {
    tracked: Tracked,
    signal: Signal<EndpointEvent>,
    address: PathBuf,
}

impl Endpoint for MockEndpoint {
    fn events(&self) -> &Signal<EndpointEvent> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }

    fn address(&self) -> &Path {
        &self.address
    }
}

struct MockRemapperClient {
    tracked: Tracked,
    signal: Signal<ClientEvent>,
}

impl RemapperClient for MockRemapperClient {
    fn events(&self) -> &Signal<ClientEvent> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }

    fn announce_self(&self, endpoint: &Path) {
        self.tracked
            .recorder
            .record(MockCall::AnnounceSelf(endpoint.to_path_buf()));
    }

    fn forward_preferences(&self, preferences: &SystemPreferences) {
        self.tracked
            .recorder
            .record(MockCall::ForwardPreferences(preferences.clone()));
    }

    fn forward_frontmost_app(&self, application: &FrontmostApplication) {
        self.tracked
            .recorder
            .record(MockCall::ForwardFrontmostApp(application.clone()));
    }

    fn forward_input_source(&self, identifiers: &InputSourceIdentifiers) {
        self.tracked
            .recorder
            .record(MockCall::ForwardInputSource(identifiers.clone()));
    }
}

struct MockConfigurationMonitor {
    tracked: Tracked,
    tx: watch::Sender<Option<Arc<CoreConfiguration>>>,
}

impl ConfigurationMonitor for MockConfigurationMonitor {
    fn start(&self) {
        self.tracked.started();
        self.tx
            .send_replace(Some(Arc::new(CoreConfiguration::default())));
    }

    fn subscribe(&self) -> watch::Receiver<Option<Arc<CoreConfiguration>>> {
        self.tx.subscribe()
    }
}

struct MockHelperProcessManager {
    _tracked: Tracked,
    kind: HelperKind,
    _configuration: Arc<dyn ConfigurationMonitor>,
}

impl HelperProcessManager for MockHelperProcessManager {
    fn kind(&self) -> HelperKind {
        self.kind
    }
}

struct MockSystemPreferencesMonitor {
    tracked: Tracked,
    signal: Signal<SystemPreferences>,
    _configuration: Arc<dyn ConfigurationMonitor>,
}

impl SystemPreferencesMonitor for MockSystemPreferencesMonitor {
    fn preferences_changed(&self) -> &Signal<SystemPreferences> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }
}

struct MockFrontmostApplicationObserver {
    tracked: Tracked,
    signal: Signal<FrontmostApplication>,
}

impl FrontmostApplicationObserver for MockFrontmostApplicationObserver {
    fn frontmost_app_changed(&self) -> &Signal<FrontmostApplication> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }
}

struct MockInputSourceObserver {
    tracked: Tracked,
    signal: Signal<InputSourceIdentifiers>,
}

impl InputSourceObserver for MockInputSourceObserver {
    fn input_source_changed(&self) -> &Signal<InputSourceIdentifiers> {
        &self.signal
    }

    fn start(&mut self) {
        self.tracked.started();
    }
}

struct MockPreferencesLauncher {
    recorder: Recorder,
}

impl PreferencesLauncher for MockPreferencesLauncher {
    fn launch_preferences(&self) {
        self.recorder.record(MockCall::LaunchPreferences);
    }
}

// ---------------------------------------------------------------------------
// MockComponents
// ---------------------------------------------------------------------------

/// Mock collaborator factory for testing.
pub struct MockComponents {
    recorder: Recorder,
    endpoint_address: PathBuf,
}

impl MockComponents {
    /// Create a new mock factory and a handle for driving it.
    pub fn new() -> (Self, MockHandle) {
        let recorder = Recorder::default();
        let handle = MockHandle {
            recorder: recorder.clone(),
        };
        let components = Self {
            recorder,
            endpoint_address: PathBuf::from("/tmp/remap-companion-mock/session.sock"),
        };
        (components, handle)
    }

    fn remember<E>(
        &self,
        pick: impl FnOnce(&mut MockState) -> &mut Option<Signal<E>>,
        signal: &Signal<E>,
    ) {
        let mut state = self.recorder.state.lock().unwrap();
        *pick(&mut *state) = Some(signal.clone());
    }
}

impl ComponentFactory for MockComponents {
    fn session_user_monitor(&self) -> Box<dyn SessionUserMonitor> {
        let signal = Signal::new();
        self.remember(|s| &mut s.session_user, &signal);
        Box::new(MockSessionUserMonitor {
            tracked: Tracked::new(Component::SessionUserMonitor, &self.recorder),
            signal,
        })
    }

    fn version_monitor(&self) -> Arc<dyn VersionMonitor> {
        Arc::new(MockVersionMonitor {
            tracked: Tracked::new(Component::VersionMonitor, &self.recorder),
        })
    }

    fn alert_file_monitor(&self, _path: &Path) -> Box<dyn AlertFileMonitor> {
        let signal = Signal::new();
        self.remember(|s| &mut s.alerts, &signal);
        Box::new(MockAlertFileMonitor {
            tracked: Tracked::new(Component::AlertFileMonitor, &self.recorder),
            signal,
        })
    }

    fn endpoint(&self) -> Box<dyn Endpoint> {
        let signal = Signal::new();
        self.remember(|s| &mut s.endpoint, &signal);
        Box::new(MockEndpoint {
            tracked: Tracked::new(Component::Endpoint, &self.recorder),
            signal,
            address: self.endpoint_address.clone(),
        })
    }

    fn remapper_client(&self) -> Box<dyn RemapperClient> {
        let signal = Signal::new();
        self.remember(|s| &mut s.client, &signal);
        Box::new(MockRemapperClient {
            tracked: Tracked::new(Component::RemapperClient, &self.recorder),
            signal,
        })
    }

    fn configuration_monitor(&self, _path: &Path) -> Arc<dyn ConfigurationMonitor> {
        let (tx, _rx) = watch::channel(None);
        Arc::new(MockConfigurationMonitor {
            tracked: Tracked::new(Component::ConfigurationMonitor, &self.recorder),
            tx,
        })
    }

    fn menu_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager> {
        Box::new(MockHelperProcessManager {
            _tracked: Tracked::new(Component::MenuProcessManager, &self.recorder),
            kind: HelperKind::Menu,
            _configuration: Arc::clone(configuration),
        })
    }

    fn updater_process_manager(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn HelperProcessManager> {
        Box::new(MockHelperProcessManager {
            _tracked: Tracked::new(Component::UpdaterProcessManager, &self.recorder),
            kind: HelperKind::Updater,
            _configuration: Arc::clone(configuration),
        })
    }

    fn system_preferences_monitor(
        &self,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Box<dyn SystemPreferencesMonitor> {
        let signal = Signal::new();
        self.remember(|s| &mut s.preferences, &signal);
        Box::new(MockSystemPreferencesMonitor {
            tracked: Tracked::new(Component::SystemPreferencesMonitor, &self.recorder),
            signal,
            _configuration: Arc::clone(configuration),
        })
    }

    fn frontmost_application_observer(&self) -> Box<dyn FrontmostApplicationObserver> {
        let signal = Signal::new();
        self.remember(|s| &mut s.frontmost, &signal);
        Box::new(MockFrontmostApplicationObserver {
            tracked: Tracked::new(Component::FrontmostApplicationObserver, &self.recorder),
            signal,
        })
    }

    fn input_source_observer(&self) -> Box<dyn InputSourceObserver> {
        let signal = Signal::new();
        self.remember(|s| &mut s.input_source, &signal);
        Box::new(MockInputSourceObserver {
            tracked: Tracked::new(Component::InputSourceObserver, &self.recorder),
            signal,
        })
    }

    fn preferences_launcher(&self) -> Box<dyn PreferencesLauncher> {
        Box::new(MockPreferencesLauncher {
            recorder: self.recorder.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockHandle
// ---------------------------------------------------------------------------

/// Clonable handle for driving and observing [`MockComponents`].
///
/// The `emit_*` methods raise a notification on the most recently created
/// instance of that kind, from the calling thread, and return `false` when no
/// such instance was ever created.
#[derive(Clone)]
pub struct MockHandle {
    recorder: Recorder,
}

impl MockHandle {
    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<MockCall> {
        self.recorder.state.lock().unwrap().calls.clone()
    }

    /// Number of instances of `component` currently alive.
    pub fn live(&self, component: Component) -> u32 {
        self.recorder
            .state
            .lock()
            .unwrap()
            .live
            .get(&component)
            .copied()
            .unwrap_or(0)
    }

    /// Number of instances of `component` ever created.
    pub fn created(&self, component: Component) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Created(k, _) if *k == component))
            .count()
    }

    /// Count of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Signal of the latest endpoint, kept so tests can emit on it after it
    /// has been replaced.
    pub fn endpoint_signal(&self) -> Option<Signal<EndpointEvent>> {
        self.recorder.state.lock().unwrap().endpoint.clone()
    }

    /// Signal of the latest remapper client.
    pub fn client_signal(&self) -> Option<Signal<ClientEvent>> {
        self.recorder.state.lock().unwrap().client.clone()
    }

    /// Signal of the latest frontmost application observer.
    pub fn frontmost_signal(&self) -> Option<Signal<FrontmostApplication>> {
        self.recorder.state.lock().unwrap().frontmost.clone()
    }

    pub fn emit_session_user(&self, uid: UserId) -> bool {
        let signal = self.recorder.state.lock().unwrap().session_user.clone();
        emit(signal, &uid)
    }

    pub fn emit_alerts(&self, alerts: Vec<Alert>) -> bool {
        let signal = self.recorder.state.lock().unwrap().alerts.clone();
        emit(signal, &alerts)
    }

    pub fn emit_endpoint(&self, event: EndpointEvent) -> bool {
        emit(self.endpoint_signal(), &event)
    }

    pub fn emit_client(&self, event: ClientEvent) -> bool {
        emit(self.client_signal(), &event)
    }

    pub fn emit_preferences(&self, preferences: SystemPreferences) -> bool {
        let signal = self.recorder.state.lock().unwrap().preferences.clone();
        emit(signal, &preferences)
    }

    pub fn emit_frontmost(&self, application: FrontmostApplication) -> bool {
        emit(self.frontmost_signal(), &application)
    }

    pub fn emit_input_source(&self, identifiers: InputSourceIdentifiers) -> bool {
        let signal = self.recorder.state.lock().unwrap().input_source.clone();
        emit(signal, &identifiers)
    }
}

// The state lock is released before emitting; handlers may call back into
// the factory from another thread.
fn emit<E>(signal: Option<Signal<E>>, event: &E) -> bool {
    match signal {
        Some(signal) => {
            signal.emit(event);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_is_recorded_and_live_count_falls() {
        let (components, handle) = MockComponents::new();
        let endpoint = components.endpoint();
        assert_eq!(handle.live(Component::Endpoint), 1);
        drop(endpoint);
        assert_eq!(handle.live(Component::Endpoint), 0);
        assert!(matches!(
            handle.calls().last(),
            Some(MockCall::Dropped(Component::Endpoint, _))
        ));
    }

    #[test]
    fn emit_reaches_latest_instance() {
        let (components, handle) = MockComponents::new();
        assert!(!handle.emit_client(ClientEvent::Connected));

        let client = components.remapper_client();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        client
            .events()
            .connect(move |e| s.lock().unwrap().push(e.clone()));

        assert!(handle.emit_client(ClientEvent::Connected));
        assert_eq!(*seen.lock().unwrap(), vec![ClientEvent::Connected]);
    }

    #[test]
    fn forwarded_calls_are_recorded() {
        let (components, handle) = MockComponents::new();
        let client = components.remapper_client();
        let app = FrontmostApplication::new("org.gnu.emacs", "/usr/bin/emacs");
        client.forward_frontmost_app(&app);
        assert_eq!(
            handle.count(|c| *c == MockCall::ForwardFrontmostApp(app.clone())),
            1
        );
    }
}
