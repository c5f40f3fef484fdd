//! Observers backed by a JSON state file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use companion_types::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::poll::{AbortOnDrop, ConfigurationReceiver, FilePoller};
use crate::alert::parse_alerts;
use crate::{
    Alert, AlertFileMonitor, ConfigurationMonitor, FrontmostApplicationObserver,
    InputSourceObserver, ObserverError, Signal, SystemPreferencesMonitor,
};

/// Watches one JSON file and raises its parsed content on every change.
pub struct JsonStateObserver<T> {
    path: PathBuf,
    interval: Duration,
    parse: fn(&[u8]) -> Result<T, ObserverError>,
    rearm: Option<ConfigurationReceiver>,
    signal: Signal<T>,
    task: Option<AbortOnDrop>,
}

/// Alerts written by the remapper.
pub type JsonAlertsMonitor = JsonStateObserver<Vec<Alert>>;
/// System preferences snapshot published by the desktop integration.
pub type JsonSystemPreferencesMonitor = JsonStateObserver<SystemPreferences>;
/// Focused application published by the desktop integration.
pub type JsonFrontmostApplicationObserver = JsonStateObserver<FrontmostApplication>;
/// Selected input source published by the desktop integration.
pub type JsonInputSourceObserver = JsonStateObserver<InputSourceIdentifiers>;

impl<T: Send + 'static> JsonStateObserver<T> {
    fn with_parser(
        path: PathBuf,
        interval: Duration,
        parse: fn(&[u8]) -> Result<T, ObserverError>,
    ) -> Self {
        Self {
            path,
            interval,
            parse,
            rearm: None,
            signal: Signal::new(),
            task: None,
        }
    }

    fn start_polling(&mut self) {
        if self.task.is_some() {
            return;
        }
        debug!(path = %self.path.display(), "watching state file");

        let mut poller = FilePoller::new(self.path.clone(), self.interval);
        if let Some(rearm) = self.rearm.take() {
            poller = poller.rearm_on(rearm);
        }
        let signal = self.signal.clone();
        self.task = Some(poller.spawn(self.parse, move |value| signal.emit(&value)));
    }
}

impl<T: DeserializeOwned + Send + 'static> JsonStateObserver<T> {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self::with_parser(path, interval, parse_json::<T>)
    }
}

impl JsonAlertsMonitor {
    pub fn alerts(path: PathBuf, interval: Duration) -> Self {
        Self::with_parser(path, interval, parse_alerts)
    }
}

impl JsonSystemPreferencesMonitor {
    /// The snapshot is re-raised whenever the configuration changes, since
    /// the remapper applies the two together.
    pub fn with_configuration(
        path: PathBuf,
        interval: Duration,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Self {
        let mut monitor = Self::new(path, interval);
        monitor.rearm = Some(configuration.subscribe());
        monitor
    }
}

impl<T> Drop for JsonStateObserver<T> {
    fn drop(&mut self) {
        self.signal.disconnect_all();
    }
}

fn parse_json<T: DeserializeOwned>(content: &[u8]) -> Result<T, ObserverError> {
    serde_json::from_slice(content).map_err(|e| ObserverError::Parse {
        what: "state file",
        reason: e.to_string(),
    })
}

impl AlertFileMonitor for JsonAlertsMonitor {
    fn alerts_changed(&self) -> &Signal<Vec<Alert>> {
        &self.signal
    }

    fn start(&mut self) {
        self.start_polling();
    }
}

impl SystemPreferencesMonitor for JsonSystemPreferencesMonitor {
    fn preferences_changed(&self) -> &Signal<SystemPreferences> {
        &self.signal
    }

    fn start(&mut self) {
        self.start_polling();
    }
}

impl FrontmostApplicationObserver for JsonFrontmostApplicationObserver {
    fn frontmost_app_changed(&self) -> &Signal<FrontmostApplication> {
        &self.signal
    }

    fn start(&mut self) {
        self.start_polling();
    }
}

impl InputSourceObserver for JsonInputSourceObserver {
    fn input_source_changed(&self) -> &Signal<InputSourceIdentifiers> {
        &self.signal
    }

    fn start(&mut self) {
        self.start_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn frontmost_observer_raises_parsed_application() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frontmost_application.json");
        std::fs::write(
            &path,
            r#"{"bundle_identifier": "org.gnu.emacs", "file_path": "/usr/bin/emacs"}"#,
        )
        .unwrap();

        let mut observer = JsonFrontmostApplicationObserver::new(path, Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel();
        observer.frontmost_app_changed().connect(move |app| {
            let _ = tx.send(app.clone());
        });
        observer.start();

        let app = rx.recv().await.unwrap();
        assert_eq!(app.bundle_identifier, "org.gnu.emacs");
    }

    #[tokio::test]
    async fn alerts_monitor_reports_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        std::fs::write(&path, r#"{"alerts": []}"#).unwrap();

        let mut monitor = JsonAlertsMonitor::alerts(path, Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel();
        monitor.alerts_changed().connect(move |alerts| {
            let _ = tx.send(alerts.len());
        });
        monitor.start();

        assert_eq!(rx.recv().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_observer_stops_raising() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input_source.json");
        std::fs::write(&path, r#"{"language": "en"}"#).unwrap();

        let mut observer = JsonInputSourceObserver::new(path.clone(), Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel();
        observer.input_source_changed().connect(move |ids| {
            let _ = tx.send(ids.clone());
        });
        observer.start();
        assert_eq!(rx.recv().await.unwrap().language.as_deref(), Some("en"));

        drop(observer);
        std::fs::write(&path, r#"{"language": "fr"}"#).unwrap();
        // The handler (and with it the sender) is gone once the observer is dropped.
        assert!(rx.recv().await.is_none());
    }
}
