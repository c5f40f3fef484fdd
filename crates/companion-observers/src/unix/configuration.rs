//! Core configuration file monitor.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use super::poll::{AbortOnDrop, FilePoller};
use crate::{ConfigurationMonitor, CoreConfiguration};

/// Polls the user's core configuration JSON and publishes every successful
/// load to all subscribers.
pub struct JsonConfigurationMonitor {
    path: PathBuf,
    interval: Duration,
    tx: Arc<watch::Sender<Option<Arc<CoreConfiguration>>>>,
    task: Mutex<Option<AbortOnDrop>>,
}

impl JsonConfigurationMonitor {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            path,
            interval,
            tx: Arc::new(tx),
            task: Mutex::new(None),
        }
    }
}

impl ConfigurationMonitor for JsonConfigurationMonitor {
    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let tx = Arc::clone(&self.tx);
        let path = self.path.clone();
        *task = Some(
            FilePoller::new(self.path.clone(), self.interval).spawn(
                CoreConfiguration::from_json,
                move |configuration| {
                    info!(
                        path = %path.display(),
                        profile = configuration.selected_profile().map_or("", |p| p.name.as_str()),
                        "core configuration loaded"
                    );
                    tx.send_replace(Some(Arc::new(configuration)));
                },
            ),
        );
    }

    fn subscribe(&self) -> watch::Receiver<Option<Arc<CoreConfiguration>>> {
        self.tx.subscribe()
    }
}
