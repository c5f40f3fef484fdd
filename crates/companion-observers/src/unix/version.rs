//! Detects that the installed daemon was upgraded underneath us.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::poll::AbortOnDrop;
use crate::{Signal, VersionChanged, VersionMonitor};

struct Inner {
    path: PathBuf,
    running: String,
    fired: AtomicBool,
    signal: Signal<VersionChanged>,
}

impl Inner {
    async fn check(&self) {
        let installed = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "version file unavailable");
                return;
            }
        };
        if installed.is_empty() || installed == self.running {
            return;
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(running = %self.running, installed = %installed, "installed version changed");
        self.signal.emit(&VersionChanged {
            running: self.running.clone(),
            installed,
        });
    }
}

/// Compares a version file against the running package version, on a
/// fixed interval and on every manual check. The mismatch notification is
/// raised at most once; the process owner is expected to restart.
pub struct FileVersionMonitor {
    inner: Arc<Inner>,
    runtime: Handle,
    _task: AbortOnDrop,
}

impl FileVersionMonitor {
    /// Construct and start the periodic check on `runtime`.
    pub fn spawn(
        runtime: Handle,
        path: PathBuf,
        running: impl Into<String>,
        interval: Duration,
        signal: Signal<VersionChanged>,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            path,
            running: running.into(),
            fired: AtomicBool::new(false),
            signal,
        });

        let periodic = Arc::clone(&inner);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                periodic.check().await;
            }
        });

        Arc::new(Self {
            inner,
            runtime,
            _task: AbortOnDrop::new(task),
        })
    }
}

impl VersionMonitor for FileVersionMonitor {
    fn manual_check(&self) {
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(async move { inner.check().await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn mismatch_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version");
        std::fs::write(&path, "1.0.0\n").unwrap();

        let signal = Signal::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        signal.connect(move |changed: &VersionChanged| {
            let _ = tx.send(changed.clone());
        });

        let monitor = FileVersionMonitor::spawn(
            Handle::current(),
            path.clone(),
            "1.0.0",
            Duration::from_secs(3600),
            signal,
        );
        monitor.manual_check();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        std::fs::write(&path, "1.1.0\n").unwrap();
        monitor.manual_check();
        let changed = rx.recv().await.unwrap();
        assert_eq!(changed.installed, "1.1.0");
        assert_eq!(changed.running, "1.0.0");

        monitor.manual_check();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
