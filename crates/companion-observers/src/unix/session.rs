//! Session owner detection from the console device.

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::Duration;

use companion_types::UserId;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::poll::AbortOnDrop;
use crate::{SessionUserMonitor, Signal};

/// Reports the owner of the console device as the session user.
///
/// Display managers chown the console (or the seat's tty) to the user that
/// owns the foreground session, so its owner changes on fast user switching.
pub struct ConsoleUserMonitor {
    path: PathBuf,
    interval: Duration,
    signal: Signal<UserId>,
    task: Option<AbortOnDrop>,
}

impl ConsoleUserMonitor {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            interval,
            signal: Signal::new(),
            task: None,
        }
    }
}

impl SessionUserMonitor for ConsoleUserMonitor {
    fn session_user_changed(&self) -> &Signal<UserId> {
        &self.signal
    }

    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let path = self.path.clone();
        let interval = self.interval;
        let signal = self.signal.clone();

        self.task = Some(AbortOnDrop::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<UserId> = None;
            loop {
                ticker.tick().await;
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) => {
                        let uid = UserId(metadata.uid());
                        if last != Some(uid) {
                            info!(uid = %uid, "session user changed");
                            last = Some(uid);
                            signal.emit(&uid);
                        }
                    }
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "console owner unavailable");
                    }
                }
            }
        })));
    }
}

impl Drop for ConsoleUserMonitor {
    fn drop(&mut self) {
        self.signal.disconnect_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn reports_owner_of_console_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let console = dir.path().join("console");
        std::fs::write(&console, b"").unwrap();
        let owner = std::fs::metadata(&console).unwrap().uid();

        let mut monitor = ConsoleUserMonitor::new(console, Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel();
        monitor.session_user_changed().connect(move |uid| {
            let _ = tx.send(*uid);
        });
        monitor.start();

        assert_eq!(rx.recv().await.unwrap(), UserId(owner));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
