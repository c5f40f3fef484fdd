//! Polling file reader shared by the JSON-backed observers.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::{CoreConfiguration, ObserverError};

pub(crate) type ConfigurationReceiver = watch::Receiver<Option<Arc<CoreConfiguration>>>;

/// Aborts the wrapped task when dropped.
pub(crate) struct AbortOnDrop(JoinHandle<()>);

impl AbortOnDrop {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Reads a file every `interval` and reports parsed content whenever the raw
/// bytes differ from the previous read.
pub(crate) struct FilePoller {
    path: PathBuf,
    interval: Duration,
    rearm: Option<ConfigurationReceiver>,
}

impl FilePoller {
    pub(crate) fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            interval,
            rearm: None,
        }
    }

    /// Forget the last content whenever the configuration changes, so the
    /// next read is reported even if the file did not change.
    pub(crate) fn rearm_on(mut self, configuration: ConfigurationReceiver) -> Self {
        self.rearm = Some(configuration);
        self
    }

    pub(crate) fn spawn<T, P, F>(self, parse: P, mut on_change: F) -> AbortOnDrop
    where
        T: Send + 'static,
        P: Fn(&[u8]) -> Result<T, ObserverError> + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let Self {
            path,
            interval,
            mut rearm,
        } = self;

        AbortOnDrop::new(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Vec<u8>> = None;

            loop {
                let mut rearmed = false;
                let mut rearm_closed = false;
                tokio::select! {
                    _ = ticker.tick() => {}
                    alive = wait_changed(rearm.as_mut()) => {
                        if alive {
                            rearmed = true;
                        } else {
                            rearm_closed = true;
                        }
                    }
                }
                if rearm_closed {
                    rearm = None;
                }
                if rearmed {
                    last = None;
                }

                match tokio::fs::read(&path).await {
                    Ok(content) => {
                        if last.as_deref() == Some(content.as_slice()) {
                            continue;
                        }
                        match parse(&content) {
                            Ok(value) => {
                                trace!(path = %path.display(), "file changed");
                                on_change(value);
                            }
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "ignoring unparsable file");
                            }
                        }
                        last = Some(content);
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        if last.take().is_some() {
                            debug!(path = %path.display(), "file removed");
                        }
                    }
                    Err(source) => {
                        let e = ObserverError::Read {
                            path: path.display().to_string(),
                            source,
                        };
                        warn!(error = %e, "poll skipped");
                    }
                }
            }
        }))
    }
}

async fn wait_changed(rx: Option<&mut ConfigurationReceiver>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}
