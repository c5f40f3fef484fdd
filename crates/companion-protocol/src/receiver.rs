//! The companion's listening endpoint.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion_observers::{Endpoint, EndpointEvent, Signal};
use companion_types::{CompanionMessage, ProtocolVersion, RemapperMessage, PROTOCOL_VERSION};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::connection::split;
use crate::error::ProtocolError;

/// Unix-socket endpoint the remapper dials into.
///
/// Binding is retried every `rebind_interval` after a failure or after the
/// listener dies; each attempt raises `Bound` or `BindFailed`, and a dead
/// listener raises `Closed`.
pub struct UnixReceiver {
    path: PathBuf,
    rebind_interval: Duration,
    signal: Signal<EndpointEvent>,
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl UnixReceiver {
    pub fn new(path: PathBuf, rebind_interval: Duration) -> Self {
        Self {
            path,
            rebind_interval,
            signal: Signal::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl Endpoint for UnixReceiver {
    fn events(&self) -> &Signal<EndpointEvent> {
        &self.signal
    }

    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.task = Some(tokio::spawn(run(
            self.path.clone(),
            self.rebind_interval,
            self.signal.clone(),
            Arc::clone(&self.cancelled),
        )));
    }

    fn address(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixReceiver {
    fn drop(&mut self) {
        self.signal.disconnect_all();
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = %self.path.display(), error = %e, "failed to remove socket");
                }
            }
        }
    }
}

async fn run(
    path: PathBuf,
    rebind_interval: Duration,
    signal: Signal<EndpointEvent>,
    cancelled: Arc<AtomicBool>,
) {
    loop {
        // Abort only lands at an await; a replaced endpoint must not touch
        // the socket its successor owns.
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        match bind(&path) {
            Ok(listener) => {
                info!(path = %path.display(), "endpoint bound");
                signal.emit(&EndpointEvent::Bound);
                let e = serve(listener).await;
                warn!(path = %path.display(), error = %e, "endpoint closed");
                signal.emit(&EndpointEvent::Closed);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "endpoint bind failed");
                signal.emit(&EndpointEvent::BindFailed(e.to_string()));
            }
        }
        tokio::time::sleep(rebind_interval).await;
    }
}

fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        // A socket something still accepts on is live, not stale.
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} is in use", path.display()),
            ));
        }
        // A previous instance may have left its socket behind.
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    UnixListener::bind(path)
}

/// Accept remapper connections until the listener fails.
async fn serve(listener: UnixListener) -> io::Error {
    // Dropping the set (on abort) tears down every open connection.
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("remapper connected to endpoint");
                    connections.spawn(handle_connection(stream));
                }
                Err(e) => return e,
            },
            Some(finished) = connections.join_next() => {
                if let Ok(Err(e)) = finished {
                    debug!(error = %e, "endpoint connection ended with error");
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream) -> Result<(), ProtocolError> {
    let (mut tx, mut rx) = split(stream);
    while let Some(msg) = rx.recv::<RemapperMessage>().await? {
        match msg {
            RemapperMessage::Hello { version } => {
                verify_version(version)?;
                debug!(%version, "remapper hello");
            }
            RemapperMessage::Ping { seq } => {
                tx.send(&CompanionMessage::Pong { seq }).await?;
            }
            RemapperMessage::Bye => break,
        }
    }
    Ok(())
}

fn verify_version(remote: ProtocolVersion) -> Result<(), ProtocolError> {
    if remote.major != PROTOCOL_VERSION.major {
        return Err(ProtocolError::VersionMismatch {
            remote: remote.to_string(),
            local: PROTOCOL_VERSION.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_leaves_a_live_socket_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companion.sock");
        let live = UnixListener::bind(&path).unwrap();

        let err = bind(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        // The original listener still owns the path.
        let _client = UnixStream::connect(&path).await.unwrap();
        let (_accepted, _) = live.accept().await.unwrap();
    }

    #[tokio::test]
    async fn bind_replaces_a_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companion.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = bind(&path).unwrap();
        let _client = UnixStream::connect(&path).await.unwrap();
        let (_accepted, _) = listener.accept().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_run_never_binds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companion.sock");
        let cancelled = Arc::new(AtomicBool::new(true));

        run(
            path.clone(),
            Duration::from_millis(1),
            Signal::new(),
            cancelled,
        )
        .await;
        assert!(!path.exists());
    }

    #[test]
    fn minor_version_difference_is_accepted() {
        let remote = ProtocolVersion {
            major: PROTOCOL_VERSION.major,
            minor: PROTOCOL_VERSION.minor + 1,
        };
        assert!(verify_version(remote).is_ok());
    }

    #[test]
    fn major_version_difference_is_rejected() {
        let remote = ProtocolVersion {
            major: PROTOCOL_VERSION.major + 1,
            minor: 0,
        };
        assert!(matches!(
            verify_version(remote),
            Err(ProtocolError::VersionMismatch { .. })
        ));
    }
}
