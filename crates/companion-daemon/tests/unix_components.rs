//! End-to-end run of the supervisor over real sockets and files.

#![cfg(feature = "unix")]

use std::time::Duration;

use companion_daemon::components::UnixComponents;
use companion_daemon::config::Config;
use companion_daemon::setup::effective_uid;
use companion_daemon::{LifecycleState, Supervisor, SupervisorStatus};
use companion_observers::Signal;
use companion_protocol::split;
use companion_types::{CompanionMessage, RemapperMessage};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(10);

async fn wait_for_state(rx: &mut watch::Receiver<SupervisorStatus>, state: LifecycleState) {
    timeout(WAIT, async {
        loop {
            if rx.borrow_and_update().state == state {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("supervisor never reached {state}"));
}

fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.paths.configuration_directory = root.join("config");
    config.paths.core_configuration_file = root.join("config").join("remap.json");
    config.paths.alerts_file = root.join("alerts.json");
    config.paths.version_file = root.join("version");
    config.paths.console_path = root.join("console");
    config.paths.session_directory = root.join("session");
    config.remapper.socket = root.join("remapper.sock");
    config.remapper.reconnect_interval_ms = 50;
    config.remapper.rebind_interval_ms = 50;
    config.polling.interval_ms = 20;
    config.helpers.menu = Vec::new();
    config.helpers.updater = Vec::new();
    config.helpers.preferences = Vec::new();
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisor_connects_and_forwards_to_remapper() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    // Created by this process, so the session is self-owned.
    std::fs::write(&config.paths.console_path, b"").unwrap();
    let remapper = UnixListener::bind(&config.remapper.socket).unwrap();

    let components = UnixComponents::new(config.clone(), effective_uid(), Signal::new()).unwrap();
    let settings = components.settings();
    let supervisor = Supervisor::new(Box::new(components), settings).unwrap();
    let mut status = supervisor.status_receiver();

    let (stream, _) = timeout(WAIT, remapper.accept()).await.unwrap().unwrap();
    let (_tx, mut rx) = split(stream);

    let hello: CompanionMessage = rx.recv().await.unwrap().unwrap();
    assert!(matches!(hello, CompanionMessage::Hello { user, .. } if user == effective_uid()));

    let announce: CompanionMessage = rx.recv().await.unwrap().unwrap();
    assert_eq!(
        announce,
        CompanionMessage::ConnectConsoleUserServer {
            endpoint: config
                .paths
                .endpoint_socket()
                .to_string_lossy()
                .into_owned(),
        }
    );
    wait_for_state(&mut status, LifecycleState::Active).await;
    assert!(config.paths.configuration_directory.is_dir());

    std::fs::write(
        config.paths.frontmost_application_file(),
        br#"{"bundle_identifier": "org.gnu.emacs", "file_path": "/usr/bin/emacs"}"#,
    )
    .unwrap();
    let forwarded = timeout(WAIT, async {
        loop {
            let msg: CompanionMessage = rx.recv().await.unwrap().unwrap();
            if let CompanionMessage::FrontmostApplicationChanged(app) = msg {
                return app;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(forwarded.bundle_identifier, "org.gnu.emacs");

    // The endpoint answers the remapper's liveness probe.
    let endpoint = tokio::net::UnixStream::connect(config.paths.endpoint_socket())
        .await
        .unwrap();
    let (mut probe_tx, mut probe_rx) = split(endpoint);
    probe_tx.send(&RemapperMessage::Ping { seq: 3 }).await.unwrap();
    let pong: CompanionMessage = probe_rx.recv().await.unwrap().unwrap();
    assert_eq!(pong, CompanionMessage::Pong { seq: 3 });

    tokio::task::spawn_blocking(move || supervisor.shutdown())
        .await
        .unwrap();
    assert!(!config.paths.endpoint_socket().exists());
}
