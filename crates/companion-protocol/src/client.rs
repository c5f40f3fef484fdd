//! Outbound client to the remapper.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion_observers::{ClientEvent, RemapperClient, Signal};
use companion_types::{
    CompanionMessage, FrontmostApplication, InputSourceIdentifiers, RemapperMessage,
    SystemPreferences, UserId, PROTOCOL_VERSION,
};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::connection::{split, MessageReceiver, MessageSender};

/// Unix-socket client that forwards session observations to the remapper.
///
/// After a failed dial or a lost connection the client dials again every
/// `reconnect_interval`. Messages forwarded while disconnected are dropped.
pub struct UnixRemapperClient {
    remapper: PathBuf,
    user: UserId,
    reconnect_interval: Duration,
    signal: Signal<ClientEvent>,
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<CompanionMessage>,
    outbound_rx: Option<mpsc::UnboundedReceiver<CompanionMessage>>,
    task: Option<JoinHandle<()>>,
}

impl UnixRemapperClient {
    pub fn new(remapper: PathBuf, user: UserId, reconnect_interval: Duration) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self {
            remapper,
            user,
            reconnect_interval,
            signal: Signal::new(),
            connected: Arc::new(AtomicBool::new(false)),
            outbound,
            outbound_rx: Some(outbound_rx),
            task: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, msg: CompanionMessage) {
        if !self.is_connected() {
            trace!("dropping message while disconnected");
            return;
        }
        let _ = self.outbound.send(msg);
    }
}

impl RemapperClient for UnixRemapperClient {
    fn events(&self) -> &Signal<ClientEvent> {
        &self.signal
    }

    fn start(&mut self) {
        let Some(outbound) = self.outbound_rx.take() else {
            return;
        };
        let session = Session {
            remapper: self.remapper.clone(),
            user: self.user,
            reconnect_interval: self.reconnect_interval,
            signal: self.signal.clone(),
            connected: Arc::clone(&self.connected),
        };
        self.task = Some(tokio::spawn(session.run(outbound)));
    }

    fn announce_self(&self, endpoint: &Path) {
        self.send(CompanionMessage::ConnectConsoleUserServer {
            endpoint: endpoint.to_string_lossy().into_owned(),
        });
    }

    fn forward_preferences(&self, preferences: &SystemPreferences) {
        self.send(CompanionMessage::SystemPreferencesUpdated(preferences.clone()));
    }

    fn forward_frontmost_app(&self, application: &FrontmostApplication) {
        self.send(CompanionMessage::FrontmostApplicationChanged(
            application.clone(),
        ));
    }

    fn forward_input_source(&self, identifiers: &InputSourceIdentifiers) {
        self.send(CompanionMessage::InputSourceChanged(identifiers.clone()));
    }
}

impl Drop for UnixRemapperClient {
    fn drop(&mut self) {
        self.signal.disconnect_all();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Session {
    remapper: PathBuf,
    user: UserId,
    reconnect_interval: Duration,
    signal: Signal<ClientEvent>,
    connected: Arc<AtomicBool>,
}

impl Session {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<CompanionMessage>) {
        loop {
            match self.dial().await {
                Ok((tx, rx)) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!(path = %self.remapper.display(), "connected to remapper");
                    self.signal.emit(&ClientEvent::Connected);

                    let reason = pump(tx, rx, &mut outbound).await;

                    self.connected.store(false, Ordering::SeqCst);
                    while outbound.try_recv().is_ok() {}
                    info!(reason = %reason, "remapper connection closed");
                    self.signal.emit(&ClientEvent::Closed);
                }
                Err(e) => {
                    debug!(path = %self.remapper.display(), error = %e, "remapper connect failed");
                    self.signal.emit(&ClientEvent::ConnectFailed(e));
                }
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }

    async fn dial(
        &self,
    ) -> Result<(MessageSender<OwnedWriteHalf>, MessageReceiver<OwnedReadHalf>), String> {
        let stream = UnixStream::connect(&self.remapper)
            .await
            .map_err(|e| e.to_string())?;
        let (mut tx, rx) = split(stream);
        tx.send(&CompanionMessage::Hello {
            version: PROTOCOL_VERSION,
            user: self.user,
        })
        .await
        .map_err(|e| e.to_string())?;
        Ok((tx, rx))
    }
}

/// Write outbound messages until either side goes away; returns why.
async fn pump(
    mut tx: MessageSender<OwnedWriteHalf>,
    rx: MessageReceiver<OwnedReadHalf>,
    outbound: &mut mpsc::UnboundedReceiver<CompanionMessage>,
) -> String {
    // Pinned outside the loop: `recv` is not cancel safe.
    let closed = read_until_closed(rx);
    tokio::pin!(closed);

    loop {
        tokio::select! {
            reason = &mut closed => return reason,
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = tx.send(&msg).await {
                        return e.to_string();
                    }
                }
                None => return "client dropped".to_string(),
            },
        }
    }
}

async fn read_until_closed(mut rx: MessageReceiver<OwnedReadHalf>) -> String {
    loop {
        match rx.recv::<RemapperMessage>().await {
            Ok(Some(RemapperMessage::Bye) | None) => return "closed by remapper".to_string(),
            Ok(Some(msg)) => trace!(?msg, "ignoring remapper message on client connection"),
            Err(e) => return e.to_string(),
        }
    }
}
