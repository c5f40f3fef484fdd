//! Helper process supervision driven by the core configuration.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::poll::{AbortOnDrop, ConfigurationReceiver};
use crate::{ConfigurationMonitor, HelperKind, HelperProcessManager, ObserverError};

/// Spawn `argv` with stdio detached.
pub(crate) fn spawn_command(argv: &[String], kill_on_drop: bool) -> Result<Child, ObserverError> {
    let (program, args) = argv.split_first().ok_or_else(|| ObserverError::Launch {
        program: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
    })?;
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(kill_on_drop)
        .spawn()
        .map_err(|source| ObserverError::Launch {
            program: program.clone(),
            source,
        })
}

/// Runs the menu or updater helper according to the configuration.
///
/// * `Menu` keeps the helper alive while the configuration asks for a menu
///   bar item and kills it otherwise. Dropping the manager kills it.
/// * `Updater` launches the helper once, on the first loaded configuration
///   with `check_for_updates_on_startup`, and leaves it running.
pub struct ProcessHelperManager {
    kind: HelperKind,
    _task: Option<AbortOnDrop>,
}

impl ProcessHelperManager {
    /// Must be called inside a tokio runtime. An empty `command` disables
    /// the helper.
    pub fn new(
        kind: HelperKind,
        command: Vec<String>,
        configuration: &Arc<dyn ConfigurationMonitor>,
    ) -> Self {
        if command.is_empty() {
            debug!(helper = %kind, "no helper command configured");
            return Self { kind, _task: None };
        }
        let rx = configuration.subscribe();
        let task = match kind {
            HelperKind::Menu => tokio::spawn(run_menu(command, rx)),
            HelperKind::Updater => tokio::spawn(run_updater(command, rx)),
        };
        Self {
            kind,
            _task: Some(AbortOnDrop::new(task)),
        }
    }
}

impl HelperProcessManager for ProcessHelperManager {
    fn kind(&self) -> HelperKind {
        self.kind
    }
}

async fn run_menu(command: Vec<String>, mut rx: ConfigurationReceiver) {
    let mut child: Option<Child> = None;
    loop {
        let wanted = rx.borrow_and_update().as_ref().map(|c| c.wants_menu());
        match wanted {
            Some(true) => {
                let running = match child.as_mut() {
                    Some(c) => matches!(c.try_wait(), Ok(None)),
                    None => false,
                };
                if !running {
                    match spawn_command(&command, true) {
                        Ok(c) => {
                            info!(helper = %HelperKind::Menu, pid = ?c.id(), "helper launched");
                            child = Some(c);
                        }
                        Err(e) => warn!(helper = %HelperKind::Menu, error = %e, "failed to launch helper"),
                    }
                }
            }
            Some(false) => {
                if let Some(mut c) = child.take() {
                    info!(helper = %HelperKind::Menu, "stopping helper");
                    let _ = c.kill().await;
                }
            }
            None => {}
        }

        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn run_updater(command: Vec<String>, mut rx: ConfigurationReceiver) {
    loop {
        let check = rx
            .borrow_and_update()
            .as_ref()
            .map(|c| c.global.check_for_updates_on_startup);
        if let Some(check) = check {
            if check {
                match spawn_command(&command, false) {
                    Ok(mut c) => {
                        info!(helper = %HelperKind::Updater, pid = ?c.id(), "helper launched");
                        let _ = c.wait().await;
                    }
                    Err(e) => {
                        warn!(helper = %HelperKind::Updater, error = %e, "failed to launch helper");
                    }
                }
            }
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
