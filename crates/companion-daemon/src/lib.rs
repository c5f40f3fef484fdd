//! Session supervisor for remap-companion.
//!
//! Owns the serial task queue and the lifecycle state machine that keeps the
//! local endpoint, the remapper client and the session observers in step
//! with the active login session and the remapper connection.

pub mod config;
#[cfg(feature = "unix")]
pub mod components;
pub mod error;
pub mod queue;
pub mod setup;
pub mod state;
pub mod supervisor;

pub use config::Config;
pub use error::DaemonError;
pub use state::LifecycleState;
pub use supervisor::{Supervisor, SupervisorSettings, SupervisorStatus};
