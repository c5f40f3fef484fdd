//! File- and process-backed collaborators for Unix desktops.
//!
//! The privileged remapper and the desktop-session integration publish their
//! state as small JSON files; these backends poll them and raise the
//! matching signals. Every backend owns its own poll interval; the
//! supervisor never schedules anything itself.

mod configuration;
mod launcher;
mod poll;
mod process;
mod session;
mod state;
mod version;

pub use configuration::JsonConfigurationMonitor;
pub use launcher::CommandLauncher;
pub use process::ProcessHelperManager;
pub use session::ConsoleUserMonitor;
pub use state::{
    JsonAlertsMonitor, JsonFrontmostApplicationObserver, JsonInputSourceObserver,
    JsonStateObserver, JsonSystemPreferencesMonitor,
};
pub use version::FileVersionMonitor;
