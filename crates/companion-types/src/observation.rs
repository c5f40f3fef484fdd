//! Values observed in the login session and forwarded to the remapper.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Snapshot of the OS keyboard and pointer preferences the remapper depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SystemPreferences {
    /// Function keys act as F1..F12 without holding fn.
    #[serde(default)]
    pub use_fkeys_as_standard_function_keys: bool,
    /// Scroll direction follows finger movement.
    #[serde(default)]
    pub scroll_direction_is_natural: bool,
    /// Keyboard layout types per attached device.
    #[serde(default)]
    pub keyboard_types: Vec<KeyboardTypeEntry>,
}

/// Physical keyboard layout family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardType {
    Ansi,
    Iso,
    Jis,
}

/// Keyboard type assigned to one vendor/product pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct KeyboardTypeEntry {
    pub vendor_id: u32,
    pub product_id: u32,
    pub keyboard_type: KeyboardType,
}

/// The application that currently owns keyboard focus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FrontmostApplication {
    /// Bundle or desktop-entry identifier (e.g. "org.mozilla.firefox").
    #[serde(default)]
    pub bundle_identifier: String,
    /// Path of the application executable or bundle.
    #[serde(default)]
    pub file_path: String,
}

impl FrontmostApplication {
    pub fn new(bundle_identifier: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            bundle_identifier: bundle_identifier.into(),
            file_path: file_path.into(),
        }
    }
}

/// Identifiers of the currently selected keyboard input source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct InputSourceIdentifiers {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub input_source_id: Option<String>,
    #[serde(default)]
    pub input_mode_id: Option<String>,
}
