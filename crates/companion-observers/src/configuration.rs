//! The user's core configuration, as far as the session companion reads it.
//!
//! Remapping rules are the remapper's business; only the global switches
//! that drive the helper processes are modelled here. Unknown keys are
//! ignored.

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfiguration {
    #[serde(default)]
    pub global: GlobalConfiguration,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfiguration {
    #[serde(default = "default_true")]
    pub check_for_updates_on_startup: bool,
    #[serde(default = "default_true")]
    pub show_in_menu_bar: bool,
    #[serde(default)]
    pub show_profile_name_in_menu_bar: bool,
}

impl Default for GlobalConfiguration {
    fn default() -> Self {
        Self {
            check_for_updates_on_startup: true,
            show_in_menu_bar: true,
            show_profile_name_in_menu_bar: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub selected: bool,
}

impl CoreConfiguration {
    pub fn from_json(content: &[u8]) -> Result<Self, ObserverError> {
        serde_json::from_slice(content).map_err(|e| ObserverError::Parse {
            what: "core configuration",
            reason: e.to_string(),
        })
    }

    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.selected)
    }

    /// Whether the menu helper should be running.
    pub fn wants_menu(&self) -> bool {
        self.global.show_in_menu_bar || self.global.show_profile_name_in_menu_bar
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = CoreConfiguration::from_json(b"{}").unwrap();
        assert!(config.global.check_for_updates_on_startup);
        assert!(config.wants_menu());
        assert!(config.selected_profile().is_none());
    }

    #[test]
    fn parses_globals_and_profiles() {
        let config = CoreConfiguration::from_json(
            br#"{
                "global": {
                    "check_for_updates_on_startup": false,
                    "show_in_menu_bar": false,
                    "show_profile_name_in_menu_bar": true
                },
                "profiles": [
                    {"name": "Default profile", "selected": false, "complex_modifications": {}},
                    {"name": "Gaming", "selected": true}
                ]
            }"#,
        )
        .unwrap();
        assert!(!config.global.check_for_updates_on_startup);
        assert!(config.wants_menu());
        assert_eq!(config.selected_profile().unwrap().name, "Gaming");
    }

    #[test]
    fn menu_hidden_when_both_switches_off() {
        let config = CoreConfiguration::from_json(
            br#"{"global": {"show_in_menu_bar": false, "show_profile_name_in_menu_bar": false}}"#,
        )
        .unwrap();
        assert!(!config.wants_menu());
    }
}
