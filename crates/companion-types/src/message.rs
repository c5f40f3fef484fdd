//! Protocol message types.
//!
//! Messages are exchanged over Unix-domain sockets between the session
//! companion and the privileged remapper.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::observation::{FrontmostApplication, InputSourceIdentifiers, SystemPreferences};
use crate::session::UserId;

/// Current protocol version.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 0, minor: 1 };

/// Protocol version for compatibility negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Messages sent by the session companion to the remapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum CompanionMessage {
    /// First message on every new client connection.
    Hello {
        version: ProtocolVersion,
        user: UserId,
    },

    /// Tell the remapper where the companion's own endpoint listens.
    ConnectConsoleUserServer {
        /// Socket path of the companion endpoint.
        endpoint: String,
    },

    /// System preferences snapshot changed.
    SystemPreferencesUpdated(SystemPreferences),

    /// Keyboard focus moved to another application.
    FrontmostApplicationChanged(FrontmostApplication),

    /// Selected input source changed.
    InputSourceChanged(InputSourceIdentifiers),

    /// Answer to a remapper ping on the endpoint.
    Pong {
        /// Echoed sequence number.
        seq: u64,
    },

    /// Graceful disconnect.
    Bye,
}

/// Messages the remapper sends to the companion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum RemapperMessage {
    /// First message on an inbound endpoint connection.
    Hello { version: ProtocolVersion },

    /// Liveness probe.
    Ping {
        /// Sequence number for RTT measurement.
        seq: u64,
    },

    /// Graceful disconnect.
    Bye,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bincode_roundtrip<T: Encode + Decode<()> + std::fmt::Debug>(value: &T) -> T {
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(value, config).unwrap();
        let (decoded, _): (T, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        decoded
    }

    #[test]
    fn frontmost_application_roundtrip() {
        let msg = CompanionMessage::FrontmostApplicationChanged(FrontmostApplication::new(
            "org.mozilla.firefox",
            "/usr/lib/firefox/firefox",
        ));
        assert_eq!(bincode_roundtrip(&msg), msg);
    }

    #[test]
    fn input_source_with_missing_fields_roundtrip() {
        let msg = CompanionMessage::InputSourceChanged(InputSourceIdentifiers {
            language: Some("ja".to_string()),
            input_source_id: None,
            input_mode_id: Some("com.apple.inputmethod.Japanese".to_string()),
        });
        assert_eq!(bincode_roundtrip(&msg), msg);
    }

    #[test]
    fn protocol_version_display() {
        assert_eq!(PROTOCOL_VERSION.to_string(), "0.1");
    }
}
