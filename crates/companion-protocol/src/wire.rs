//! Wire format: length-prefixed bincode v2 frames.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian length][bincode v2 payload]

use bincode::{Decode, Encode};

use crate::error::ProtocolError;

/// Maximum message size (1 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Encode a message to a length-prefixed byte vector.
pub fn encode_message<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let config = bincode::config::standard();
    let payload = bincode::encode_to_vec(msg, config)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Serialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from a bincode v2 payload (without the length prefix).
pub fn decode_message<T: Decode<()>>(payload: &[u8]) -> Result<T, ProtocolError> {
    let config = bincode::config::standard();
    let (msg, _) = bincode::decode_from_slice(payload, config)
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_types::{CompanionMessage, SystemPreferences, PROTOCOL_VERSION, UserId};

    #[test]
    fn length_prefix_matches_payload() {
        let msg = CompanionMessage::Hello {
            version: PROTOCOL_VERSION,
            user: UserId(501),
        };

        let bytes = encode_message(&msg).unwrap();
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap());
        assert_eq!(len as usize, bytes.len() - 4);

        let decoded: CompanionMessage = decode_message(&bytes[4..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let msg = CompanionMessage::ConnectConsoleUserServer {
            endpoint: "x".repeat(MAX_MESSAGE_SIZE as usize + 1),
        };
        assert!(matches!(
            encode_message(&msg),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn truncated_payload_fails_to_decode() {
        let msg = CompanionMessage::SystemPreferencesUpdated(SystemPreferences {
            use_fkeys_as_standard_function_keys: true,
            ..SystemPreferences::default()
        });
        let bytes = encode_message(&msg).unwrap();
        let result: Result<CompanionMessage, _> = decode_message(&bytes[4..bytes.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }
}
