//! Shared types for remap-companion.
//!
//! This crate contains the types shared across the workspace: the session
//! user identity, the observations the session companion forwards to the
//! remapper, and the protocol messages exchanged over the local socket.

pub mod message;
pub mod observation;
pub mod session;

pub use message::{CompanionMessage, ProtocolVersion, RemapperMessage, PROTOCOL_VERSION};
pub use observation::{
    FrontmostApplication, InputSourceIdentifiers, KeyboardType, KeyboardTypeEntry,
    SystemPreferences,
};
pub use session::UserId;
