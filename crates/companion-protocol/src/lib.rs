//! Unix socket transport and wire protocol for remap-companion.
//!
//! This crate handles message framing (length-prefixed bincode v2), the
//! companion's listening endpoint the remapper dials into, and the outbound
//! client the companion uses to forward session observations.

pub mod client;
pub mod connection;
pub mod error;
pub mod receiver;
pub mod wire;

pub use client::UnixRemapperClient;
pub use connection::{split, MessageReceiver, MessageSender};
pub use error::ProtocolError;
pub use receiver::UnixReceiver;
