//! Session identity types.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// OS user id that owns a login session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl UserId {
    /// Get the raw uid.
    #[must_use]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for UserId {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
