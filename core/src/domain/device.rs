//! Device identity model.

use serde::{Deserialize, Serialize};

/// Identity of one attached scanner within an enumeration snapshot.
///
/// The identity string is the only selection key exposed upward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identity: String,
}

impl DeviceInfo {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.identity)
    }
}
