pub mod amount;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a fungible asset type, e.g. `"FLOW"` or `"USDC"`.
///
/// Two containers may only be merged, and a connector may only be wired to another, when their
/// asset types are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetType(String);

impl AssetType {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AssetType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Key of a vault inside a [`crate::storage::ValueStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub u64);

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vault #{}", self.0)
    }
}
