//! Handles granting access to vaults in a value store.
//!
//! Authority is split across distinct types so that a factory can ask for exactly the access it
//! needs:
//!
//! - [`OwnedVault`]: full authority. Held by whoever opened the vault; issues the other handles.
//! - [`WithdrawCapability`]: may withdraw and read the balance. Not `Clone`, so the same withdraw
//!   authority is never handed out twice.
//! - [`DepositCapability`]: may deposit and read the balance. Freely cloneable.
//!
//! Capabilities can be revoked individually in the store; the owner handle cannot.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AssetType, VaultId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(Uuid);

impl CapabilityId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Read access to a vault; common to every handle type.
pub trait VaultAccess: fmt::Debug + fmt::Display + Send + Sync {
    fn vault_id(&self) -> VaultId;

    /// Asset type the handle was issued for.
    fn asset_type(&self) -> &AssetType;

    /// `None` for the owner handle, which cannot be revoked.
    fn capability_id(&self) -> Option<&CapabilityId>;
}

/// Marker for handles allowed to withdraw.
pub trait CanWithdraw: VaultAccess {}

/// Marker for handles allowed to deposit.
pub trait CanDeposit: VaultAccess {}

/// Owner handle of a vault.
#[derive(Debug, PartialEq, Eq)]
pub struct OwnedVault {
    vault: VaultId,
    asset_type: AssetType,
}

impl OwnedVault {
    pub(crate) fn new(vault: VaultId, asset_type: AssetType) -> Self {
        Self { vault, asset_type }
    }

    pub fn withdraw_capability(&self) -> WithdrawCapability {
        WithdrawCapability {
            id: CapabilityId::new(),
            vault: self.vault,
            asset_type: self.asset_type.clone(),
        }
    }

    pub fn deposit_capability(&self) -> DepositCapability {
        DepositCapability {
            id: CapabilityId::new(),
            vault: self.vault,
            asset_type: self.asset_type.clone(),
        }
    }
}

impl fmt::Display for OwnedVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner of {}", self.vault)
    }
}

impl VaultAccess for OwnedVault {
    fn vault_id(&self) -> VaultId {
        self.vault
    }

    fn asset_type(&self) -> &AssetType {
        &self.asset_type
    }

    fn capability_id(&self) -> Option<&CapabilityId> {
        None
    }
}

impl CanWithdraw for OwnedVault {}

impl CanDeposit for OwnedVault {}

#[derive(Debug, PartialEq, Eq)]
pub struct WithdrawCapability {
    id: CapabilityId,
    vault: VaultId,
    asset_type: AssetType,
}

impl WithdrawCapability {
    pub fn id(&self) -> &CapabilityId {
        &self.id
    }
}

impl fmt::Display for WithdrawCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "withdraw capability {} on {}", self.id, self.vault)
    }
}

impl VaultAccess for WithdrawCapability {
    fn vault_id(&self) -> VaultId {
        self.vault
    }

    fn asset_type(&self) -> &AssetType {
        &self.asset_type
    }

    fn capability_id(&self) -> Option<&CapabilityId> {
        Some(&self.id)
    }
}

impl CanWithdraw for WithdrawCapability {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositCapability {
    id: CapabilityId,
    vault: VaultId,
    asset_type: AssetType,
}

impl DepositCapability {
    pub fn id(&self) -> &CapabilityId {
        &self.id
    }
}

impl fmt::Display for DepositCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deposit capability {} on {}", self.id, self.vault)
    }
}

impl VaultAccess for DepositCapability {
    fn vault_id(&self) -> VaultId {
        self.vault
    }

    fn asset_type(&self) -> &AssetType {
        &self.asset_type
    }

    fn capability_id(&self) -> Option<&CapabilityId> {
        Some(&self.id)
    }
}

impl CanDeposit for DepositCapability {}
