//! The value-store abstraction the connectors wrap.
//!
//! A [`ValueStore`] is the host's ledger of vaults. The framework never mutates it directly:
//! mutations are staged in an [`crate::ActionContext`] and handed over as one [`ChangeSet`] on
//! commit.

pub mod capability;
pub mod memory;

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

pub use capability::{
    CanDeposit, CanWithdraw, CapabilityId, DepositCapability, OwnedVault, VaultAccess,
    WithdrawCapability,
};
pub use memory::MemoryValueStore;

use crate::{
    action::errors::ActionResult,
    models::{amount::UFix64, AssetType, VaultId},
};

/// Persisted state of a single vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub asset_type: AssetType,
    pub balance: UFix64,
    /// Owner-maintained accounting value. AutoBalancers keep their `value_of_deposits` here so it
    /// is staged and rolled back together with the balance.
    pub accounted_value: UFix64,
}

impl VaultRecord {
    pub fn new(asset_type: AssetType) -> Self {
        Self { asset_type, balance: UFix64::ZERO, accounted_value: UFix64::ZERO }
    }
}

/// All mutations of one unit of work.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub updated: BTreeMap<VaultId, VaultRecord>,
    pub removed: BTreeSet<VaultId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updated.len() + self.removed.len()
    }
}

/// Host ledger of vaults.
///
/// `apply` must be all-or-nothing: either every change of the set is persisted or none is.
pub trait ValueStore: fmt::Debug {
    fn vault(&self, id: VaultId) -> Option<VaultRecord>;

    fn is_revoked(&self, capability: &CapabilityId) -> bool;

    /// Reserves a fresh vault id. Ids of vaults that are never committed are simply skipped.
    fn allocate_vault_id(&mut self) -> VaultId;

    fn apply(&mut self, changes: ChangeSet) -> ActionResult<()>;
}
