use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::{
    action::errors::{ActionError, ActionResult},
    models::{amount::UFix64, AssetType, VaultId},
    storage::{CapabilityId, ChangeSet, OwnedVault, ValueStore, VaultAccess, VaultRecord},
};

/// In-memory [`ValueStore`], used by tests and the scenario runner.
#[derive(Debug, Default)]
pub struct MemoryValueStore {
    vaults: BTreeMap<VaultId, VaultRecord>,
    revoked: HashSet<CapabilityId>,
    next_vault_id: u64,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty vault outside of any unit of work.
    pub fn open_vault(&mut self, asset_type: AssetType) -> OwnedVault {
        let id = self.allocate_vault_id();
        self.vaults
            .insert(id, VaultRecord::new(asset_type.clone()));
        debug!(vault = %id, %asset_type, "Opened vault");
        OwnedVault::new(id, asset_type)
    }

    /// Genesis credit of a vault.
    ///
    /// Minting is not part of the asset-movement framework; the in-memory store offers it only to
    /// seed balances when setting up tests and scenarios.
    pub fn mint(&mut self, vault: &OwnedVault, amount: UFix64) -> ActionResult<()> {
        let record = self
            .vaults
            .get_mut(&vault.vault_id())
            .ok_or_else(|| ActionError::invalid_handle("MemoryValueStore", vault, "unknown vault"))?;
        record.balance = record
            .balance
            .checked_add(amount)
            .ok_or_else(|| ActionError::overflow("MemoryValueStore", "mint"))?;
        Ok(())
    }

    pub fn balance(&self, vault: VaultId) -> Option<UFix64> {
        self.vaults
            .get(&vault)
            .map(|record| record.balance)
    }

    /// Sum of the balances of all vaults holding `asset_type`.
    pub fn total_supply(&self, asset_type: &AssetType) -> UFix64 {
        self.vaults
            .values()
            .filter(|record| &record.asset_type == asset_type)
            .fold(UFix64::ZERO, |acc, record| {
                acc.checked_add(record.balance)
                    .unwrap_or(UFix64::MAX)
            })
    }

    pub fn revoke(&mut self, capability: &CapabilityId) {
        debug!(%capability, "Revoked capability");
        self.revoked.insert(*capability);
    }

    pub fn vaults(&self) -> impl Iterator<Item = (&VaultId, &VaultRecord)> {
        self.vaults.iter()
    }
}

impl ValueStore for MemoryValueStore {
    fn vault(&self, id: VaultId) -> Option<VaultRecord> {
        self.vaults.get(&id).cloned()
    }

    fn is_revoked(&self, capability: &CapabilityId) -> bool {
        self.revoked.contains(capability)
    }

    fn allocate_vault_id(&mut self) -> VaultId {
        self.next_vault_id += 1;
        VaultId(self.next_vault_id)
    }

    fn apply(&mut self, changes: ChangeSet) -> ActionResult<()> {
        // Validate everything before touching the map so a rejected set leaves no trace.
        if let Some(missing) = changes
            .removed
            .iter()
            .find(|id| !self.vaults.contains_key(id) && !changes.updated.contains_key(id))
        {
            return Err(ActionError::invalid_handle(
                "MemoryValueStore",
                missing,
                "cannot remove an unknown vault",
            ));
        }

        for (id, record) in changes.updated {
            self.vaults.insert(id, record);
        }
        for id in changes.removed {
            self.vaults.remove(&id);
        }
        Ok(())
    }
}
