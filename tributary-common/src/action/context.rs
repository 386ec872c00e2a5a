//! Buffered unit of work over a [`ValueStore`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

use crate::{
    action::{
        container::AssetContainer,
        errors::{ensure_type, ActionError, ActionResult},
        events::ActionEvent,
    },
    models::{amount::UFix64, AssetType, VaultId},
    storage::{CanDeposit, CanWithdraw, ChangeSet, OwnedVault, ValueStore, VaultAccess, VaultRecord},
};

/// A single atomic unit of work.
///
/// Reads go through a copy-on-write overlay: the first mutation of a vault copies its record from
/// the store into `staged`, later reads see the staged copy. `None` in the overlay marks a vault
/// closed during this unit.
///
/// The context borrows the store mutably for its whole lifetime, so two units of work can never
/// interleave on the same store.
#[derive(Debug)]
pub struct ActionContext<'s> {
    id: Uuid,
    store: &'s mut dyn ValueStore,
    staged: BTreeMap<VaultId, Option<VaultRecord>>,
    /// Withdrawn but not yet deposited value, per asset type.
    in_flight: HashMap<AssetType, UFix64>,
    events: Vec<ActionEvent>,
}

/// Outcome of a committed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub unit: Uuid,
    pub changed_vaults: usize,
    pub events: Vec<ActionEvent>,
}

impl<'s> ActionContext<'s> {
    pub fn begin(store: &'s mut dyn ValueStore) -> Self {
        let id = Uuid::new_v4();
        trace!(unit = %id, "Unit of work started");
        Self { id, store, staged: BTreeMap::new(), in_flight: HashMap::new(), events: Vec::new() }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    fn record(&self, vault: VaultId) -> Option<VaultRecord> {
        match self.staged.get(&vault) {
            Some(staged) => staged.clone(),
            None => self.store.vault(vault),
        }
    }

    fn resolve<H>(&self, component: &str, handle: &H) -> ActionResult<VaultRecord>
    where
        H: VaultAccess + ?Sized,
    {
        if let Some(capability) = handle.capability_id() {
            if self.store.is_revoked(capability) {
                return Err(ActionError::invalid_handle(component, handle, "capability was revoked"));
            }
        }
        let record = self
            .record(handle.vault_id())
            .ok_or_else(|| ActionError::invalid_handle(component, handle, "vault is unknown or closed"))?;
        if &record.asset_type != handle.asset_type() {
            return Err(ActionError::invalid_handle(
                component,
                handle,
                format!("vault holds {}, handle was issued for {}", record.asset_type, handle.asset_type()),
            ));
        }
        Ok(record)
    }

    fn stage(&mut self, vault: VaultId, record: VaultRecord) {
        self.staged.insert(vault, Some(record));
    }

    /// Current balance of the vault behind `handle`, including staged changes.
    pub fn balance<H>(&self, component: &str, handle: &H) -> ActionResult<UFix64>
    where
        H: VaultAccess + ?Sized,
    {
        Ok(self.resolve(component, handle)?.balance)
    }

    pub fn accounted_value(&self, component: &str, vault: &OwnedVault) -> ActionResult<UFix64> {
        Ok(self
            .resolve(component, vault)?
            .accounted_value)
    }

    /// Updates the owner-maintained accounting value of a vault. Requires full authority.
    pub fn set_accounted_value(
        &mut self,
        component: &str,
        vault: &OwnedVault,
        value: UFix64,
    ) -> ActionResult<()> {
        let mut record = self.resolve(component, vault)?;
        record.accounted_value = value;
        self.stage(vault.vault_id(), record);
        Ok(())
    }

    /// Moves exactly `amount` out of a vault into a new container.
    ///
    /// This is strict: connectors that must clamp do so before calling it.
    pub fn withdraw<H>(
        &mut self,
        component: &str,
        handle: &H,
        amount: UFix64,
    ) -> ActionResult<AssetContainer>
    where
        H: CanWithdraw + ?Sized,
    {
        let mut record = self.resolve(component, handle)?;
        if amount.is_zero() {
            return Ok(AssetContainer::empty(record.asset_type));
        }
        record.balance = record
            .balance
            .checked_sub(amount)
            .ok_or_else(|| ActionError::InsufficientAvailability {
                component: component.to_string(),
                asset_type: record.asset_type.clone(),
                requested: amount,
                available: record.balance,
            })?;
        let asset_type = record.asset_type.clone();
        self.stage(handle.vault_id(), record);

        let in_flight = self
            .in_flight
            .entry(asset_type.clone())
            .or_insert(UFix64::ZERO);
        *in_flight = in_flight
            .checked_add(amount)
            .ok_or_else(|| ActionError::overflow(component, "withdraw"))?;

        trace!(component, vault = %handle.vault_id(), %amount, %asset_type, "Withdrew");
        Ok(AssetContainer::issue(asset_type, amount, self.id))
    }

    /// Moves the whole content of `container` into a vault.
    pub fn deposit<H>(
        &mut self,
        component: &str,
        handle: &H,
        container: AssetContainer,
    ) -> ActionResult<()>
    where
        H: CanDeposit + ?Sized,
    {
        let mut record = self.resolve(component, handle)?;
        ensure_type(component, &record.asset_type, container.asset_type())?;
        if container.is_empty() {
            return Ok(());
        }
        if container.origin() != Some(&self.id) {
            return Err(ActionError::invalid_handle(
                component,
                "container",
                "container was minted by another unit of work",
            ));
        }
        let amount = container.amount();
        record.balance = record
            .balance
            .checked_add(amount)
            .ok_or_else(|| ActionError::overflow(component, "deposit"))?;
        self.stage(handle.vault_id(), record);

        if let Some(in_flight) = self
            .in_flight
            .get_mut(container.asset_type())
        {
            *in_flight = in_flight.saturating_sub(amount);
        }

        trace!(component, vault = %handle.vault_id(), %amount, asset_type = %container.asset_type(), "Deposited");
        Ok(())
    }

    /// Opens an empty vault. It only reaches the store if this unit commits.
    pub fn open_vault(&mut self, asset_type: AssetType) -> OwnedVault {
        let vault = self.store.allocate_vault_id();
        debug!(unit = %self.id, %vault, %asset_type, "Opening vault");
        self.stage(vault, VaultRecord::new(asset_type.clone()));
        OwnedVault::new(vault, asset_type)
    }

    /// Closes an empty vault. Any later use of a handle to it fails with
    /// [`ActionError::InvalidHandle`].
    pub fn close_vault(&mut self, component: &str, vault: &OwnedVault) -> ActionResult<()> {
        let record = self.resolve(component, vault)?;
        if !record.balance.is_zero() {
            return Err(ActionError::IncompleteTransfer {
                component: component.to_string(),
                asset_type: record.asset_type,
                requested: record.balance,
                accepted: UFix64::ZERO,
            });
        }
        debug!(unit = %self.id, vault = %vault.vault_id(), "Closing vault");
        self.staged.insert(vault.vault_id(), None);
        Ok(())
    }

    /// Buffers an event; it is published only if this unit commits.
    pub fn emit(&mut self, event: ActionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ActionEvent] {
        &self.events
    }

    /// Value of `asset_type` withdrawn during this unit and not yet deposited.
    pub fn in_flight(&self, asset_type: &AssetType) -> UFix64 {
        self.in_flight
            .get(asset_type)
            .copied()
            .unwrap_or(UFix64::ZERO)
    }

    /// Applies all staged changes to the store and publishes the buffered events.
    ///
    /// Fails with [`ActionError::IncompleteTransfer`] if any withdrawn value was never deposited.
    #[instrument(skip(self), fields(unit = %self.id))]
    pub fn commit(self) -> ActionResult<Receipt> {
        let mut stranded: Vec<_> = self
            .in_flight
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .collect();
        stranded.sort();
        if let Some((asset_type, amount)) = stranded.first() {
            return Err(ActionError::IncompleteTransfer {
                component: "ActionContext".to_string(),
                asset_type: (*asset_type).clone(),
                requested: **amount,
                accepted: UFix64::ZERO,
            });
        }

        let mut changes = ChangeSet::default();
        for (vault, staged) in self.staged {
            match staged {
                Some(record) => {
                    changes.updated.insert(vault, record);
                }
                // Vaults opened and closed within this unit never existed for the store.
                None if self.store.vault(vault).is_some() => {
                    changes.removed.insert(vault);
                }
                None => {}
            }
        }

        let changed_vaults = changes.len();
        self.store.apply(changes)?;
        for event in &self.events {
            event.publish();
        }
        info!(changed_vaults, events = self.events.len(), "Unit of work committed");
        Ok(Receipt { unit: self.id, changed_vaults, events: self.events })
    }

    /// Discards all staged changes and events.
    pub fn rollback(self) {
        debug!(
            unit = %self.id,
            staged = self.staged.len(),
            events = self.events.len(),
            "Unit of work rolled back"
        );
    }
}

/// Runs `f` in a fresh unit of work and commits it if `f` succeeds.
///
/// On error the unit is rolled back and the error returned unchanged.
pub fn atomically<T, F>(store: &mut dyn ValueStore, f: F) -> ActionResult<(T, Receipt)>
where
    F: FnOnce(&mut ActionContext<'_>) -> ActionResult<T>,
{
    let mut ctx = ActionContext::begin(store);
    match f(&mut ctx) {
        Ok(value) => {
            let receipt = ctx.commit()?;
            Ok((value, receipt))
        }
        Err(err) => {
            ctx.rollback();
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storage::MemoryValueStore;

    fn amount(value: u64) -> UFix64 {
        UFix64::from_integer(value).unwrap()
    }

    fn funded_store() -> (MemoryValueStore, OwnedVault, OwnedVault) {
        let mut store = MemoryValueStore::new();
        let a = store.open_vault(AssetType::from("FLOW"));
        let b = store.open_vault(AssetType::from("FLOW"));
        store.mint(&a, amount(100)).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_transfer_is_applied_on_commit() {
        let (mut store, a, b) = funded_store();

        let mut ctx = ActionContext::begin(&mut store);
        let container = ctx
            .withdraw("test", &a.withdraw_capability(), amount(40))
            .unwrap();
        assert_eq!(ctx.in_flight(&AssetType::from("FLOW")), amount(40));
        ctx.deposit("test", &b.deposit_capability(), container)
            .unwrap();
        assert_eq!(ctx.balance("test", &a).unwrap(), amount(60));
        let receipt = ctx.commit().unwrap();

        assert_eq!(receipt.changed_vaults, 2);
        assert_eq!(store.balance(a.vault_id()), Some(amount(60)));
        assert_eq!(store.balance(b.vault_id()), Some(amount(40)));
    }

    #[test]
    fn test_stranded_value_refuses_commit() {
        let (mut store, a, _) = funded_store();

        let mut ctx = ActionContext::begin(&mut store);
        let container = ctx
            .withdraw("test", &a, amount(40))
            .unwrap();
        drop(container);
        let err = ctx.commit().unwrap_err();

        assert_eq!(
            err,
            ActionError::IncompleteTransfer {
                component: "ActionContext".to_string(),
                asset_type: AssetType::from("FLOW"),
                requested: amount(40),
                accepted: UFix64::ZERO,
            }
        );
        assert_eq!(store.balance(a.vault_id()), Some(amount(100)));
    }

    #[test]
    fn test_failed_unit_leaves_store_unchanged() {
        let (mut store, a, b) = funded_store();

        let result = atomically(&mut store, |ctx| {
            let container = ctx.withdraw("test", &a, amount(40))?;
            ctx.deposit("test", &b, container)?;
            ctx.withdraw("test", &a, amount(500))
        });

        assert!(matches!(result, Err(ActionError::InsufficientAvailability { .. })));
        assert_eq!(store.balance(a.vault_id()), Some(amount(100)));
        assert_eq!(store.balance(b.vault_id()), Some(amount(0)));
    }

    #[test]
    fn test_revoked_capability_is_rejected() {
        let (mut store, a, _) = funded_store();
        let capability = a.withdraw_capability();
        store.revoke(capability.id());

        let mut ctx = ActionContext::begin(&mut store);
        let err = ctx
            .withdraw("test", &capability, amount(1))
            .unwrap_err();

        assert!(matches!(err, ActionError::InvalidHandle { .. }));
    }

    #[test]
    fn test_container_from_another_unit_is_rejected() {
        let (mut store, a, _) = funded_store();
        let (mut other_store, other, _) = funded_store();

        let mut other_ctx = ActionContext::begin(&mut other_store);
        let foreign = other_ctx
            .withdraw("test", &other, amount(1))
            .unwrap();
        other_ctx.rollback();

        let mut ctx = ActionContext::begin(&mut store);
        let err = ctx
            .deposit("test", &a, foreign)
            .unwrap_err();

        assert!(matches!(err, ActionError::InvalidHandle { .. }));
    }

    #[test]
    fn test_deposit_of_other_asset_is_rejected() {
        let (mut store, _, _) = funded_store();
        let usdc = store.open_vault(AssetType::from("USDC"));

        let mut ctx = ActionContext::begin(&mut store);
        let err = ctx
            .deposit("test", &usdc, AssetContainer::empty(AssetType::from("FLOW")))
            .unwrap_err();

        assert!(matches!(err, ActionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_vault_lifecycle() {
        let (mut store, a, _) = funded_store();

        let (vault, _) = atomically(&mut store, |ctx| {
            let vault = ctx.open_vault(AssetType::from("FLOW"));
            let container = ctx.withdraw("test", &a, amount(10))?;
            ctx.deposit("test", &vault, container)?;
            Ok(vault)
        })
        .unwrap();
        assert_eq!(store.balance(vault.vault_id()), Some(amount(10)));

        let mut ctx = ActionContext::begin(&mut store);
        let id = vault.vault_id();
        assert!(matches!(
            ctx.close_vault("test", &vault),
            Err(ActionError::IncompleteTransfer { .. })
        ));
        ctx.rollback();
        assert_eq!(store.balance(id), Some(amount(10)));
    }

    #[test]
    fn test_vault_opened_and_closed_in_one_unit_is_not_persisted() {
        let mut store = MemoryValueStore::new();

        let (_, receipt) = atomically(&mut store, |ctx| {
            let vault = ctx.open_vault(AssetType::from("FLOW"));
            ctx.close_vault("test", &vault)
        })
        .unwrap();

        assert_eq!(receipt.changed_vaults, 0);
        assert_eq!(store.vaults().count(), 0);
    }
}
