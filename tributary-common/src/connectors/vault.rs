use tracing::debug;

use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionError, ActionResult},
        events::ActionEvent,
    },
    display::Capacity,
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    storage::{DepositCapability, VaultAccess, WithdrawCapability},
    traits::{Sink, Source},
};

/// Source over a vault that never drains it below `min`.
#[derive(Debug)]
pub struct BoundedSource {
    label: String,
    capability: WithdrawCapability,
    min: UFix64,
    id: Option<OperationId>,
}

impl BoundedSource {
    pub fn new(capability: WithdrawCapability, min: Option<UFix64>, id: Option<OperationId>) -> Self {
        Self {
            label: format!("BoundedSource({})", capability.vault_id()),
            capability,
            min: min.unwrap_or(UFix64::ZERO),
            id,
        }
    }

    pub fn min(&self) -> UFix64 {
        self.min
    }
}

impl Identifiable for BoundedSource {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf("BoundedSource", self.id)
    }
}

impl Source for BoundedSource {
    fn asset_type(&self) -> &AssetType {
        self.capability.asset_type()
    }

    fn estimate_available(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        Ok(ctx
            .balance(&self.label, &self.capability)?
            .saturating_sub(self.min))
    }

    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: UFix64,
    ) -> ActionResult<AssetContainer> {
        let available = self.estimate_available(ctx)?;
        let amount = max_amount.min(available);
        if amount < max_amount {
            debug!(component = %self.label, requested = %max_amount, %available, "Clamped withdrawal");
        }
        let container = ctx.withdraw(&self.label, &self.capability, amount)?;
        if !container.is_empty() {
            ctx.emit(ActionEvent::Withdrawn {
                component: self.label.clone(),
                vault: self.capability.vault_id(),
                asset_type: container.asset_type().clone(),
                amount,
                operation_id: self.id,
            });
        }
        Ok(container)
    }
}

/// Sink over a vault that never fills it above `max`.
#[derive(Debug)]
pub struct BoundedSink {
    label: String,
    capability: DepositCapability,
    max: Option<UFix64>,
    id: Option<OperationId>,
}

impl BoundedSink {
    pub fn new(capability: DepositCapability, max: Option<UFix64>, id: Option<OperationId>) -> Self {
        Self { label: format!("BoundedSink({})", capability.vault_id()), capability, max, id }
    }

    pub fn max(&self) -> Option<UFix64> {
        self.max
    }
}

impl Identifiable for BoundedSink {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf("BoundedSink", self.id)
    }
}

impl Sink for BoundedSink {
    fn asset_type(&self) -> &AssetType {
        self.capability.asset_type()
    }

    fn estimate_capacity(&self, ctx: &ActionContext<'_>) -> ActionResult<Option<UFix64>> {
        let Some(max) = self.max else {
            // Still validates the handle.
            ctx.balance(&self.label, &self.capability)?;
            return Ok(None);
        };
        Ok(Some(
            max.saturating_sub(ctx.balance(&self.label, &self.capability)?),
        ))
    }

    fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()> {
        ensure_type(&self.label, self.capability.asset_type(), container.asset_type())?;
        let capacity = self.estimate_capacity(ctx)?;
        let amount = container.amount();
        if let Some(capacity) = capacity {
            if amount > capacity {
                return Err(ActionError::IncompleteTransfer {
                    component: self.label.clone(),
                    asset_type: container.asset_type().clone(),
                    requested: amount,
                    accepted: capacity,
                });
            }
        }
        let asset_type = container.asset_type().clone();
        ctx.deposit(&self.label, &self.capability, container)?;
        if !amount.is_zero() {
            debug!(component = %self.label, %amount, capacity = %Capacity(capacity), "Deposited into sink");
            ctx.emit(ActionEvent::Deposited {
                component: self.label.clone(),
                vault: self.capability.vault_id(),
                asset_type,
                amount,
                operation_id: self.id,
            });
        }
        Ok(())
    }
}
