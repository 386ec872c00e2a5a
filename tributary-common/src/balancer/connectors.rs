//! Connectors that let an AutoBalancer sit at either end of a pipeline.
//!
//! Both route through the balancer's ledger, so `value_of_deposits` follows every deposit and
//! withdrawal they perform.

use std::sync::Arc;

use crate::{
    action::{container::AssetContainer, context::ActionContext, errors::ActionResult},
    balancer::Ledger,
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    storage::VaultAccess,
    traits::{Sink, Source},
};

#[derive(Debug)]
pub struct AutoBalancerSink {
    ledger: Arc<Ledger>,
    id: Option<OperationId>,
}

impl AutoBalancerSink {
    pub(super) fn new(ledger: Arc<Ledger>, id: Option<OperationId>) -> Self {
        Self { ledger, id }
    }
}

impl Identifiable for AutoBalancerSink {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf(format!("AutoBalancerSink({})", self.ledger.vault.vault_id()), self.id)
    }
}

impl Sink for AutoBalancerSink {
    fn asset_type(&self) -> &AssetType {
        self.ledger.asset_type()
    }

    fn estimate_capacity(&self, ctx: &ActionContext<'_>) -> ActionResult<Option<UFix64>> {
        self.ledger.balance(ctx)?;
        Ok(None)
    }

    fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()> {
        self.ledger.deposit(ctx, container, self.id)
    }
}

#[derive(Debug)]
pub struct AutoBalancerSource {
    ledger: Arc<Ledger>,
    id: Option<OperationId>,
}

impl AutoBalancerSource {
    pub(super) fn new(ledger: Arc<Ledger>, id: Option<OperationId>) -> Self {
        Self { ledger, id }
    }
}

impl Identifiable for AutoBalancerSource {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf(format!("AutoBalancerSource({})", self.ledger.vault.vault_id()), self.id)
    }
}

impl Source for AutoBalancerSource {
    fn asset_type(&self) -> &AssetType {
        self.ledger.asset_type()
    }

    fn estimate_available(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        self.ledger.balance(ctx)
    }

    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: UFix64,
    ) -> ActionResult<AssetContainer> {
        let amount = max_amount.min(self.estimate_available(ctx)?);
        self.ledger.withdraw(ctx, amount, self.id)
    }
}
