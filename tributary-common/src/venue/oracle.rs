use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;

use crate::{
    action::{context::ActionContext, errors::ActionResult},
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    traits::PriceOracle,
};

/// Price oracle answering from a table of configured prices.
///
/// Clones share the same table, so a caller can keep one clone to move prices while another is
/// wired into an AutoBalancer.
#[derive(Debug, Clone)]
pub struct StaticPriceOracle {
    unit_of_account: AssetType,
    prices: Arc<RwLock<HashMap<AssetType, UFix64>>>,
    id: Option<OperationId>,
}

impl StaticPriceOracle {
    pub fn new(unit_of_account: AssetType, id: Option<OperationId>) -> Self {
        Self { unit_of_account, prices: Arc::new(RwLock::new(HashMap::new())), id }
    }

    pub fn with_price(self, asset_type: AssetType, price: UFix64) -> Self {
        self.set_price(asset_type, price);
        self
    }

    pub fn set_price(&self, asset_type: AssetType, price: UFix64) {
        debug!(%asset_type, %price, unit_of_account = %self.unit_of_account, "Price set");
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset_type, price);
    }

    pub fn remove_price(&self, asset_type: &AssetType) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(asset_type);
    }
}

impl Identifiable for StaticPriceOracle {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::leaf(format!("StaticPriceOracle({})", self.unit_of_account), self.id)
    }
}

impl PriceOracle for StaticPriceOracle {
    fn unit_of_account(&self) -> &AssetType {
        &self.unit_of_account
    }

    fn price(&self, _ctx: &ActionContext<'_>, asset_type: &AssetType) -> ActionResult<Option<UFix64>> {
        if asset_type == &self.unit_of_account {
            return Ok(Some(UFix64::ONE));
        }
        Ok(self
            .prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset_type)
            .copied())
    }
}
