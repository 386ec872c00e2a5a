//! Source-to-sink pipelines.
//!
//! A [`Pipeline`] moves value from one source into one sink, converting through any number of
//! swappers on the way. It is assembled with a [`PipelineBuilder`], which checks asset types as
//! each piece is attached:
//!
//! ```
//! use tributary_common::{
//!     connectors::{BoundedSink, BoundedSource},
//!     pipeline::PipelineBuilder,
//!     storage::MemoryValueStore,
//!     venue::FixedRateSwapper,
//!     atomically, AssetType, OperationId, UFix64,
//! };
//!
//! let mut store = MemoryValueStore::new();
//! let rewards = store.open_vault(AssetType::from("FLOW"));
//! let flow_reserve = store.open_vault(AssetType::from("FLOW"));
//! let usdc_reserve = store.open_vault(AssetType::from("USDC"));
//! let position = store.open_vault(AssetType::from("USDC"));
//! store.mint(&rewards, "10".parse().unwrap()).unwrap();
//! store.mint(&usdc_reserve, "100".parse().unwrap()).unwrap();
//!
//! let swapper =
//!     FixedRateSwapper::from_reserves(&flow_reserve, &usdc_reserve, "2".parse().unwrap(), None)
//!         .unwrap();
//! let pipeline = PipelineBuilder::from_source(BoundedSource::new(rewards.withdraw_capability(), None, None))
//!     .with_id(OperationId::new())
//!     .swap_through(swapper)
//!     .unwrap()
//!     .into_sink(BoundedSink::new(position.deposit_capability(), None, None))
//!     .unwrap();
//!
//! let (report, _) = atomically(&mut store, |ctx| pipeline.execute(ctx, None)).unwrap();
//! assert_eq!(report.moved, "20".parse::<UFix64>().unwrap());
//! ```

pub mod builder;

use serde::Serialize;
use tracing::{debug, info, instrument};

pub use builder::PipelineBuilder;

use crate::{
    action::{context::ActionContext, errors::ActionResult},
    display::{opt, Capacity},
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    traits::{Sink, Source},
};

/// Result of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub operation_id: Option<OperationId>,
    pub asset_type: AssetType,
    pub requested: Option<UFix64>,
    pub available: UFix64,
    pub capacity: Option<UFix64>,
    pub moved: UFix64,
}

#[derive(Debug)]
pub struct Pipeline {
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    id: Option<OperationId>,
}

impl Pipeline {
    pub(crate) fn new(source: Box<dyn Source>, sink: Box<dyn Sink>, id: Option<OperationId>) -> Self {
        let mut pipeline = Self { source, sink, id: None };
        pipeline.set_id(id);
        pipeline
    }

    pub fn asset_type(&self) -> &AssetType {
        self.sink.asset_type()
    }

    /// Withdraws up to `max_amount` (everything available if `None`), clamped to the sink's
    /// capacity, and deposits it into the sink.
    #[instrument(skip(self, ctx), fields(operation_id = opt(&self.id)))]
    pub fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: Option<UFix64>,
    ) -> ActionResult<PipelineReport> {
        let available = self.source.estimate_available(ctx)?;
        let capacity = self.sink.estimate_capacity(ctx)?;
        let amount = [Some(available), max_amount, capacity]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(available);
        debug!(%available, capacity = %Capacity(capacity), %amount, "Pipeline sized");

        let moved = if amount.is_zero() {
            UFix64::ZERO
        } else {
            let container = self.source.withdraw(ctx, amount)?;
            let moved = container.amount();
            self.sink.deposit(ctx, container)?;
            moved
        };
        info!(%moved, asset_type = %self.asset_type(), "Pipeline executed");

        Ok(PipelineReport {
            operation_id: self.id,
            asset_type: self.asset_type().clone(),
            requested: max_amount,
            available,
            capacity,
            moved,
        })
    }
}

impl Identifiable for Pipeline {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        self.source.set_id(id);
        self.sink.set_id(id);
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::new(
            "Pipeline",
            self.id,
            vec![self.source.component_info(), self.sink.component_info()],
        )
    }
}
