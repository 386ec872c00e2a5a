use crate::{
    action::errors::{ensure_type, ActionResult},
    identity::{Identifiable, OperationId},
    pipeline::Pipeline,
    swap::{connectors::SwapSource, Swapper},
    traits::{Sink, Source},
};

/// Builds a [`Pipeline`] from its source end.
///
/// Every attached swapper wraps the current source in a [`SwapSource`], so the asset type is
/// checked at each step and the finished pipeline only needs a single withdraw and deposit.
#[derive(Debug)]
pub struct PipelineBuilder {
    source: Box<dyn Source>,
    id: Option<OperationId>,
}

impl PipelineBuilder {
    pub fn from_source(source: impl Source + 'static) -> Self {
        Self { source: Box::new(source), id: None }
    }

    /// Operation id assigned to every component when the pipeline is built.
    pub fn with_id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Converts the current output through `swapper`.
    pub fn swap_through(self, swapper: impl Swapper + 'static) -> ActionResult<Self> {
        let source = SwapSource::new(Box::new(swapper), self.source, None)?;
        Ok(Self { source: Box::new(source), id: self.id })
    }

    pub fn into_sink(self, sink: impl Sink + 'static) -> ActionResult<Pipeline> {
        ensure_type("Pipeline", self.source.asset_type(), sink.asset_type())?;
        let mut pipeline = Pipeline::new(self.source, Box::new(sink), None);
        if self.id.is_some() {
            pipeline.set_id(self.id);
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        action::errors::ActionError,
        connectors::{BoundedSink, BoundedSource},
        models::{amount::UFix64, AssetType},
        storage::MemoryValueStore,
        venue::FixedRateSwapper,
    };

    #[test]
    fn test_builder_checks_types_and_aligns_ids() {
        let mut store = MemoryValueStore::new();
        let rewards = store.open_vault(AssetType::from("FLOW"));
        let flow_reserve = store.open_vault(AssetType::from("FLOW"));
        let usdc_reserve = store.open_vault(AssetType::from("USDC"));
        let position = store.open_vault(AssetType::from("USDC"));
        let swapper =
            FixedRateSwapper::from_reserves(&flow_reserve, &usdc_reserve, UFix64::ONE, None).unwrap();
        let id = OperationId::new();

        let mismatched = PipelineBuilder::from_source(BoundedSource::new(rewards.withdraw_capability(), None, None))
            .into_sink(BoundedSink::new(position.deposit_capability(), None, None));
        let pipeline = PipelineBuilder::from_source(BoundedSource::new(rewards.withdraw_capability(), None, None))
            .with_id(id)
            .swap_through(swapper)
            .unwrap()
            .into_sink(BoundedSink::new(position.deposit_capability(), None, None))
            .unwrap();

        assert!(matches!(mismatched, Err(ActionError::TypeMismatch { .. })));
        let info = pipeline.component_info();
        assert_eq!(info.size(), 5);
        assert!(info.is_aligned_to(&id));
        assert_eq!(pipeline.asset_type(), &AssetType::from("USDC"));
    }
}
