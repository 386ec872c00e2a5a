use tracing::debug;

use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionResult},
    },
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    swap::Swapper,
    traits::{Sink, Source},
};

/// Source that withdraws from `source` and converts through `swapper`.
///
/// `max_amount` passed to [`Source::withdraw`] bounds the converted output, i.e. it is expressed
/// in this source's own asset type.
#[derive(Debug)]
pub struct SwapSource {
    swapper: Box<dyn Swapper>,
    source: Box<dyn Source>,
    id: Option<OperationId>,
}

impl SwapSource {
    pub fn new(
        swapper: Box<dyn Swapper>,
        source: Box<dyn Source>,
        id: Option<OperationId>,
    ) -> ActionResult<Self> {
        ensure_type("SwapSource", swapper.in_type(), source.asset_type())?;
        let mut this = Self { swapper, source, id: None };
        if id.is_some() {
            this.set_id(id);
        }
        Ok(this)
    }
}

impl Identifiable for SwapSource {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        self.swapper.set_id(id);
        self.source.set_id(id);
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::new(
            "SwapSource",
            self.id,
            vec![self.swapper.component_info(), self.source.component_info()],
        )
    }
}

impl Source for SwapSource {
    fn asset_type(&self) -> &AssetType {
        self.swapper.out_type()
    }

    /// What the inner source can supply after conversion, clamped to what the swapper can pay.
    fn estimate_available(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        let available = self.source.estimate_available(ctx)?;
        if available.is_zero() {
            return Ok(UFix64::ZERO);
        }
        let Some(payable) = self.swapper.liquidity(ctx, false)? else {
            return Ok(self
                .swapper
                .quote_out(ctx, available, false)?
                .out_amount);
        };
        if payable.is_zero() {
            return Ok(UFix64::ZERO);
        }
        let deepest = self.swapper.quote_in(ctx, payable, false)?;
        if available >= deepest.in_amount {
            return Ok(deepest.out_amount);
        }
        Ok(self
            .swapper
            .quote_out(ctx, available, false)?
            .out_amount)
    }

    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: UFix64,
    ) -> ActionResult<AssetContainer> {
        let target = max_amount.min(self.estimate_available(ctx)?);
        if target.is_zero() {
            return Ok(AssetContainer::empty(self.asset_type().clone()));
        }

        let quote = self.swapper.quote_in(ctx, target, false)?;
        let pull = quote
            .in_amount
            .min(self.source.estimate_available(ctx)?);
        let input = self.source.withdraw(ctx, pull)?;
        if input.is_empty() {
            input.destroy_empty("SwapSource")?;
            return Ok(AssetContainer::empty(self.asset_type().clone()));
        }

        // The quote only applies if the inner source delivered exactly what it was sized for.
        let quote = (input.amount() == quote.in_amount).then_some(quote);
        debug!(
            requested = %max_amount,
            %target,
            pulled = %input.amount(),
            "SwapSource converting withdrawal"
        );
        self.swapper
            .swap(ctx, quote.as_ref(), input)
    }
}

/// Sink that converts deposits through `swapper` and forwards them to `sink`.
#[derive(Debug)]
pub struct SwapSink {
    swapper: Box<dyn Swapper>,
    sink: Box<dyn Sink>,
    id: Option<OperationId>,
}

impl SwapSink {
    pub fn new(
        swapper: Box<dyn Swapper>,
        sink: Box<dyn Sink>,
        id: Option<OperationId>,
    ) -> ActionResult<Self> {
        ensure_type("SwapSink", swapper.out_type(), sink.asset_type())?;
        let mut this = Self { swapper, sink, id: None };
        if id.is_some() {
            this.set_id(id);
        }
        Ok(this)
    }
}

impl Identifiable for SwapSink {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        self.swapper.set_id(id);
        self.sink.set_id(id);
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::new(
            "SwapSink",
            self.id,
            vec![self.swapper.component_info(), self.sink.component_info()],
        )
    }
}

impl Sink for SwapSink {
    fn asset_type(&self) -> &AssetType {
        self.swapper.in_type()
    }

    /// Input whose converted output the inner sink can take, clamped to what the swapper can pay.
    fn estimate_capacity(&self, ctx: &ActionContext<'_>) -> ActionResult<Option<UFix64>> {
        let deliverable = match (self.sink.estimate_capacity(ctx)?, self.swapper.liquidity(ctx, false)?) {
            (None, None) => return Ok(None),
            (Some(capacity), None) => capacity,
            (None, Some(payable)) => payable,
            (Some(capacity), Some(payable)) => capacity.min(payable),
        };
        if deliverable.is_zero() {
            return Ok(Some(UFix64::ZERO));
        }
        Ok(Some(
            self.swapper
                .quote_in(ctx, deliverable, false)?
                .in_amount,
        ))
    }

    fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()> {
        ensure_type("SwapSink", self.asset_type(), container.asset_type())?;
        if container.is_empty() {
            return container.destroy_empty("SwapSink");
        }
        let quote = self
            .swapper
            .quote_out(ctx, container.amount(), false)?;
        let converted = self
            .swapper
            .swap(ctx, Some(&quote), container)?;
        self.sink.deposit(ctx, converted)
    }
}
