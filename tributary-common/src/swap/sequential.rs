use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionError, ActionResult},
    },
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    swap::{Quote, Swapper},
};

/// Multi-hop swapper converting through each hop in order.
///
/// Each hop's `out_type` must equal the next hop's `in_type`. Intermediate quotes are not
/// forwarded to the hops; every hop executes on whatever the previous one returned.
#[derive(Debug)]
pub struct SequentialSwapper {
    hops: Vec<Box<dyn Swapper>>,
    id: Option<OperationId>,
}

impl SequentialSwapper {
    pub fn new(hops: Vec<Box<dyn Swapper>>, id: Option<OperationId>) -> ActionResult<Self> {
        if hops.is_empty() {
            return Err(ActionError::InvalidInput("SequentialSwapper needs at least one hop".to_string()));
        }
        for pair in hops.windows(2) {
            ensure_type("SequentialSwapper", pair[0].out_type(), pair[1].in_type())?;
        }
        let mut this = Self { hops, id: None };
        if id.is_some() {
            this.set_id(id);
        }
        Ok(this)
    }

    fn first(&self) -> &dyn Swapper {
        self.hops[0].as_ref()
    }

    fn last(&self) -> &dyn Swapper {
        self.hops[self.hops.len() - 1].as_ref()
    }

    fn quote_for(&self, in_amount: UFix64, out_amount: UFix64, reverse: bool) -> Quote {
        if reverse {
            Quote::new(self.out_type().clone(), self.in_type().clone(), in_amount, out_amount)
        } else {
            Quote::new(self.in_type().clone(), self.out_type().clone(), in_amount, out_amount)
        }
    }
}

impl Identifiable for SequentialSwapper {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        for hop in &mut self.hops {
            hop.set_id(id);
        }
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::new(
            "SequentialSwapper",
            self.id,
            self.hops
                .iter()
                .map(|hop| hop.component_info())
                .collect(),
        )
    }
}

impl Swapper for SequentialSwapper {
    fn in_type(&self) -> &AssetType {
        self.first().in_type()
    }

    fn out_type(&self) -> &AssetType {
        self.last().out_type()
    }

    fn quote_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        // Walk from the output end back to the input end.
        let mut required = desired_out;
        if reverse {
            for hop in &self.hops {
                required = hop.quote_in(ctx, required, true)?.in_amount;
            }
        } else {
            for hop in self.hops.iter().rev() {
                required = hop.quote_in(ctx, required, false)?.in_amount;
            }
        }
        // Truncation along the way may leave the output short of `desired_out`.
        let out_amount = self
            .quote_out(ctx, required, reverse)?
            .out_amount;
        Ok(self.quote_for(required, out_amount, reverse))
    }

    fn quote_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let mut amount = provided_in;
        if reverse {
            for hop in self.hops.iter().rev() {
                amount = hop.quote_out(ctx, amount, true)?.out_amount;
            }
        } else {
            for hop in &self.hops {
                amount = hop.quote_out(ctx, amount, false)?.out_amount;
            }
        }
        Ok(self.quote_for(provided_in, amount, reverse))
    }

    /// Walks the hops in execution order, carrying the most each hop can deliver into the next.
    fn liquidity(&self, ctx: &ActionContext<'_>, reverse: bool) -> ActionResult<Option<UFix64>> {
        let hops: Vec<&dyn Swapper> = if reverse {
            self.hops.iter().rev().map(|hop| hop.as_ref()).collect()
        } else {
            self.hops.iter().map(|hop| hop.as_ref()).collect()
        };
        let mut carried: Option<UFix64> = None;
        for hop in hops {
            let own = hop.liquidity(ctx, reverse)?;
            let Some(input) = carried else {
                carried = own;
                continue;
            };
            carried = match hop.quote_out(ctx, input, reverse) {
                Ok(quote) => Some(own.map_or(quote.out_amount, |own| own.min(quote.out_amount))),
                Err(ActionError::InsufficientAvailability { .. }) if own.is_some() => own,
                Err(err) => return Err(err),
            };
        }
        Ok(carried)
    }

    fn swap(
        &self,
        ctx: &mut ActionContext<'_>,
        _quote: Option<&Quote>,
        input: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        let mut container = input;
        for hop in &self.hops {
            container = hop.swap(ctx, None, container)?;
        }
        Ok(container)
    }

    fn swap_back(
        &self,
        ctx: &mut ActionContext<'_>,
        _quote: Option<&Quote>,
        residual: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        let mut container = residual;
        for hop in self.hops.iter().rev() {
            container = hop.swap_back(ctx, None, container)?;
        }
        Ok(container)
    }
}
