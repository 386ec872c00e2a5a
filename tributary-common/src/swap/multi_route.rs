use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionError, ActionResult},
    },
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType},
    swap::{Quote, RouteTag, Swapper},
};

/// Swapper that delegates each call to the best of several candidate routes.
///
/// Quotes returned by this swapper are tagged with the route that produced them. When such a
/// quote is passed back to [`Swapper::swap`] the tagged route executes it; any other quote (or
/// none) triggers a fresh selection for the actual input amount.
#[derive(Debug)]
pub struct MultiRouteSwapper {
    in_type: AssetType,
    out_type: AssetType,
    routes: Vec<Box<dyn Swapper>>,
    /// Identifies quotes issued by this instance.
    route_key: Uuid,
    id: Option<OperationId>,
}

impl MultiRouteSwapper {
    pub fn new(
        in_type: AssetType,
        out_type: AssetType,
        routes: Vec<Box<dyn Swapper>>,
        id: Option<OperationId>,
    ) -> ActionResult<Self> {
        if routes.is_empty() {
            return Err(ActionError::InvalidInput(
                "MultiRouteSwapper needs at least one route".to_string(),
            ));
        }
        for route in &routes {
            ensure_type("MultiRouteSwapper", &in_type, route.in_type())?;
            ensure_type("MultiRouteSwapper", &out_type, route.out_type())?;
        }
        let mut this = Self { in_type, out_type, routes, route_key: Uuid::new_v4(), id: None };
        if id.is_some() {
            this.set_id(id);
        }
        Ok(this)
    }

    pub fn routes(&self) -> &[Box<dyn Swapper>] {
        &self.routes
    }

    fn tag(&self, index: usize, quote: Quote) -> Quote {
        quote.with_route(RouteTag { issuer: self.route_key, index })
    }

    /// Route index of a quote this instance issued, if it matches the direction being executed.
    fn recognize(&self, quote: Option<&Quote>, reverse: bool) -> Option<usize> {
        let quote = quote?;
        let tag = quote.route?;
        let (in_type, out_type) = if reverse {
            (&self.out_type, &self.in_type)
        } else {
            (&self.in_type, &self.out_type)
        };
        (tag.issuer == self.route_key &&
            tag.index < self.routes.len() &&
            &quote.in_type == in_type &&
            &quote.out_type == out_type)
            .then_some(tag.index)
    }

    /// Route with the largest output for `provided_in`. Ties go to the earlier route.
    fn best_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<(usize, Quote)> {
        let mut best: Option<(usize, Quote)> = None;
        for (index, route) in self.routes.iter().enumerate() {
            match route.quote_out(ctx, provided_in, reverse) {
                Ok(quote) => {
                    trace!(index, out_amount = %quote.out_amount, "Route quoted");
                    if best
                        .as_ref()
                        .map_or(true, |(_, current)| quote.out_amount > current.out_amount)
                    {
                        best = Some((index, quote));
                    }
                }
                Err(err) => debug!(index, %err, "Skipping route that failed to quote"),
            }
        }
        best.ok_or_else(|| self.no_route(provided_in, reverse))
    }

    /// Route requiring the smallest input for `desired_out`. Ties go to the earlier route.
    fn best_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<(usize, Quote)> {
        let mut best: Option<(usize, Quote)> = None;
        for (index, route) in self.routes.iter().enumerate() {
            match route.quote_in(ctx, desired_out, reverse) {
                Ok(quote) => {
                    trace!(index, in_amount = %quote.in_amount, "Route quoted");
                    if best
                        .as_ref()
                        .map_or(true, |(_, current)| quote.in_amount < current.in_amount)
                    {
                        best = Some((index, quote));
                    }
                }
                Err(err) => debug!(index, %err, "Skipping route that failed to quote"),
            }
        }
        best.ok_or_else(|| self.no_route(desired_out, reverse))
    }

    fn no_route(&self, amount: UFix64, reverse: bool) -> ActionError {
        ActionError::NoRoute {
            component: "MultiRouteSwapper".to_string(),
            asset_type: if reverse { self.out_type.clone() } else { self.in_type.clone() },
            amount,
        }
    }

    fn select(
        &self,
        ctx: &ActionContext<'_>,
        quote: Option<&Quote>,
        amount: UFix64,
        reverse: bool,
    ) -> ActionResult<(usize, Quote)> {
        if let Some(index) = self.recognize(quote, reverse) {
            if let Some(quote) = quote {
                return Ok((index, quote.without_route()));
            }
        }
        let (index, quote) = self.best_out(ctx, amount, reverse)?;
        debug!(index, in_amount = %amount, out_amount = %quote.out_amount, reverse, "Selected route");
        Ok((index, quote))
    }
}

impl Identifiable for MultiRouteSwapper {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        for route in &mut self.routes {
            route.set_id(id);
        }
    }

    fn component_info(&self) -> ComponentInfo {
        ComponentInfo::new(
            "MultiRouteSwapper",
            self.id,
            self.routes
                .iter()
                .map(|route| route.component_info())
                .collect(),
        )
    }
}

impl Swapper for MultiRouteSwapper {
    fn in_type(&self) -> &AssetType {
        &self.in_type
    }

    fn out_type(&self) -> &AssetType {
        &self.out_type
    }

    fn quote_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let (index, quote) = self.best_in(ctx, desired_out, reverse)?;
        Ok(self.tag(index, quote))
    }

    fn quote_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        let (index, quote) = self.best_out(ctx, provided_in, reverse)?;
        Ok(self.tag(index, quote))
    }

    /// Liquidity of the deepest route, since a single call only ever uses one route.
    fn liquidity(&self, ctx: &ActionContext<'_>, reverse: bool) -> ActionResult<Option<UFix64>> {
        let mut deepest = Some(UFix64::ZERO);
        for route in &self.routes {
            deepest = match (deepest, route.liquidity(ctx, reverse)?) {
                (Some(current), Some(liquidity)) => Some(current.max(liquidity)),
                _ => None,
            };
        }
        Ok(deepest)
    }

    fn swap(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        input: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        ensure_type("MultiRouteSwapper", &self.in_type, input.asset_type())?;
        let (index, quote) = self.select(ctx, quote, input.amount(), false)?;
        self.routes[index].swap(ctx, Some(&quote), input)
    }

    fn swap_back(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        residual: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        ensure_type("MultiRouteSwapper", &self.out_type, residual.asset_type())?;
        let (index, quote) = self.select(ctx, quote, residual.amount(), true)?;
        self.routes[index].swap_back(ctx, Some(&quote), residual)
    }
}
