//! Conversion between two asset types.
//!
//! A [`Swapper`] quotes and executes conversions. Quotes are advisory: an implementation may
//! execute at a different rate than it quoted, and callers must work with whatever container
//! [`Swapper::swap`] actually returns.
//!
//! The composites in this module build on that contract:
//!
//! - [`connectors::SwapSource`] and [`connectors::SwapSink`] put a swapper in front of a source
//!   or sink,
//! - [`multi_route::MultiRouteSwapper`] picks the best of several swappers per call,
//! - [`sequential::SequentialSwapper`] chains swappers into a multi-hop route.

pub mod connectors;
pub mod multi_route;
pub mod sequential;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    action::{container::AssetContainer, context::ActionContext, errors::ActionResult},
    identity::Identifiable,
    models::{amount::UFix64, AssetType},
};

/// Marks a quote as issued by a specific route of a [`multi_route::MultiRouteSwapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTag {
    pub issuer: Uuid,
    pub index: usize,
}

/// Immutable result of a quote.
///
/// `in_type`/`out_type` describe the direction that was quoted, so a reverse quote has them
/// flipped with respect to the swapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub in_type: AssetType,
    pub out_type: AssetType,
    pub in_amount: UFix64,
    pub out_amount: UFix64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteTag>,
}

impl Quote {
    pub fn new(
        in_type: AssetType,
        out_type: AssetType,
        in_amount: UFix64,
        out_amount: UFix64,
    ) -> Self {
        Self { in_type, out_type, in_amount, out_amount, route: None }
    }

    pub fn with_route(mut self, route: RouteTag) -> Self {
        self.route = Some(route);
        self
    }

    pub fn without_route(&self) -> Self {
        Self { route: None, ..self.clone() }
    }
}

/// Converts assets of `in_type` into `out_type` and back.
///
/// `reverse = true` quotes the opposite direction, i.e. what [`Swapper::swap_back`] would do.
pub trait Swapper: Identifiable + Debug + Send + Sync {
    fn in_type(&self) -> &AssetType;

    fn out_type(&self) -> &AssetType;

    /// Input required to receive `desired_out`.
    fn quote_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote>;

    /// Output received for `provided_in`.
    fn quote_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote>;

    /// Largest output this swapper can currently pay in the given direction. `None` means it is
    /// not limited by liquidity.
    fn liquidity(&self, ctx: &ActionContext<'_>, reverse: bool) -> ActionResult<Option<UFix64>>;

    /// Converts the whole of `input`.
    fn swap(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        input: AssetContainer,
    ) -> ActionResult<AssetContainer>;

    /// Converts the whole of `residual` from `out_type` back into `in_type`.
    fn swap_back(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        residual: AssetContainer,
    ) -> ActionResult<AssetContainer>;
}

impl<T: Swapper + ?Sized> Swapper for Box<T> {
    fn in_type(&self) -> &AssetType {
        (**self).in_type()
    }

    fn out_type(&self) -> &AssetType {
        (**self).out_type()
    }

    fn quote_in(
        &self,
        ctx: &ActionContext<'_>,
        desired_out: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        (**self).quote_in(ctx, desired_out, reverse)
    }

    fn quote_out(
        &self,
        ctx: &ActionContext<'_>,
        provided_in: UFix64,
        reverse: bool,
    ) -> ActionResult<Quote> {
        (**self).quote_out(ctx, provided_in, reverse)
    }

    fn liquidity(&self, ctx: &ActionContext<'_>, reverse: bool) -> ActionResult<Option<UFix64>> {
        (**self).liquidity(ctx, reverse)
    }

    fn swap(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        input: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        (**self).swap(ctx, quote, input)
    }

    fn swap_back(
        &self,
        ctx: &mut ActionContext<'_>,
        quote: Option<&Quote>,
        residual: AssetContainer,
    ) -> ActionResult<AssetContainer> {
        (**self).swap_back(ctx, quote, residual)
    }
}
