//! Capability contracts connectors are written against.
//!
//! All contracts are object-safe and take `&self`: connectors hold handles, never value, and all
//! mutable state lives in the [`crate::storage::ValueStore`] behind the [`ActionContext`].

use std::fmt::Debug;

use crate::{
    action::{container::AssetContainer, context::ActionContext, errors::ActionResult},
    identity::Identifiable,
    models::{amount::UFix64, AssetType},
};

/// Something assets can be withdrawn from.
pub trait Source: Identifiable + Debug + Send + Sync {
    /// Asset type of every container this source returns.
    fn asset_type(&self) -> &AssetType;

    /// Best-effort estimate of what [`Source::withdraw`] would return for an unlimited request.
    fn estimate_available(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64>;

    /// Returns at most `max_amount`, clamped to what is actually available.
    ///
    /// Shortfall is never an error. Errors only signal a broken handle or an upstream failure.
    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: UFix64,
    ) -> ActionResult<AssetContainer>;
}

/// Something assets can be deposited into.
pub trait Sink: Identifiable + Debug + Send + Sync {
    fn asset_type(&self) -> &AssetType;

    /// How much can still be accepted. `None` means unbounded.
    fn estimate_capacity(&self, ctx: &ActionContext<'_>) -> ActionResult<Option<UFix64>>;

    /// Consumes `container` completely or fails with
    /// [`crate::ActionError::IncompleteTransfer`]. Never partial.
    fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()>;
}

/// Prices assets in a unit of account.
pub trait PriceOracle: Identifiable + Debug + Send + Sync {
    /// Asset type prices are denominated in.
    fn unit_of_account(&self) -> &AssetType;

    /// Price of one unit of `asset_type`, or `None` if the oracle has no price for it.
    fn price(&self, ctx: &ActionContext<'_>, asset_type: &AssetType) -> ActionResult<Option<UFix64>>;
}

/// Callback run with a flash loan. Must return at least principal plus fee.
pub type FlashCallback<'a> = Box<
    dyn FnOnce(&mut ActionContext<'_>, AssetContainer) -> ActionResult<AssetContainer> + 'a,
>;

/// Lends assets for the duration of a callback.
pub trait Flasher: Identifiable + Debug + Send + Sync {
    fn borrow_type(&self) -> &AssetType;

    /// Fee charged for borrowing `amount`.
    fn fee(&self, amount: UFix64) -> ActionResult<UFix64>;

    /// Lends `amount`, runs `callback` and takes back principal plus fee from what it returns.
    ///
    /// Whatever the callback returns beyond principal plus fee is handed back to the caller.
    fn flash_loan(
        &self,
        ctx: &mut ActionContext<'_>,
        amount: UFix64,
        callback: FlashCallback<'_>,
    ) -> ActionResult<AssetContainer>;
}

impl<T: Source + ?Sized> Source for Box<T> {
    fn asset_type(&self) -> &AssetType {
        (**self).asset_type()
    }

    fn estimate_available(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        (**self).estimate_available(ctx)
    }

    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        max_amount: UFix64,
    ) -> ActionResult<AssetContainer> {
        (**self).withdraw(ctx, max_amount)
    }
}

impl<T: Sink + ?Sized> Sink for Box<T> {
    fn asset_type(&self) -> &AssetType {
        (**self).asset_type()
    }

    fn estimate_capacity(&self, ctx: &ActionContext<'_>) -> ActionResult<Option<UFix64>> {
        (**self).estimate_capacity(ctx)
    }

    fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()> {
        (**self).deposit(ctx, container)
    }
}
