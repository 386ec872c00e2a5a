//! Error types for connector operations and units of work.

use thiserror::Error;

use crate::{
    action::events::RebalanceDirection,
    models::{amount::UFix64, AssetType},
};

/// Result type for every fallible operation in the framework.
pub type ActionResult<T> = Result<T, ActionError>;

/// Errors raised by connectors, swappers, the rebalancer and the unit of work.
///
/// Any error aborts the enclosing [`crate::ActionContext`]: the caller is expected to propagate it
/// and drop the context, which discards every staged mutation. The framework never retries.
///
/// Variants:
/// - `InsufficientAvailability`: more was requested than is available. Withdraw paths clamp
///   instead of raising this; it surfaces where clamping would change the meaning of the call.
/// - `TypeMismatch`: two components disagree on an asset type. Raised at construction time.
/// - `IncompleteTransfer`: a deposit would leave residual value behind, or value withdrawn during
///   a unit of work was never deposited again. Always a conservation bug.
/// - `InvalidHandle`: a vault or capability is unknown, closed, revoked or bound to another asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("{component}: insufficient {asset_type}: requested {requested}, available {available}")]
    InsufficientAvailability {
        component: String,
        asset_type: AssetType,
        requested: UFix64,
        available: UFix64,
    },
    #[error("{component}: type mismatch: expected {expected}, found {found}")]
    TypeMismatch { component: String, expected: AssetType, found: AssetType },
    #[error("{component}: incomplete transfer of {asset_type}: requested {requested}, accepted {accepted}")]
    IncompleteTransfer {
        component: String,
        asset_type: AssetType,
        requested: UFix64,
        accepted: UFix64,
    },
    #[error("{component}: invalid handle {handle}: {reason}")]
    InvalidHandle { component: String, handle: String, reason: String },
    #[error("{component}: price of {asset_type} is unavailable")]
    PriceUnavailable { component: String, asset_type: AssetType },
    #[error("{component}: {direction} detected but no counterpart connector is configured")]
    MissingCounterpart { component: String, direction: RebalanceDirection },
    #[error("{component}: no route can convert {amount} {asset_type}")]
    NoRoute { component: String, asset_type: AssetType, amount: UFix64 },
    #[error("{component}: arithmetic overflow in {operation}")]
    Overflow { component: String, operation: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ActionError {
    pub fn type_mismatch(
        component: impl Into<String>,
        expected: &AssetType,
        found: &AssetType,
    ) -> Self {
        Self::TypeMismatch {
            component: component.into(),
            expected: expected.clone(),
            found: found.clone(),
        }
    }

    pub fn overflow(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Overflow { component: component.into(), operation: operation.into() }
    }

    pub fn invalid_handle(
        component: impl Into<String>,
        handle: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidHandle {
            component: component.into(),
            handle: handle.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fails with [`ActionError::TypeMismatch`] unless `found == expected`.
pub fn ensure_type(component: &str, expected: &AssetType, found: &AssetType) -> ActionResult<()> {
    if expected != found {
        return Err(ActionError::type_mismatch(component, expected, found));
    }
    Ok(())
}
