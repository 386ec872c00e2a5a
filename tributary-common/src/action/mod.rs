//! Units of work and the values moved inside them.
//!
//! Every mutating connector call takes an [`context::ActionContext`]. The context buffers vault
//! mutations and events; on commit it hands the buffer to the [`crate::storage::ValueStore`] in
//! one piece, on drop or rollback it discards it.
//!
//! ## Conservation
//!
//! Value leaves a vault only as an [`container::AssetContainer`] and re-enters one only by
//! depositing that container. The context counts the value that is withdrawn but not yet
//! deposited per asset type and refuses to commit while that count is non-zero, so a composition
//! that drops a container halfway through cannot persist anything.
//!
//! ## Failure
//!
//! There is no partial effect. Any [`errors::ActionError`] is meant to be propagated with `?` up to
//! whoever owns the context, which then drops it. [`context::atomically`] wraps that pattern.

pub mod container;
pub mod context;
pub mod errors;
pub mod events;
