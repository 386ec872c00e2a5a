//! Shared contracts, connectors and models used to compose asset-movement pipelines.
//!
//! A pipeline is built bottom-up from small capability objects:
//!
//! - [`traits::Source`] hands out assets, [`traits::Sink`] accepts them,
//! - [`swap::Swapper`] converts between two asset types,
//! - [`traits::PriceOracle`] prices an asset in a unit of account,
//! - [`balancer::AutoBalancer`] keeps a position inside a value band.
//!
//! Every mutating call runs against an [`action::context::ActionContext`], a buffered unit of
//! work over a [`storage::ValueStore`]. Nothing reaches the store until the context is committed,
//! and a commit is refused while any withdrawn value has not been deposited again.

pub mod action;
pub mod balancer;
pub mod connectors;
pub mod display;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod swap;
pub mod traits;
pub mod venue;

pub use action::{
    container::AssetContainer,
    context::{atomically, ActionContext, Receipt},
    errors::{ActionError, ActionResult},
    events::{ActionEvent, RebalanceDirection},
};
pub use identity::{ComponentInfo, Identifiable, OperationId};
pub use models::{amount::UFix64, AssetType, VaultId};
