//! Primitive connectors wrapping vaults of the value store.

pub mod flash;
pub mod vault;

pub use flash::VaultFlasher;
pub use vault::{BoundedSink, BoundedSource};
