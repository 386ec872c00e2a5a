//! Reference venues backed by vaults of the value store.
//!
//! These stand in for external exchanges and price feeds in tests and scenarios.

pub mod fixed_rate;
pub mod oracle;

pub use fixed_rate::FixedRateSwapper;
pub use oracle::StaticPriceOracle;
