//! Structured events emitted by connectors and the rebalancer.
//!
//! Events are buffered inside the unit of work and only published when it commits, so an external
//! consumer (e.g. an indexer) never observes a transfer that was rolled back.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::info;

use crate::{
    display::opt,
    identity::OperationId,
    models::{amount::UFix64, AssetType, VaultId},
};

/// Side of the value band an AutoBalancer has drifted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceDirection {
    Surplus,
    Deficit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActionEvent {
    Withdrawn {
        component: String,
        vault: VaultId,
        asset_type: AssetType,
        amount: UFix64,
        operation_id: Option<OperationId>,
    },
    Deposited {
        component: String,
        vault: VaultId,
        asset_type: AssetType,
        amount: UFix64,
        operation_id: Option<OperationId>,
    },
    Swapped {
        component: String,
        in_type: AssetType,
        out_type: AssetType,
        in_amount: UFix64,
        out_amount: UFix64,
        operation_id: Option<OperationId>,
    },
    Flashed {
        component: String,
        borrow_type: AssetType,
        amount: UFix64,
        fee: UFix64,
        operation_id: Option<OperationId>,
    },
    AutoBalancerCreated {
        balancer: VaultId,
        asset_type: AssetType,
        unit_of_account: AssetType,
        lower_threshold: UFix64,
        upper_threshold: UFix64,
        operation_id: Option<OperationId>,
    },
    Rebalanced {
        balancer: VaultId,
        amount: UFix64,
        value: UFix64,
        direction: RebalanceDirection,
        asset_type: AssetType,
        operation_id: Option<OperationId>,
    },
    AutoBalancerTornDown {
        balancer: VaultId,
        asset_type: AssetType,
        residual: UFix64,
        value_of_deposits: UFix64,
        operation_id: Option<OperationId>,
    },
}

impl ActionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ActionEvent::Withdrawn { .. } => "withdrawn",
            ActionEvent::Deposited { .. } => "deposited",
            ActionEvent::Swapped { .. } => "swapped",
            ActionEvent::Flashed { .. } => "flashed",
            ActionEvent::AutoBalancerCreated { .. } => "auto_balancer_created",
            ActionEvent::Rebalanced { .. } => "rebalanced",
            ActionEvent::AutoBalancerTornDown { .. } => "auto_balancer_torn_down",
        }
    }

    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            ActionEvent::Withdrawn { operation_id, .. } |
            ActionEvent::Deposited { operation_id, .. } |
            ActionEvent::Swapped { operation_id, .. } |
            ActionEvent::Flashed { operation_id, .. } |
            ActionEvent::AutoBalancerCreated { operation_id, .. } |
            ActionEvent::Rebalanced { operation_id, .. } |
            ActionEvent::AutoBalancerTornDown { operation_id, .. } => operation_id.as_ref(),
        }
    }

    /// Publishes the event to the `tributary::events` tracing target.
    pub(crate) fn publish(&self) {
        let payload = serde_json::to_string(self).unwrap_or_else(|e| format!("<{e}>"));
        info!(
            target: "tributary::events",
            event = self.name(),
            operation_id = opt(&self.operation_id().copied()),
            %payload,
            "Event published"
        );
    }
}
