//! Threshold-based rebalancing of a single-asset position.
//!
//! An [`AutoBalancer`] holds one vault and tracks the value that was deposited into it
//! (`value_of_deposits`, in the oracle's unit of account). Whenever the current value of the
//! vault drifts outside `[value_of_deposits × lower, value_of_deposits × upper]` it can push the
//! surplus to an excess sink or pull the shortfall from a shortfall source.
//!
//! Both the balance and `value_of_deposits` live in the value store, so they are staged and
//! rolled back with the unit of work like any other vault.

pub mod connectors;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info, instrument, warn};

pub use connectors::{AutoBalancerSink, AutoBalancerSource};

use crate::{
    action::{
        container::AssetContainer,
        context::ActionContext,
        errors::{ensure_type, ActionError, ActionResult},
        events::{ActionEvent, RebalanceDirection},
    },
    display::{opt, Capacity},
    identity::{ComponentInfo, Identifiable, OperationId},
    models::{amount::UFix64, AssetType, VaultId},
    storage::{OwnedVault, VaultAccess},
    traits::{PriceOracle, Sink, Source},
};

/// What to do when a rebalance is due but the connector for that direction is not configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartPolicy {
    /// Log a warning and report [`RebalanceOutcome::Skipped`].
    #[default]
    Skip,
    /// Fail with [`ActionError::MissingCounterpart`], aborting the unit of work.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBalancerConfig {
    pub lower_threshold: UFix64,
    pub upper_threshold: UFix64,
    #[serde(default)]
    pub on_missing_counterpart: CounterpartPolicy,
}

impl AutoBalancerConfig {
    pub fn new(lower_threshold: UFix64, upper_threshold: UFix64) -> ActionResult<Self> {
        let config = Self {
            lower_threshold,
            upper_threshold,
            on_missing_counterpart: CounterpartPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: CounterpartPolicy) -> Self {
        self.on_missing_counterpart = policy;
        self
    }

    /// Requires `0 < lower < 1 < upper`.
    pub fn validate(&self) -> ActionResult<()> {
        if self.lower_threshold.is_zero() ||
            self.lower_threshold >= UFix64::ONE ||
            self.upper_threshold <= UFix64::ONE
        {
            return Err(ActionError::InvalidInput(format!(
                "AutoBalancer thresholds must satisfy 0 < lower < 1 < upper, got lower {} upper {}",
                self.lower_threshold, self.upper_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceState {
    Balanced,
    Surplus,
    Deficit,
}

impl RebalanceState {
    pub fn direction(&self) -> Option<RebalanceDirection> {
        match self {
            RebalanceState::Balanced => None,
            RebalanceState::Surplus => Some(RebalanceDirection::Surplus),
            RebalanceState::Deficit => Some(RebalanceDirection::Deficit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingCounterpart,
    NothingToMove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RebalanceOutcome {
    Balanced,
    Rebalanced { direction: RebalanceDirection, amount: UFix64, value: UFix64 },
    Skipped { direction: RebalanceDirection, reason: SkipReason },
}

/// Point-in-time view of an AutoBalancer's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalancerSnapshot {
    pub balancer: VaultId,
    pub asset_type: AssetType,
    pub balance: UFix64,
    pub price: UFix64,
    pub current_value: UFix64,
    pub value_of_deposits: UFix64,
    pub state: RebalanceState,
}

/// Vault and price feed shared between an AutoBalancer and the connectors it hands out.
#[derive(Debug)]
struct Ledger {
    label: String,
    vault: OwnedVault,
    oracle: Arc<dyn PriceOracle>,
}

impl Ledger {
    fn asset_type(&self) -> &AssetType {
        self.vault.asset_type()
    }

    fn price(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        match self
            .oracle
            .price(ctx, self.asset_type())?
        {
            Some(price) if !price.is_zero() => Ok(price),
            _ => Err(ActionError::PriceUnavailable {
                component: self.label.clone(),
                asset_type: self.asset_type().clone(),
            }),
        }
    }

    fn value(&self, amount: UFix64, price: UFix64) -> ActionResult<UFix64> {
        amount
            .checked_mul(price)
            .ok_or_else(|| ActionError::overflow(&self.label, "value"))
    }

    fn balance(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        ctx.balance(&self.label, &self.vault)
    }

    fn value_of_deposits(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        ctx.accounted_value(&self.label, &self.vault)
    }

    /// Deposits `container` and credits its current value to `value_of_deposits`.
    fn deposit(
        &self,
        ctx: &mut ActionContext<'_>,
        container: AssetContainer,
        operation_id: Option<OperationId>,
    ) -> ActionResult<()> {
        ensure_type(&self.label, self.asset_type(), container.asset_type())?;
        if container.is_empty() {
            return container.destroy_empty(&self.label);
        }
        let amount = container.amount();
        let value = self.value(amount, self.price(ctx)?)?;
        ctx.deposit(&self.label, &self.vault, container)?;
        let value_of_deposits = self
            .value_of_deposits(ctx)?
            .checked_add(value)
            .ok_or_else(|| ActionError::overflow(&self.label, "value_of_deposits"))?;
        ctx.set_accounted_value(&self.label, &self.vault, value_of_deposits)?;
        ctx.emit(ActionEvent::Deposited {
            component: self.label.clone(),
            vault: self.vault.vault_id(),
            asset_type: self.asset_type().clone(),
            amount,
            operation_id,
        });
        debug!(component = %self.label, %amount, %value, %value_of_deposits, "Deposit credited");
        Ok(())
    }

    /// Withdraws exactly `amount` and debits its current value from `value_of_deposits`.
    fn withdraw(
        &self,
        ctx: &mut ActionContext<'_>,
        amount: UFix64,
        operation_id: Option<OperationId>,
    ) -> ActionResult<AssetContainer> {
        if amount.is_zero() {
            return Ok(AssetContainer::empty(self.asset_type().clone()));
        }
        let value = self.value(amount, self.price(ctx)?)?;
        let container = ctx.withdraw(&self.label, &self.vault, amount)?;
        let value_of_deposits = self
            .value_of_deposits(ctx)?
            .saturating_sub(value);
        ctx.set_accounted_value(&self.label, &self.vault, value_of_deposits)?;
        ctx.emit(ActionEvent::Withdrawn {
            component: self.label.clone(),
            vault: self.vault.vault_id(),
            asset_type: self.asset_type().clone(),
            amount,
            operation_id,
        });
        debug!(component = %self.label, %amount, %value, %value_of_deposits, "Withdrawal debited");
        Ok(container)
    }
}

/// Keeps the value of a vault inside a band around the value deposited into it.
#[derive(Debug)]
pub struct AutoBalancer {
    ledger: Arc<Ledger>,
    config: AutoBalancerConfig,
    excess_sink: Option<Box<dyn Sink>>,
    shortfall_source: Option<Box<dyn Source>>,
    id: Option<OperationId>,
}

impl AutoBalancer {
    /// Opens the balancer's vault in `ctx` and emits [`ActionEvent::AutoBalancerCreated`].
    pub fn create(
        ctx: &mut ActionContext<'_>,
        asset_type: AssetType,
        oracle: Arc<dyn PriceOracle>,
        config: AutoBalancerConfig,
        id: Option<OperationId>,
    ) -> ActionResult<Self> {
        config.validate()?;
        let vault = ctx.open_vault(asset_type.clone());
        let label = format!("AutoBalancer({})", vault.vault_id());
        ctx.emit(ActionEvent::AutoBalancerCreated {
            balancer: vault.vault_id(),
            asset_type,
            unit_of_account: oracle.unit_of_account().clone(),
            lower_threshold: config.lower_threshold,
            upper_threshold: config.upper_threshold,
            operation_id: id,
        });
        info!(
            balancer = %vault.vault_id(),
            lower = %config.lower_threshold,
            upper = %config.upper_threshold,
            policy = %config.on_missing_counterpart,
            "AutoBalancer created"
        );
        Ok(Self {
            ledger: Arc::new(Ledger { label, vault, oracle }),
            config,
            excess_sink: None,
            shortfall_source: None,
            id,
        })
    }

    pub fn vault_id(&self) -> VaultId {
        self.ledger.vault.vault_id()
    }

    pub fn asset_type(&self) -> &AssetType {
        self.ledger.asset_type()
    }

    pub fn config(&self) -> &AutoBalancerConfig {
        &self.config
    }

    pub fn balance(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        self.ledger.balance(ctx)
    }

    pub fn value_of_deposits(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        self.ledger.value_of_deposits(ctx)
    }

    /// `balance × price`.
    pub fn current_value(&self, ctx: &ActionContext<'_>) -> ActionResult<UFix64> {
        let price = self.ledger.price(ctx)?;
        self.ledger
            .value(self.balance(ctx)?, price)
    }

    pub fn snapshot(&self, ctx: &ActionContext<'_>) -> ActionResult<BalancerSnapshot> {
        let balance = self.balance(ctx)?;
        let price = self.ledger.price(ctx)?;
        let current_value = self.ledger.value(balance, price)?;
        let value_of_deposits = self.value_of_deposits(ctx)?;
        let state = self.classify(current_value, value_of_deposits)?;
        Ok(BalancerSnapshot {
            balancer: self.vault_id(),
            asset_type: self.asset_type().clone(),
            balance,
            price,
            current_value,
            value_of_deposits,
            state,
        })
    }

    pub fn state(&self, ctx: &ActionContext<'_>) -> ActionResult<RebalanceState> {
        Ok(self.snapshot(ctx)?.state)
    }

    /// Returns true if the current value lies outside the threshold band.
    pub fn check_rebalance(&self, ctx: &ActionContext<'_>) -> ActionResult<bool> {
        Ok(self.state(ctx)? != RebalanceState::Balanced)
    }

    fn bound(&self, value_of_deposits: UFix64, threshold: UFix64) -> ActionResult<UFix64> {
        value_of_deposits
            .checked_mul(threshold)
            .ok_or_else(|| ActionError::overflow(&self.ledger.label, "threshold"))
    }

    fn classify(&self, current: UFix64, value_of_deposits: UFix64) -> ActionResult<RebalanceState> {
        if current < self.bound(value_of_deposits, self.config.lower_threshold)? {
            Ok(RebalanceState::Deficit)
        } else if current > self.bound(value_of_deposits, self.config.upper_threshold)? {
            Ok(RebalanceState::Surplus)
        } else {
            Ok(RebalanceState::Balanced)
        }
    }

    /// Deposits into the balancer, adding the deposit's current value to `value_of_deposits`.
    pub fn deposit(&self, ctx: &mut ActionContext<'_>, container: AssetContainer) -> ActionResult<()> {
        self.ledger.deposit(ctx, container, self.id)
    }

    /// Withdraws exactly `amount`, subtracting its current value from `value_of_deposits`
    /// (saturating at zero).
    pub fn withdraw(&self, ctx: &mut ActionContext<'_>, amount: UFix64) -> ActionResult<AssetContainer> {
        self.ledger.withdraw(ctx, amount, self.id)
    }

    /// Moves value to or from the configured counterpart if the position is out of band.
    ///
    /// A surplus is pushed down to `value_of_deposits × upper` and a deficit pulled up to
    /// `value_of_deposits × lower`. With `force` the thresholds are ignored and the position is
    /// moved to exactly `value_of_deposits`.
    #[instrument(skip(self, ctx), fields(balancer = %self.vault_id(), operation_id = opt(&self.id)))]
    pub fn execute_rebalance(
        &self,
        ctx: &mut ActionContext<'_>,
        force: bool,
    ) -> ActionResult<RebalanceOutcome> {
        let snapshot = self.snapshot(ctx)?;
        let state = if force {
            match snapshot
                .current_value
                .cmp(&snapshot.value_of_deposits)
            {
                std::cmp::Ordering::Greater => RebalanceState::Surplus,
                std::cmp::Ordering::Less => RebalanceState::Deficit,
                std::cmp::Ordering::Equal => RebalanceState::Balanced,
            }
        } else {
            snapshot.state
        };
        debug!(
            %state,
            balance = %snapshot.balance,
            price = %snapshot.price,
            current_value = %snapshot.current_value,
            value_of_deposits = %snapshot.value_of_deposits,
            "Evaluated position"
        );

        match state {
            RebalanceState::Balanced => Ok(RebalanceOutcome::Balanced),
            RebalanceState::Surplus => self.push_surplus(ctx, &snapshot, force),
            RebalanceState::Deficit => self.pull_shortfall(ctx, &snapshot, force),
        }
    }

    /// Units of the balanced asset worth `value`, truncated.
    fn units_of(&self, snapshot: &BalancerSnapshot, value: UFix64) -> ActionResult<UFix64> {
        value
            .checked_div(snapshot.price)
            .ok_or_else(|| ActionError::overflow(&self.ledger.label, "units_of"))
    }

    fn push_surplus(
        &self,
        ctx: &mut ActionContext<'_>,
        snapshot: &BalancerSnapshot,
        force: bool,
    ) -> ActionResult<RebalanceOutcome> {
        let direction = RebalanceDirection::Surplus;
        let Some(sink) = &self.excess_sink else {
            return self.missing_counterpart(direction);
        };
        let target_value = if force {
            snapshot.value_of_deposits
        } else {
            self.bound(snapshot.value_of_deposits, self.config.upper_threshold)?
        };
        // Sized from the value gap so truncation can only leave the balancer holding more.
        let excess = self.units_of(
            snapshot,
            snapshot
                .current_value
                .saturating_sub(target_value),
        )?;
        let capacity = sink.estimate_capacity(ctx)?;
        let amount = capacity.map_or(excess, |capacity| excess.min(capacity));
        if amount.is_zero() {
            debug!(%excess, capacity = %Capacity(capacity), "Nothing to push");
            return Ok(RebalanceOutcome::Skipped { direction, reason: SkipReason::NothingToMove });
        }

        let container = ctx.withdraw(&self.ledger.label, &self.ledger.vault, amount)?;
        sink.deposit(ctx, container)?;
        self.rebalanced(ctx, snapshot, direction, amount)
    }

    fn pull_shortfall(
        &self,
        ctx: &mut ActionContext<'_>,
        snapshot: &BalancerSnapshot,
        force: bool,
    ) -> ActionResult<RebalanceOutcome> {
        let direction = RebalanceDirection::Deficit;
        let Some(source) = &self.shortfall_source else {
            return self.missing_counterpart(direction);
        };
        let target_value = if force {
            snapshot.value_of_deposits
        } else {
            self.bound(snapshot.value_of_deposits, self.config.lower_threshold)?
        };
        let shortfall = self
            .units_of(snapshot, target_value)?
            .saturating_sub(snapshot.balance);
        let container = source.withdraw(ctx, shortfall)?;
        if container.is_empty() {
            container.destroy_empty(&self.ledger.label)?;
            debug!(%shortfall, "Nothing to pull");
            return Ok(RebalanceOutcome::Skipped { direction, reason: SkipReason::NothingToMove });
        }

        let amount = container.amount();
        ctx.deposit(&self.ledger.label, &self.ledger.vault, container)?;
        self.rebalanced(ctx, snapshot, direction, amount)
    }

    fn rebalanced(
        &self,
        ctx: &mut ActionContext<'_>,
        snapshot: &BalancerSnapshot,
        direction: RebalanceDirection,
        amount: UFix64,
    ) -> ActionResult<RebalanceOutcome> {
        let value = self.ledger.value(amount, snapshot.price)?;
        ctx.emit(ActionEvent::Rebalanced {
            balancer: self.vault_id(),
            amount,
            value,
            direction,
            asset_type: self.asset_type().clone(),
            operation_id: self.id,
        });
        info!(%direction, %amount, %value, "Rebalanced");
        Ok(RebalanceOutcome::Rebalanced { direction, amount, value })
    }

    fn missing_counterpart(&self, direction: RebalanceDirection) -> ActionResult<RebalanceOutcome> {
        match self.config.on_missing_counterpart {
            CounterpartPolicy::Skip => {
                warn!(%direction, "Rebalance due but no counterpart connector is configured");
                Ok(RebalanceOutcome::Skipped { direction, reason: SkipReason::MissingCounterpart })
            }
            CounterpartPolicy::Fail => Err(ActionError::MissingCounterpart {
                component: self.ledger.label.clone(),
                direction,
            }),
        }
    }

    pub fn set_excess_sink(&mut self, sink: Option<Box<dyn Sink>>) -> ActionResult<()> {
        if let Some(sink) = &sink {
            ensure_type(&self.ledger.label, self.asset_type(), sink.asset_type())?;
        }
        self.excess_sink = sink;
        if let Some(sink) = &mut self.excess_sink {
            sink.set_id(self.id);
        }
        Ok(())
    }

    pub fn set_shortfall_source(&mut self, source: Option<Box<dyn Source>>) -> ActionResult<()> {
        if let Some(source) = &source {
            ensure_type(&self.ledger.label, self.asset_type(), source.asset_type())?;
        }
        self.shortfall_source = source;
        if let Some(source) = &mut self.shortfall_source {
            source.set_id(self.id);
        }
        Ok(())
    }

    pub fn set_thresholds(&mut self, lower: UFix64, upper: UFix64) -> ActionResult<()> {
        let config = AutoBalancerConfig {
            lower_threshold: lower,
            upper_threshold: upper,
            on_missing_counterpart: self.config.on_missing_counterpart,
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_counterpart_policy(&mut self, policy: CounterpartPolicy) {
        self.config.on_missing_counterpart = policy;
    }

    /// Sink routing deposits through this balancer's ledger.
    pub fn balancer_sink(&self, id: Option<OperationId>) -> AutoBalancerSink {
        AutoBalancerSink::new(Arc::clone(&self.ledger), id)
    }

    /// Source routing withdrawals through this balancer's ledger.
    pub fn balancer_source(&self, id: Option<OperationId>) -> AutoBalancerSource {
        AutoBalancerSource::new(Arc::clone(&self.ledger), id)
    }

    /// Empties and closes the vault, returning the residual balance.
    ///
    /// Connectors previously obtained from [`AutoBalancer::balancer_sink`] or
    /// [`AutoBalancer::balancer_source`] fail with [`ActionError::InvalidHandle`] afterwards.
    pub fn teardown(self, ctx: &mut ActionContext<'_>) -> ActionResult<AssetContainer> {
        let ledger = &self.ledger;
        let balance = ledger.balance(ctx)?;
        let value_of_deposits = ledger.value_of_deposits(ctx)?;
        let residual = ctx.withdraw(&ledger.label, &ledger.vault, balance)?;
        ctx.close_vault(&ledger.label, &ledger.vault)?;
        ctx.emit(ActionEvent::AutoBalancerTornDown {
            balancer: self.vault_id(),
            asset_type: self.asset_type().clone(),
            residual: balance,
            value_of_deposits,
            operation_id: self.id,
        });
        info!(balancer = %self.vault_id(), residual = %balance, %value_of_deposits, "AutoBalancer torn down");
        Ok(residual)
    }
}

impl Identifiable for AutoBalancer {
    fn id(&self) -> Option<&OperationId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: Option<OperationId>) {
        self.id = id;
        if let Some(sink) = &mut self.excess_sink {
            sink.set_id(id);
        }
        if let Some(source) = &mut self.shortfall_source {
            source.set_id(id);
        }
    }

    fn component_info(&self) -> ComponentInfo {
        let mut inner = vec![self.ledger.oracle.component_info()];
        if let Some(sink) = &self.excess_sink {
            inner.push(sink.component_info());
        }
        if let Some(source) = &self.shortfall_source {
            inner.push(source.component_info());
        }
        ComponentInfo::new("AutoBalancer", self.id, inner)
    }
}
