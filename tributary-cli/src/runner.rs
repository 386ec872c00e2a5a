//! Builds the connectors a scenario describes and runs its steps.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use tributary_common::{
    atomically,
    balancer::AutoBalancer,
    connectors::{BoundedSink, BoundedSource},
    pipeline::{Pipeline, PipelineBuilder},
    storage::{MemoryValueStore, OwnedVault, VaultAccess},
    swap::{multi_route::MultiRouteSwapper, sequential::SequentialSwapper, Swapper},
    traits::{PriceOracle, Sink, Source},
    venue::{FixedRateSwapper, StaticPriceOracle},
    ActionContext, ActionEvent, ActionResult, ComponentInfo, Identifiable, OperationId,
};

use crate::{
    report::{RunReport, StepReport, StepStatus, VaultBalance},
    scenario::{BalancerSpec, EndpointSpec, PipelineSpec, Scenario, Step, SwapperSpec},
};

/// Component name recorded for transfers the scenario itself performs.
const SCENARIO: &str = "scenario";

fn lookup<'a, T>(entries: &'a BTreeMap<String, T>, kind: &str, name: &str) -> anyhow::Result<&'a T> {
    entries
        .get(name)
        .ok_or_else(|| anyhow!("Unknown {kind} {name}"))
}

#[derive(Debug)]
pub struct Runner {
    description: Option<String>,
    store: MemoryValueStore,
    vaults: BTreeMap<String, OwnedVault>,
    oracle: StaticPriceOracle,
    balancers: BTreeMap<String, AutoBalancer>,
    pipelines: BTreeMap<String, Pipeline>,
    steps: Vec<Step>,
}

impl Runner {
    /// Funds the vaults, creates the AutoBalancers in a setup unit of work and builds every
    /// pipeline. Any unknown name or mistyped wiring fails here, before a step runs.
    pub fn new(scenario: Scenario) -> anyhow::Result<Self> {
        let mut store = MemoryValueStore::new();
        let mut vaults = BTreeMap::new();
        for (name, spec) in &scenario.vaults {
            let vault = store.open_vault(spec.asset.clone());
            store
                .mint(&vault, spec.balance)
                .with_context(|| format!("Failed to fund vault {name}"))?;
            vaults.insert(name.clone(), vault);
        }
        let oracle = scenario
            .oracle
            .prices
            .iter()
            .fold(StaticPriceOracle::new(scenario.oracle.unit_of_account.clone(), None), |oracle, (asset, price)| {
                oracle.with_price(asset.clone(), *price)
            });

        let mut runner = Self {
            description: scenario.description.clone(),
            store,
            vaults,
            oracle,
            balancers: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            steps: scenario.steps.clone(),
        };
        runner.create_balancers(&scenario.balancers)?;
        for (name, spec) in &scenario.balancers {
            runner
                .wire_balancer(name, spec)
                .with_context(|| format!("Failed to wire balancer {name}"))?;
        }
        for (name, spec) in &scenario.pipelines {
            let pipeline = runner
                .build_pipeline(&scenario.swappers, spec)
                .with_context(|| format!("Failed to build pipeline {name}"))?;
            runner
                .pipelines
                .insert(name.clone(), pipeline);
        }
        info!(
            vaults = runner.vaults.len(),
            balancers = runner.balancers.len(),
            pipelines = runner.pipelines.len(),
            steps = runner.steps.len(),
            "Scenario ready"
        );
        Ok(runner)
    }

    fn create_balancers(&mut self, specs: &BTreeMap<String, BalancerSpec>) -> anyhow::Result<()> {
        let oracle: Arc<dyn PriceOracle> = Arc::new(self.oracle.clone());
        let (balancers, receipt) = atomically(&mut self.store, |ctx| {
            specs
                .iter()
                .map(|(name, spec)| {
                    let balancer = AutoBalancer::create(
                        ctx,
                        spec.asset.clone(),
                        oracle.clone(),
                        spec.config.clone(),
                        Some(OperationId::new()),
                    )?;
                    Ok((name.clone(), balancer))
                })
                .collect::<ActionResult<BTreeMap<_, _>>>()
        })
        .context("Failed to create AutoBalancers")?;
        debug!(events = receipt.events.len(), "AutoBalancers created");
        self.balancers = balancers;
        Ok(())
    }

    fn wire_balancer(&mut self, name: &str, spec: &BalancerSpec) -> anyhow::Result<()> {
        let sink = spec
            .excess_sink
            .as_ref()
            .map(|endpoint| self.sink(endpoint))
            .transpose()?;
        let source = spec
            .shortfall_source
            .as_ref()
            .map(|endpoint| self.source(endpoint))
            .transpose()?;
        let balancer = self
            .balancers
            .get_mut(name)
            .ok_or_else(|| anyhow!("Unknown balancer {name}"))?;
        balancer.set_excess_sink(sink)?;
        balancer.set_shortfall_source(source)?;
        Ok(())
    }

    fn source(&self, endpoint: &EndpointSpec) -> anyhow::Result<Box<dyn Source>> {
        Ok(match endpoint {
            EndpointSpec::Vault { vault, limit } => Box::new(BoundedSource::new(
                lookup(&self.vaults, "vault", vault)?.withdraw_capability(),
                *limit,
                None,
            )),
            EndpointSpec::Balancer { balancer } => {
                Box::new(lookup(&self.balancers, "balancer", balancer)?.balancer_source(None))
            }
        })
    }

    fn sink(&self, endpoint: &EndpointSpec) -> anyhow::Result<Box<dyn Sink>> {
        Ok(match endpoint {
            EndpointSpec::Vault { vault, limit } => Box::new(BoundedSink::new(
                lookup(&self.vaults, "vault", vault)?.deposit_capability(),
                *limit,
                None,
            )),
            EndpointSpec::Balancer { balancer } => {
                Box::new(lookup(&self.balancers, "balancer", balancer)?.balancer_sink(None))
            }
        })
    }

    /// Builds the swapper called `name`. `trail` holds the swappers currently being built, so a
    /// route or hop that refers back to one of them is reported instead of recursing forever.
    fn swapper(
        &self,
        swappers: &BTreeMap<String, SwapperSpec>,
        name: &str,
        trail: &mut Vec<String>,
    ) -> anyhow::Result<Box<dyn Swapper>> {
        if trail.iter().any(|seen| seen == name) {
            bail!("Swapper {name} refers to itself through {} -> {name}", trail.join(" -> "));
        }
        let spec = lookup(swappers, "swapper", name)?;
        trail.push(name.to_string());
        let swapper: Box<dyn Swapper> = match spec {
            SwapperSpec::FixedRate { in_reserve, out_reserve, rate } => {
                Box::new(FixedRateSwapper::from_reserves(
                    lookup(&self.vaults, "vault", in_reserve)?,
                    lookup(&self.vaults, "vault", out_reserve)?,
                    *rate,
                    None,
                )?)
            }
            SwapperSpec::MultiRoute { in_asset, out_asset, routes } => {
                let routes = routes
                    .iter()
                    .map(|route| self.swapper(swappers, route, trail))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Box::new(MultiRouteSwapper::new(in_asset.clone(), out_asset.clone(), routes, None)?)
            }
            SwapperSpec::Sequential { hops } => {
                let hops = hops
                    .iter()
                    .map(|hop| self.swapper(swappers, hop, trail))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                Box::new(SequentialSwapper::new(hops, None)?)
            }
        };
        trail.pop();
        Ok(swapper)
    }

    fn build_pipeline(
        &self,
        swappers: &BTreeMap<String, SwapperSpec>,
        spec: &PipelineSpec,
    ) -> anyhow::Result<Pipeline> {
        let mut builder = PipelineBuilder::from_source(self.source(&spec.source)?).with_id(OperationId::new());
        for name in &spec.swaps {
            builder = builder.swap_through(self.swapper(swappers, name, &mut Vec::new())?)?;
        }
        Ok(builder.into_sink(self.sink(&spec.sink)?)?)
    }

    /// Component trees of all pipelines and AutoBalancers, keyed by `pipeline:<name>` and
    /// `balancer:<name>`.
    pub fn describe(&self) -> Vec<(String, ComponentInfo)> {
        self.pipelines
            .iter()
            .map(|(name, pipeline)| (format!("pipeline:{name}"), pipeline.component_info()))
            .chain(
                self.balancers
                    .iter()
                    .map(|(name, balancer)| (format!("balancer:{name}"), balancer.component_info())),
            )
            .collect()
    }

    /// Runs every step in order. A failed step is reported and its unit of work discarded; the
    /// following steps still run.
    pub fn run(&mut self) -> RunReport {
        let steps = std::mem::take(&mut self.steps);
        let steps = steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.run_step(index, step))
            .collect();
        RunReport {
            description: self.description.clone(),
            steps,
            vaults: self.balances(),
            balancers: self.snapshots(),
            total_supply: self.supplies(),
        }
    }

    #[instrument(skip(self, step), fields(action = step.name()))]
    fn run_step(&mut self, index: usize, step: &Step) -> StepReport {
        match self.execute(step) {
            Ok((detail, events)) => {
                info!(events = events.len(), "Step committed");
                StepReport {
                    index,
                    action: step.name(),
                    status: StepStatus::Committed,
                    detail,
                    error: None,
                    events,
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(%error, "Step failed, changes discarded");
                StepReport {
                    index,
                    action: step.name(),
                    status: StepStatus::Failed,
                    detail: Value::Null,
                    error: Some(error),
                    events: Vec::new(),
                }
            }
        }
    }

    fn execute(&mut self, step: &Step) -> anyhow::Result<(Value, Vec<ActionEvent>)> {
        match step {
            Step::RunPipeline { pipeline, max } => {
                let pipeline = lookup(&self.pipelines, "pipeline", pipeline)?;
                let (report, receipt) = atomically(&mut self.store, |ctx| pipeline.execute(ctx, *max))?;
                Ok((serde_json::to_value(report)?, receipt.events))
            }
            Step::DepositToBalancer { balancer, from, amount } => {
                let balancer = lookup(&self.balancers, "balancer", balancer)?;
                let from = lookup(&self.vaults, "vault", from)?;
                let ((), receipt) = atomically(&mut self.store, |ctx| {
                    let deposit = ctx.withdraw(SCENARIO, from, *amount)?;
                    balancer.deposit(ctx, deposit)
                })?;
                Ok((Value::Null, receipt.events))
            }
            Step::SetPrice { asset, price } => {
                self.oracle
                    .set_price(asset.clone(), *price);
                info!(%asset, %price, "Price updated");
                Ok((json!({ "asset": asset, "price": price }), Vec::new()))
            }
            Step::Rebalance { balancer, force } => {
                let balancer = lookup(&self.balancers, "balancer", balancer)?;
                let (outcome, receipt) =
                    atomically(&mut self.store, |ctx| balancer.execute_rebalance(ctx, *force))?;
                Ok((serde_json::to_value(outcome)?, receipt.events))
            }
            Step::Teardown { balancer, into } => {
                let into = lookup(&self.vaults, "vault", into)?.deposit_capability();
                // The balancer is retired from the scenario even if the teardown fails.
                let target = self
                    .balancers
                    .remove(balancer)
                    .ok_or_else(|| anyhow!("Unknown balancer {balancer}"))?;
                let (residual, receipt) = atomically(&mut self.store, |ctx| {
                    let residual = target.teardown(ctx)?;
                    let amount = residual.amount();
                    ctx.deposit(SCENARIO, &into, residual)?;
                    Ok(amount)
                })?;
                Ok((json!({ "residual": residual }), receipt.events))
            }
        }
    }

    fn balances(&self) -> BTreeMap<String, VaultBalance> {
        self.vaults
            .iter()
            .filter_map(|(name, vault)| {
                let balance = self.store.balance(vault.vault_id())?;
                Some((name.clone(), VaultBalance { asset_type: vault.asset_type().clone(), balance }))
            })
            .collect()
    }

    fn snapshots(&mut self) -> BTreeMap<String, tributary_common::balancer::BalancerSnapshot> {
        let ctx = ActionContext::begin(&mut self.store);
        let snapshots = self
            .balancers
            .iter()
            .filter_map(|(name, balancer)| match balancer.snapshot(&ctx) {
                Ok(snapshot) => Some((name.clone(), snapshot)),
                Err(err) => {
                    warn!(balancer = %name, %err, "Snapshot unavailable");
                    None
                }
            })
            .collect();
        ctx.rollback();
        snapshots
    }

    fn supplies(&self) -> BTreeMap<tributary_common::AssetType, tributary_common::UFix64> {
        self.vaults
            .values()
            .map(|vault| vault.asset_type().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|asset_type| {
                let supply = self.store.total_supply(&asset_type);
                (asset_type, supply)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tributary_common::UFix64;

    use super::*;

    fn amount(value: &str) -> UFix64 {
        value.parse().unwrap()
    }

    fn harvest() -> Runner {
        let scenario = Scenario::from_yaml_str(include_str!("../scenarios/harvest.yaml")).unwrap();
        Runner::new(scenario).unwrap()
    }

    #[test]
    fn test_harvest_scenario() {
        let mut runner = harvest();

        let report = runner.run();

        let statuses: Vec<StepStatus> = report
            .steps
            .iter()
            .map(|step| step.status)
            .collect();
        assert_eq!(
            statuses,
            [vec![StepStatus::Committed; 8], vec![StepStatus::Failed]].concat()
        );
        assert_eq!(report.steps[0].detail["moved"], json!("60.00000000"));
        assert_eq!(report.steps[3].detail["outcome"], json!("rebalanced"));
        assert_eq!(report.steps[3].detail["amount"], json!("6.00000000"));
        assert_eq!(report.steps[5].detail["amount"], json!("12.25000000"));
        assert_eq!(report.steps[6].detail["moved"], json!("27.50000000"));
        assert_eq!(report.steps[7].detail["residual"], json!("56.25000000"));
        let balance = |name: &str| report.vaults[name].balance;
        assert_eq!(balance("treasury"), amount("156.25"));
        assert_eq!(balance("venue_a_flow"), UFix64::ZERO);
        assert_eq!(balance("venue_b_flow"), amount("43.75"));
        assert_eq!(balance("savings"), amount("87.5"));
        assert!(report.balancers.is_empty());
        assert_eq!(
            report.total_supply.values().copied().collect::<Vec<_>>(),
            vec![amount("200"), amount("2000")]
        );
    }

    #[test]
    fn test_failed_step_is_discarded() {
        let mut runner = harvest();
        runner.steps = vec![
            Step::RunPipeline { pipeline: "fund_position".to_string(), max: Some(amount("10")) },
            Step::DepositToBalancer {
                balancer: "position".to_string(),
                from: "savings".to_string(),
                amount: amount("1"),
            },
        ];

        let report = runner.run();

        assert_eq!(report.steps[0].status, StepStatus::Committed);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        assert!(report.steps[1].events.is_empty());
        assert_eq!(report.vaults["savings"].balance, UFix64::ZERO);
        assert_eq!(report.vaults["treasury"].balance, amount("190"));
        assert_eq!(report.balancers["position"].value_of_deposits, amount("20"));
    }

    #[test]
    fn test_describe_lists_components() {
        let runner = harvest();

        let described = runner.describe();

        let names: Vec<&str> = described
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["pipeline:fund_position", "pipeline:harvest", "balancer:position"]);
        let (_, harvest) = &described[1];
        assert_eq!(harvest.kind, "Pipeline");
        assert!(harvest.is_aligned_to(harvest.id.as_ref().unwrap()));
    }

    #[test]
    fn test_rejects_swapper_cycles() {
        let yaml = r#"
vaults:
  wallet: { asset: FLOW, balance: "10" }
  savings: { asset: FLOW }
oracle: { unit_of_account: USDC }
swappers:
  loop:
    kind: sequential
    hops: [back]
  back:
    kind: sequential
    hops: [loop]
pipelines:
  broken:
    source: { kind: vault, vault: wallet }
    swaps: [loop]
    sink: { kind: vault, vault: savings }
"#;
        let scenario = Scenario::from_yaml_str(yaml).unwrap();

        let err = Runner::new(scenario).unwrap_err();

        assert!(format!("{err:#}").contains("loop -> back -> loop"));
    }

    #[test]
    fn test_rejects_unknown_vault() {
        let yaml = r#"
vaults:
  wallet: { asset: FLOW }
oracle: { unit_of_account: USDC }
pipelines:
  broken:
    source: { kind: vault, vault: wallet }
    sink: { kind: vault, vault: nowhere }
"#;
        let scenario = Scenario::from_yaml_str(yaml).unwrap();

        let err = Runner::new(scenario).unwrap_err();

        assert_eq!(format!("{err:#}"), "Failed to build pipeline broken: Unknown vault nowhere");
    }
}
