//! YAML scenario format.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;
use tributary_common::{balancer::AutoBalancerConfig, AssetType, UFix64};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub description: Option<String>,
    pub vaults: BTreeMap<String, VaultSpec>,
    pub oracle: OracleSpec,
    #[serde(default)]
    pub swappers: BTreeMap<String, SwapperSpec>,
    #[serde(default)]
    pub balancers: BTreeMap<String, BalancerSpec>,
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultSpec {
    pub asset: AssetType,
    #[serde(default)]
    pub balance: UFix64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleSpec {
    pub unit_of_account: AssetType,
    #[serde(default)]
    pub prices: BTreeMap<AssetType, UFix64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwapperSpec {
    FixedRate { in_reserve: String, out_reserve: String, rate: UFix64 },
    MultiRoute { in_asset: AssetType, out_asset: AssetType, routes: Vec<String> },
    Sequential { hops: Vec<String> },
}

/// One end of a pipeline, or a balancer counterpart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointSpec {
    Vault {
        vault: String,
        /// Floor kept in the vault when used as a source, cap when used as a sink.
        #[serde(default)]
        limit: Option<UFix64>,
    },
    Balancer { balancer: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalancerSpec {
    pub asset: AssetType,
    #[serde(flatten)]
    pub config: AutoBalancerConfig,
    #[serde(default)]
    pub excess_sink: Option<EndpointSpec>,
    #[serde(default)]
    pub shortfall_source: Option<EndpointSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    pub source: EndpointSpec,
    #[serde(default)]
    pub swaps: Vec<String>,
    pub sink: EndpointSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    RunPipeline {
        pipeline: String,
        #[serde(default)]
        max: Option<UFix64>,
    },
    DepositToBalancer { balancer: String, from: String, amount: UFix64 },
    SetPrice { asset: AssetType, price: UFix64 },
    Rebalance {
        balancer: String,
        #[serde(default)]
        force: bool,
    },
    Teardown { balancer: String, into: String },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::RunPipeline { .. } => "run_pipeline",
            Step::DepositToBalancer { .. } => "deposit_to_balancer",
            Step::SetPrice { .. } => "set_price",
            Step::Rebalance { .. } => "rebalance",
            Step::Teardown { .. } => "teardown",
        }
    }
}
