use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use serde::Serialize;
use serde_json::Value;
use tributary_common::{balancer::BalancerSnapshot, ActionEvent, AssetType, UFix64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Committed,
    Failed,
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub detail: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<ActionEvent>,
}

#[derive(Debug, Serialize)]
pub struct VaultBalance {
    pub asset_type: AssetType,
    pub balance: UFix64,
}

/// Everything a scenario run produced, printed as text or JSON.
#[derive(Debug, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<StepReport>,
    pub vaults: BTreeMap<String, VaultBalance>,
    pub balancers: BTreeMap<String, BalancerSnapshot>,
    pub total_supply: BTreeMap<AssetType, UFix64>,
}

impl RunReport {
    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Failed)
            .count()
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(description) = &self.description {
            writeln!(f, "{description}")?;
            writeln!(f)?;
        }
        for step in &self.steps {
            match &step.error {
                None => writeln!(f, "#{} {} committed", step.index, step.action)?,
                Some(error) => writeln!(f, "#{} {} FAILED: {error}", step.index, step.action)?,
            }
            if !step.detail.is_null() {
                writeln!(f, "    {}", step.detail)?;
            }
            for event in &step.events {
                let payload = serde_json::to_string(event).map_err(|_| fmt::Error)?;
                writeln!(f, "    {}: {payload}", event.name())?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Vaults:")?;
        for (name, vault) in &self.vaults {
            writeln!(f, "  {name:<16} {:>20} {}", vault.balance, vault.asset_type)?;
        }
        if !self.balancers.is_empty() {
            writeln!(f, "AutoBalancers:")?;
            for (name, snapshot) in &self.balancers {
                writeln!(
                    f,
                    "  {name:<16} {} {} worth {} against {} deposited ({})",
                    snapshot.balance,
                    snapshot.asset_type,
                    snapshot.current_value,
                    snapshot.value_of_deposits,
                    snapshot.state,
                )?;
            }
        }
        writeln!(f, "Total supply:")?;
        for (asset_type, supply) in &self.total_supply {
            writeln!(f, "  {asset_type:<16} {supply:>20}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn report(status: StepStatus, error: Option<&str>) -> RunReport {
        RunReport {
            description: None,
            steps: vec![StepReport {
                index: 0,
                action: "rebalance",
                status,
                detail: Value::Null,
                error: error.map(str::to_string),
                events: Vec::new(),
            }],
            vaults: BTreeMap::from([(
                "treasury".to_string(),
                VaultBalance { asset_type: AssetType::from("FLOW"), balance: UFix64::ONE },
            )]),
            balancers: BTreeMap::new(),
            total_supply: BTreeMap::from([(AssetType::from("FLOW"), UFix64::ONE)]),
        }
    }

    #[test]
    fn test_json_omits_empty_fields() {
        let report = report(StepStatus::Committed, None);

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value["steps"][0],
            json!({ "index": 0, "action": "rebalance", "status": "committed", "events": [] })
        );
        assert_eq!(value["total_supply"]["FLOW"], json!("1.00000000"));
        assert_eq!(report.failed_steps(), 0);
    }

    #[test]
    fn test_text_names_failures() {
        let report = report(StepStatus::Failed, Some("AutoBalancer(vault #3): invalid handle"));

        let text = report.to_string();

        assert!(text.contains("#0 rebalance FAILED: AutoBalancer(vault #3): invalid handle"));
        assert!(text.contains("treasury"));
        assert_eq!(report.failed_steps(), 1);
    }
}
