//! The strategy contract: pluggable decision modules selected by type
//! intersection with the observed resource.

use hyprcat_linkdata::{Node, Operation};
use serde_json::Value;
use std::collections::BTreeMap;

/// Wallet view available to strategies at decision time.
#[derive(Clone, Debug, Default)]
pub struct WalletSnapshot {
    /// Balance in the default currency.
    pub balance_sat: u64,
    /// Token holdings.
    pub tokens: BTreeMap<String, u64>,
}

impl WalletSnapshot {
    /// Parse the `/wallet` response document.
    pub fn from_value(value: &Value) -> Self {
        let balance_sat = value
            .get("hyprcat:balances")
            .or_else(|| value.get("balances"))
            .and_then(|b| b.get("SAT"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let tokens = value
            .get("hyprcat:tokens")
            .or_else(|| value.get("tokens"))
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();
        Self { balance_sat, tokens }
    }
}

/// Everything a strategy sees when deciding.
#[derive(Clone, Debug)]
pub struct StrategyContext {
    /// The resource just observed.
    pub resource: Node,
    /// Current wallet view.
    pub wallet: WalletSnapshot,
    /// URLs already visited this run.
    pub visited: Vec<String>,
}

impl StrategyContext {
    pub fn already_visited(&self, url: &str) -> bool {
        self.visited.iter().any(|seen| seen == url)
    }
}

/// A strategy's proposal for the current iteration.
#[derive(Clone, Debug)]
pub struct Decision {
    /// Execute `operation` this iteration.
    pub should_execute: bool,
    pub operation: Option<Operation>,
    pub input: Option<Value>,
    /// Suggested next URL when not executing.
    pub navigate_to: Option<String>,
    /// Provenance action type recorded on execution.
    pub action_type: Option<String>,
    /// Human-readable reasoning, recorded in provenance.
    pub reason: String,
    /// Higher wins among executable decisions.
    pub priority: i32,
}

impl Decision {
    /// A non-executing navigation suggestion.
    pub fn navigate(url: impl Into<String>, reason: impl Into<String>, priority: i32) -> Self {
        Self {
            should_execute: false,
            operation: None,
            input: None,
            navigate_to: Some(url.into()),
            action_type: None,
            reason: reason.into(),
            priority,
        }
    }

    /// An executable proposal.
    pub fn execute(
        operation: Operation,
        input: Option<Value>,
        action_type: impl Into<String>,
        reason: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            should_execute: true,
            operation: Some(operation),
            input,
            navigate_to: None,
            action_type: Some(action_type.into()),
            reason: reason.into(),
            priority,
        }
    }
}

/// A pluggable decision module.
///
/// `matches` defaults to type intersection between the resource's declared
/// types and the strategy's trigger set.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn trigger_types(&self) -> &[&str];

    fn matches(&self, ctx: &StrategyContext) -> bool {
        ctx.resource
            .types
            .iter()
            .any(|t| self.trigger_types().contains(&t.as_str()))
    }

    /// Propose a decision, or decline this iteration.
    fn evaluate(&self, ctx: &StrategyContext) -> Option<Decision>;
}
