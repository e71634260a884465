//! Declarative rights documents: permission / prohibition / obligation
//! lists with operator-value clauses, evaluated against a request context.

use crate::{GovernanceError, RequestContext};
use serde_json::Value;

/// One operator-value clause inside a rule.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyClause {
    /// Context attribute the clause reads (`odrl:dateTime`, `hyprcat:did`, ...).
    pub left_operand: String,
    /// `eq | neq | gt | gteq | lt | lteq | isAnyOf`.
    pub operator: String,
    pub right_operand: Value,
}

/// One rule: applies when target and action match the request.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRule {
    pub target: Option<String>,
    pub action: Option<String>,
    pub clauses: Vec<PolicyClause>,
}

/// A rights document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyDocument {
    pub permissions: Vec<PolicyRule>,
    pub prohibitions: Vec<PolicyRule>,
    pub obligations: Vec<PolicyRule>,
}

fn get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter().find_map(|k| obj.get(*k))
}

fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    get(value, keys)?.as_str().map(str::to_string)
}

impl PolicyRule {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_object()?;
        let clauses = get(value, &["constraint", "odrl:constraint"])
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(PolicyClause {
                            left_operand: get_str(item, &["leftOperand", "odrl:leftOperand"])?,
                            operator: get_str(item, &["operator", "odrl:operator"])?
                                .rsplit(':')
                                .next()
                                .unwrap_or_default()
                                .to_string(),
                            right_operand: get(item, &["rightOperand", "odrl:rightOperand"])?
                                .clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            target: get_str(value, &["target", "odrl:target"]),
            action: get_str(value, &["action", "odrl:action"]),
            clauses,
        })
    }

    fn to_value(&self) -> Value {
        let clauses: Vec<Value> = self
            .clauses
            .iter()
            .map(|c| {
                serde_json::json!({
                    "leftOperand": c.left_operand,
                    "operator": c.operator,
                    "rightOperand": c.right_operand,
                })
            })
            .collect();
        let mut doc = serde_json::Map::new();
        if let Some(target) = &self.target {
            doc.insert("target".to_string(), serde_json::json!(target));
        }
        if let Some(action) = &self.action {
            doc.insert("action".to_string(), serde_json::json!(action));
        }
        if !clauses.is_empty() {
            doc.insert("constraint".to_string(), Value::Array(clauses));
        }
        Value::Object(doc)
    }

    /// True when the rule's target/action selectors match the request.
    fn applies(&self, ctx: &RequestContext) -> bool {
        let target_ok = match &self.target {
            Some(target) => ctx.target.as_deref() == Some(target.as_str()),
            None => true,
        };
        let action_ok = match &self.action {
            Some(action) => ctx.action.as_deref() == Some(action.as_str()),
            None => true,
        };
        target_ok && action_ok
    }

    /// True when every clause holds against the context.
    fn satisfied(&self, ctx: &RequestContext) -> bool {
        self.clauses.iter().all(|clause| clause.holds(ctx))
    }
}

impl PolicyClause {
    fn context_value(&self, ctx: &RequestContext) -> Option<Value> {
        let local = self.left_operand.rsplit(':').next().unwrap_or("");
        match local {
            "did" | "assignee" => ctx.did.clone().map(Value::String),
            "action" => ctx.action.clone().map(Value::String),
            "target" => ctx.target.clone().map(Value::String),
            _ => None,
        }
    }

    fn holds(&self, ctx: &RequestContext) -> bool {
        let Some(actual) = self.context_value(ctx) else {
            return false;
        };
        compare(&self.operator, &actual, &self.right_operand)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(operator: &str, left: &Value, right: &Value) -> bool {
    if operator == "isAnyOf" {
        return right
            .as_array()
            .map(|items| items.contains(left))
            .unwrap_or(false);
    }
    // Numeric comparison when both sides parse, string otherwise.
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return match operator {
            "eq" => l == r,
            "neq" => l != r,
            "gt" => l > r,
            "gteq" => l >= r,
            "lt" => l < r,
            "lteq" => l <= r,
            _ => false,
        };
    }
    let l = left.as_str().unwrap_or_default();
    let r = right.as_str().unwrap_or_default();
    match operator {
        "eq" => l == r,
        "neq" => l != r,
        "gt" => l > r,
        "gteq" => l >= r,
        "lt" => l < r,
        "lteq" => l <= r,
        _ => false,
    }
}

impl PolicyDocument {
    /// Parse an ODRL-style document; `None` when no rule list is present.
    pub fn from_value(value: &Value) -> Option<Self> {
        let rules = |keys: &[&str]| -> Vec<PolicyRule> {
            get(value, keys)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(PolicyRule::from_value).collect())
                .unwrap_or_default()
        };
        let doc = Self {
            permissions: rules(&["permission", "odrl:permission"]),
            prohibitions: rules(&["prohibition", "odrl:prohibition"]),
            obligations: rules(&["obligation", "odrl:obligation"]),
        };
        if doc.permissions.is_empty() && doc.prohibitions.is_empty() && doc.obligations.is_empty() {
            None
        } else {
            Some(doc)
        }
    }

    /// Serialize to the canonical JSON-LD representation.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "@type": "odrl:Policy",
            "odrl:permission": self.permissions.iter().map(PolicyRule::to_value).collect::<Vec<_>>(),
            "odrl:prohibition": self.prohibitions.iter().map(PolicyRule::to_value).collect::<Vec<_>>(),
            "odrl:obligation": self.obligations.iter().map(PolicyRule::to_value).collect::<Vec<_>>(),
        })
    }
}

/// Evaluate a policy against a request context.
///
/// A matching prohibition is fatal; an applicable obligation whose clauses
/// do not hold is fatal; otherwise the request is permitted.
pub fn evaluate(doc: &PolicyDocument, ctx: &RequestContext) -> Result<(), GovernanceError> {
    for prohibition in &doc.prohibitions {
        if prohibition.applies(ctx) && prohibition.satisfied(ctx) {
            return Err(GovernanceError::PolicyDenied(format!(
                "prohibited action {} on {}",
                ctx.action.as_deref().unwrap_or("*"),
                ctx.target.as_deref().unwrap_or("*"),
            )));
        }
    }
    for obligation in &doc.obligations {
        if obligation.applies(ctx) && !obligation.satisfied(ctx) {
            return Err(GovernanceError::PolicyDenied(
                "unsatisfied obligation".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(did: &str, action: &str, target: &str) -> RequestContext {
        RequestContext {
            did: Some(did.to_string()),
            action: Some(action.to_string()),
            target: Some(target.to_string()),
            payment_proof: None,
        }
    }

    #[test]
    fn test_prohibition_with_matching_selectors_denies() {
        let doc = PolicyDocument::from_value(&json!({
            "odrl:prohibition": [{"target": "https://h/x", "action": "odrl:read"}]
        }))
        .unwrap();
        assert!(evaluate(&doc, &ctx("did:web:a", "odrl:read", "https://h/x")).is_err());
        assert!(evaluate(&doc, &ctx("did:web:a", "odrl:read", "https://h/y")).is_ok());
    }

    #[test]
    fn test_prohibition_clause_must_hold_to_deny() {
        let doc = PolicyDocument::from_value(&json!({
            "odrl:prohibition": [{
                "action": "odrl:use",
                "constraint": [{
                    "leftOperand": "hyprcat:did",
                    "operator": "eq",
                    "rightOperand": "did:web:banned"
                }]
            }]
        }))
        .unwrap();
        assert!(evaluate(&doc, &ctx("did:web:banned", "odrl:use", "t")).is_err());
        assert!(evaluate(&doc, &ctx("did:web:fine", "odrl:use", "t")).is_ok());
    }

    #[test]
    fn test_unsatisfied_obligation_denies() {
        let doc = PolicyDocument::from_value(&json!({
            "odrl:obligation": [{
                "action": "odrl:use",
                "constraint": [{
                    "leftOperand": "hyprcat:did",
                    "operator": "isAnyOf",
                    "rightOperand": ["did:web:member"]
                }]
            }]
        }))
        .unwrap();
        assert!(evaluate(&doc, &ctx("did:web:member", "odrl:use", "t")).is_ok());
        assert!(evaluate(&doc, &ctx("did:web:guest", "odrl:use", "t")).is_err());
    }

    #[test]
    fn test_numeric_comparison_when_both_parse() {
        assert!(compare("gt", &json!("600"), &json!(500)));
        assert!(compare("lteq", &json!(3), &json!("3")));
        assert!(!compare("gt", &json!("abc"), &json!(500)));
    }

    #[test]
    fn test_empty_document_is_none() {
        assert!(PolicyDocument::from_value(&json!({"@type": "odrl:Policy"})).is_none());
    }
}
