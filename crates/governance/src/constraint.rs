//! Constraint sum type and its JSON-LD parsing.

use crate::policy::PolicyDocument;
use serde_json::Value;

/// Payment requirement attached to an affordance.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentConstraint {
    /// Amount in minor units of `currency`.
    pub amount: u64,
    pub currency: String,
    /// Receiving identity.
    pub recipient: String,
}

/// Token-gate requirement: hold at least `min_balance` of a token.
///
/// No external chain read happens in the simulated model; a real deployment
/// plugs a verifier in behind the same yes/no interface.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenGateConstraint {
    pub required_token: String,
    pub min_balance: u64,
    pub chain_id: Option<String>,
    pub standard: Option<String>,
}

/// A governance constraint. Composites combine at a single level.
#[derive(Clone, Debug)]
pub enum Constraint {
    Payment(PaymentConstraint),
    TokenGate(TokenGateConstraint),
    Policy(PolicyDocument),
    AllOf(Vec<Constraint>),
    AnyOf(Vec<Constraint>),
}

fn get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter().find_map(|k| obj.get(*k))
}

fn get_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    match get(value, keys)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    get(value, keys)?.as_str().map(str::to_string)
}

fn type_of(value: &Value) -> String {
    match get(value, &["@type", "type"]) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

impl Constraint {
    /// Parse a constraint document. Returns `None` when the value does not
    /// describe any known constraint kind.
    pub fn from_value(value: &Value) -> Option<Self> {
        let ty = type_of(value);
        let local = ty.rsplit(':').next().unwrap_or(ty.as_str());
        match local {
            "PaymentConstraint" | "PaymentRequired" => {
                Some(Constraint::Payment(PaymentConstraint {
                    amount: get_u64(value, &["x402:amount", "amount"])?,
                    currency: get_str(value, &["x402:currency", "currency"])
                        .unwrap_or_else(|| "SAT".to_string()),
                    recipient: get_str(value, &["x402:recipient", "recipient"])
                        .unwrap_or_default(),
                }))
            }
            "TokenGate" | "TokenGateConstraint" => {
                Some(Constraint::TokenGate(TokenGateConstraint {
                    required_token: get_str(value, &["hyprcat:requiredToken", "requiredToken"])?,
                    min_balance: get_u64(value, &["hyprcat:minBalance", "minBalance"]).unwrap_or(1),
                    chain_id: get_str(value, &["hyprcat:chainId", "chainId"]),
                    standard: get_str(value, &["hyprcat:standard", "standard"]),
                }))
            }
            "Policy" | "Set" | "Offer" | "Agreement" => {
                PolicyDocument::from_value(value).map(Constraint::Policy)
            }
            "AllOf" | "AndConstraint" => Some(Constraint::AllOf(Self::parse_parts(value)?)),
            "AnyOf" | "OrConstraint" => Some(Constraint::AnyOf(Self::parse_parts(value)?)),
            _ => None,
        }
    }

    fn parse_parts(value: &Value) -> Option<Vec<Constraint>> {
        let parts = get(value, &["constraints", "hyprcat:constraints"])?.as_array()?;
        let parsed: Vec<Constraint> = parts.iter().filter_map(Constraint::from_value).collect();
        if parsed.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    /// Serialize to the canonical JSON-LD representation.
    pub fn to_value(&self) -> Value {
        match self {
            Constraint::Payment(p) => serde_json::json!({
                "@type": "x402:PaymentConstraint",
                "x402:amount": p.amount,
                "x402:currency": p.currency,
                "x402:recipient": p.recipient,
            }),
            Constraint::TokenGate(g) => {
                let mut doc = serde_json::json!({
                    "@type": "hyprcat:TokenGate",
                    "hyprcat:requiredToken": g.required_token,
                    "hyprcat:minBalance": g.min_balance,
                });
                let obj = doc.as_object_mut().expect("object literal");
                if let Some(chain) = &g.chain_id {
                    obj.insert("hyprcat:chainId".to_string(), serde_json::json!(chain));
                }
                if let Some(standard) = &g.standard {
                    obj.insert("hyprcat:standard".to_string(), serde_json::json!(standard));
                }
                doc
            }
            Constraint::Policy(doc) => doc.to_value(),
            Constraint::AllOf(parts) => serde_json::json!({
                "@type": "hyprcat:AllOf",
                "constraints": parts.iter().map(Constraint::to_value).collect::<Vec<_>>(),
            }),
            Constraint::AnyOf(parts) => serde_json::json!({
                "@type": "hyprcat:AnyOf",
                "constraints": parts.iter().map(Constraint::to_value).collect::<Vec<_>>(),
            }),
        }
    }
}
