//! Affordance views: machine-readable operations embedded in resources.

use crate::shape::PropertyShape;
use serde_json::Value;

/// Methods an affordance may declare.
pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// A typed view over an embedded operation object.
///
/// Never independently identified; the `owner` id of the enclosing resource
/// is captured at extraction time so `target` can fall back to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    /// HTTP method, uppercased.
    pub method: String,
    /// Human-readable title.
    pub title: Option<String>,
    /// Explicit target IRI, when declared.
    pub target: Option<String>,
    /// Expected result type name.
    pub returns: Option<String>,
    /// Input property shapes.
    pub expects: Vec<PropertyShape>,
    /// Attached governance constraint, verbatim.
    pub constraint: Option<Value>,
    /// Id of the resource the operation was found on.
    pub owner: Option<String>,
    /// The raw operation object.
    pub raw: Value,
}

impl Operation {
    /// Extract an operation view from a JSON object; `None` when `method`
    /// is absent or not a string.
    pub fn from_value(value: &Value, owner: Option<&str>) -> Option<Self> {
        let obj = value.as_object()?;
        let method = obj
            .get("method")
            .or_else(|| obj.get("hydra:method"))?
            .as_str()?
            .to_uppercase();
        let title = obj
            .get("title")
            .or_else(|| obj.get("hydra:title"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let target = obj
            .get("target")
            .or_else(|| obj.get("schema:target"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let returns = obj
            .get("returns")
            .or_else(|| obj.get("hydra:returns"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let expects = obj
            .get("expects")
            .or_else(|| obj.get("hydra:expects"))
            .map(PropertyShape::from_expects)
            .unwrap_or_default();
        let constraint = obj
            .get("constraint")
            .or_else(|| obj.get("hyprcat:constraint"))
            .or_else(|| obj.get("x402:constraint"))
            .cloned();
        Some(Self {
            method,
            title,
            target,
            returns,
            expects,
            constraint,
            owner: owner.map(str::to_string),
            raw: value.clone(),
        })
    }

    /// True when the declared method is in the allowed HTTP set.
    pub fn method_allowed(&self) -> bool {
        ALLOWED_METHODS.contains(&self.method.as_str())
    }

    /// Resolved target: explicit target, else the owning resource id.
    pub fn target_or_default(&self) -> String {
        self.target
            .clone()
            .or_else(|| self.owner.clone())
            .unwrap_or_default()
    }

    /// True for methods that carry a request body.
    pub fn has_body(&self) -> bool {
        matches!(self.method.as_str(), "POST" | "PUT" | "PATCH")
    }
}
