//! Node envelope over a JSON-LD document.

use crate::operation::Operation;
use serde_json::{Map, Value};

/// A linked-data resource: identifier, declared types, and everything else
/// as labeled properties.
///
/// `types[0]` is the primary type. Properties keep their document spelling
/// (usually prefixed names such as `schema:price`); accessors fall back
/// through the common aliases so callers stay oblivious to the variation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    /// Resource identifier (IRI or DID), absent on anonymous nodes.
    pub id: Option<String>,
    /// Declared types in document order.
    pub types: Vec<String>,
    /// Remaining labeled properties.
    pub extra: Map<String, Value>,
}

/// Keys folded into `Node::id`.
const ID_KEYS: &[&str] = &["@id", "id"];
/// Keys folded into `Node::types`.
const TYPE_KEYS: &[&str] = &["@type", "type"];
/// Keys consulted by `Node::title`.
const TITLE_KEYS: &[&str] = &["schema:name", "hydra:title", "title", "name", "rdfs:label"];
/// Keys consulted by `Node::description`.
const DESCRIPTION_KEYS: &[&str] = &["schema:description", "hydra:description", "description"];
/// Keys holding embedded operations.
const OPERATION_KEYS: &[&str] = &["operation", "hydra:operation"];
/// Keys holding collection members.
const MEMBER_KEYS: &[&str] = &["member", "hydra:member"];

fn string_or_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

impl Node {
    /// Build a node with an id and a single type.
    pub fn new(id: impl Into<String>, primary_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            types: vec![primary_type.into()],
            extra: Map::new(),
        }
    }

    /// Fold a JSON document into the envelope.
    pub fn from_value(value: &Value) -> Self {
        let mut node = Node::default();
        let Some(obj) = value.as_object() else {
            return node;
        };
        for (key, val) in obj {
            if ID_KEYS.contains(&key.as_str()) {
                if node.id.is_none() {
                    node.id = val.as_str().map(str::to_string);
                }
            } else if TYPE_KEYS.contains(&key.as_str()) {
                if node.types.is_empty() {
                    node.types = string_or_list(val);
                }
            } else {
                node.extra.insert(key.clone(), val.clone());
            }
        }
        node
    }

    /// Serialize back to a JSON-LD object (`@id` / `@type` spelling).
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        if let Some(id) = &self.id {
            obj.insert("@id".to_string(), Value::String(id.clone()));
        }
        match self.types.len() {
            0 => {}
            1 => {
                obj.insert("@type".to_string(), Value::String(self.types[0].clone()));
            }
            _ => {
                obj.insert(
                    "@type".to_string(),
                    Value::Array(self.types.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        for (key, val) in &self.extra {
            obj.insert(key.clone(), val.clone());
        }
        Value::Object(obj)
    }

    /// Primary declared type, when any.
    pub fn primary_type(&self) -> Option<&str> {
        self.types.first().map(String::as_str)
    }

    /// True when `ty` appears anywhere in the declared type set.
    pub fn is_of_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t == ty)
    }

    /// Look up a property by its document key.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// First present property among `keys`.
    pub fn first_property(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.extra.get(*k))
    }

    /// String property accessor.
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Numeric property accessor; accepts JSON numbers and numeric strings.
    pub fn u64_property(&self, key: &str) -> Option<u64> {
        match self.extra.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Display title, trying the common aliases.
    pub fn title(&self) -> Option<&str> {
        self.first_property(TITLE_KEYS).and_then(Value::as_str)
    }

    /// Description, trying the common aliases.
    pub fn description(&self) -> Option<&str> {
        self.first_property(DESCRIPTION_KEYS).and_then(Value::as_str)
    }

    /// Embedded collection members, each folded into its own envelope.
    pub fn members(&self) -> Vec<Node> {
        let Some(raw) = self.first_property(MEMBER_KEYS) else {
            return Vec::new();
        };
        match raw {
            Value::Array(items) => items.iter().map(Node::from_value).collect(),
            Value::Object(_) => vec![Node::from_value(raw)],
            _ => Vec::new(),
        }
    }

    /// Declared `totalItems`, falling back to the member count.
    pub fn total_items(&self) -> u64 {
        self.first_property(&["totalItems", "hydra:totalItems"])
            .and_then(Value::as_u64)
            .unwrap_or_else(|| self.members().len() as u64)
    }

    /// Operations advertised by this resource.
    ///
    /// Folds in operations nested under `member[*].operation` so a
    /// collection's affordances are discoverable through the collection
    /// itself. Targets missing on an operation fall back to the owning
    /// resource id.
    pub fn operations(&self) -> Vec<Operation> {
        let mut out = Vec::new();
        self.collect_operations(self.id.as_deref(), &mut out);
        for member in self.members() {
            let owner = member.id.clone().or_else(|| self.id.clone());
            member.collect_operations(owner.as_deref(), &mut out);
        }
        out
    }

    fn collect_operations(&self, owner: Option<&str>, out: &mut Vec<Operation>) {
        let Some(raw) = self.first_property(OPERATION_KEYS) else {
            return;
        };
        let items: Vec<&Value> = match raw {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![raw],
            _ => Vec::new(),
        };
        for item in items {
            if let Some(op) = Operation::from_value(item, owner) {
                out.push(op);
            }
        }
    }

    /// Governance constraint attached directly to the resource, if any.
    pub fn constraint(&self) -> Option<&Value> {
        self.first_property(&["constraint", "hyprcat:constraint", "x402:constraint"])
    }

    /// Set a property, consuming and returning self for seed-building.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Add a secondary type.
    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.types.push(ty.into());
        self
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::from_value(&value)
    }
}
