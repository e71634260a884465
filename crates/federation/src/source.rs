//! Simulated backing sources and per-source query execution.

use crate::parser::{CmpOp, Literal, OrderBy, Predicate, Query};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::time::Instant;

/// A backing source: endpoint plus mapping type.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceDescriptor {
    /// Planner name (`analytics`, `sales`, ...).
    pub name: String,
    /// Endpoint IRI stamped into row provenance.
    pub endpoint: String,
    /// Mapping family the source speaks.
    pub mapping_type: String,
}

impl SourceDescriptor {
    /// Descriptor for a simulated source.
    pub fn simulated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: format!("https://sources.hyprcat.dev/{name}"),
            mapping_type: "hyprcat:SimulatedSource".to_string(),
        }
    }
}

/// A source backed by an embedded deterministic dataset.
#[derive(Clone, Debug)]
pub struct MockSource {
    pub descriptor: SourceDescriptor,
    pub rows: Vec<Map<String, Value>>,
    /// A source that always fails, for exercising the 502 path.
    pub failing: bool,
}

fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

impl MockSource {
    /// The standard simulated source set, deterministic across runs.
    pub fn standard_set() -> Vec<MockSource> {
        vec![
            MockSource {
                descriptor: SourceDescriptor::simulated("analytics"),
                rows: analytics_rows(),
                failing: false,
            },
            MockSource {
                descriptor: SourceDescriptor::simulated("sales"),
                rows: sales_rows(),
                failing: false,
            },
            MockSource {
                descriptor: SourceDescriptor::simulated("inventory"),
                rows: inventory_rows(),
                failing: false,
            },
            MockSource {
                descriptor: SourceDescriptor::simulated("telemetry"),
                rows: telemetry_rows(),
                failing: false,
            },
            MockSource {
                descriptor: SourceDescriptor::simulated("broken"),
                rows: Vec::new(),
                failing: true,
            },
        ]
    }

    /// Execute a query against this source: filter, sort, project, trim,
    /// and stamp every row with its origin.
    pub fn execute(&self, query: &Query) -> Vec<Map<String, Value>> {
        let started = Instant::now();
        let mut rows: Vec<Map<String, Value>> = self
            .rows
            .iter()
            .filter(|row| query.predicates.iter().all(|p| predicate_holds(p, row)))
            .cloned()
            .collect();
        if let Some(order) = &query.order_by {
            sort_rows(&mut rows, order);
        }
        rows.truncate(query.limit);
        let projected: Vec<Map<String, Value>> =
            rows.into_iter().map(|row| project(row, &query.select)).collect();
        let elapsed = started.elapsed().as_millis() as u64;
        projected
            .into_iter()
            .map(|mut row| {
                row.insert(
                    "provenance".to_string(),
                    json!({
                        "sourceNode": self.descriptor.endpoint,
                        "executionTime": format!("{elapsed}ms"),
                    }),
                );
                row
            })
            .collect()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn literal_number(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Number(n) => Some(*n),
        Literal::Text(s) => s.trim().parse().ok(),
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Number(n) => n.to_string(),
        Literal::Text(s) => s.clone(),
    }
}

/// `LIKE`: case-insensitive substring match with `%` wildcards.
fn like_matches(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let candidate = candidate.to_lowercase();
    if !pattern.contains('%') {
        return candidate.contains(&pattern);
    }
    let anchored_start = !pattern.starts_with('%');
    let anchored_end = !pattern.ends_with('%');
    let segments: Vec<&str> = pattern.split('%').filter(|s| !s.is_empty()).collect();
    let mut cursor = 0;
    for (idx, segment) in segments.iter().enumerate() {
        let found = match candidate[cursor..].find(segment) {
            Some(offset) => cursor + offset,
            None => return false,
        };
        if idx == 0 && anchored_start && found != 0 {
            return false;
        }
        cursor = found + segment.len();
    }
    if anchored_end {
        if let Some(last) = segments.last() {
            return candidate.ends_with(last);
        }
    }
    true
}

/// Evaluate one predicate against a row. Comparison coerces both sides to
/// numbers when both parse; otherwise compares as strings.
pub fn predicate_holds(predicate: &Predicate, row: &Map<String, Value>) -> bool {
    let Some(value) = row.get(&predicate.field) else {
        return false;
    };
    if predicate.op == CmpOp::Like {
        let candidate = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return like_matches(&literal_text(&predicate.value), &candidate);
    }
    if let (Some(l), Some(r)) = (as_number(value), literal_number(&predicate.value)) {
        return match predicate.op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Like => unreachable!(),
        };
    }
    let l = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let r = literal_text(&predicate.value);
    match predicate.op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        CmpOp::Gt => l > r,
        CmpOp::Ge => l >= r,
        CmpOp::Lt => l < r,
        CmpOp::Le => l <= r,
        CmpOp::Like => unreachable!(),
    }
}

fn sort_rows(rows: &mut [Map<String, Value>], order: &OrderBy) {
    rows.sort_by(|a, b| {
        let left = a.get(&order.field);
        let right = b.get(&order.field);
        let ordering = match (left.and_then(as_number), right.and_then(as_number)) {
            (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
            _ => {
                let l = left.map(|v| v.to_string()).unwrap_or_default();
                let r = right.map(|v| v.to_string()).unwrap_or_default();
                l.cmp(&r)
            }
        };
        if order.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn project(row: Map<String, Value>, select: &[String]) -> Map<String, Value> {
    if select.iter().any(|c| c == "*") {
        return row;
    }
    select
        .iter()
        .filter_map(|column| row.get(column).map(|v| (column.clone(), v.clone())))
        .collect()
}

fn analytics_rows() -> Vec<Map<String, Value>> {
    vec![
        row(&[("user_id", json!(1)), ("total_spend", json!(1250)), ("region", json!("emea")), ("sessions", json!(42))]),
        row(&[("user_id", json!(2)), ("total_spend", json!(310)), ("region", json!("amer")), ("sessions", json!(17))]),
        row(&[("user_id", json!(3)), ("total_spend", json!(890)), ("region", json!("apac")), ("sessions", json!(55))]),
        row(&[("user_id", json!(4)), ("total_spend", json!(75)), ("region", json!("emea")), ("sessions", json!(4))]),
        row(&[("user_id", json!(5)), ("total_spend", json!(2040)), ("region", json!("amer")), ("sessions", json!(88))]),
        row(&[("user_id", json!(6)), ("total_spend", json!(505)), ("region", json!("apac")), ("sessions", json!(23))]),
        row(&[("user_id", json!(7)), ("total_spend", json!(660)), ("region", json!("emea")), ("sessions", json!(31))]),
        row(&[("user_id", json!(8)), ("total_spend", json!(120)), ("region", json!("amer")), ("sessions", json!(9))]),
    ]
}

fn sales_rows() -> Vec<Map<String, Value>> {
    vec![
        row(&[("order_id", json!("ord-1001")), ("product", json!("Widget Mark II")), ("quantity", json!(3)), ("revenue", json!(10500)), ("region", json!("emea"))]),
        row(&[("order_id", json!("ord-1002")), ("product", json!("Gadget Pro")), ("quantity", json!(1)), ("revenue", json!(4800)), ("region", json!("amer"))]),
        row(&[("order_id", json!("ord-1003")), ("product", json!("Widget Mark II")), ("quantity", json!(7)), ("revenue", json!(24500)), ("region", json!("apac"))]),
        row(&[("order_id", json!("ord-1004")), ("product", json!("Sensor Array")), ("quantity", json!(2)), ("revenue", json!(9000)), ("region", json!("emea"))]),
    ]
}

fn inventory_rows() -> Vec<Map<String, Value>> {
    vec![
        row(&[("sku", json!("sku-widget-2")), ("product", json!("Widget Mark II")), ("stock", json!(120)), ("warehouse", json!("ber-1")), ("unit_price", json!(3500))]),
        row(&[("sku", json!("sku-gadget-p")), ("product", json!("Gadget Pro")), ("stock", json!(0)), ("warehouse", json!("ams-2")), ("unit_price", json!(4800))]),
        row(&[("sku", json!("sku-sensor-a")), ("product", json!("Sensor Array")), ("stock", json!(34)), ("warehouse", json!("ber-1")), ("unit_price", json!(4500))]),
    ]
}

fn telemetry_rows() -> Vec<Map<String, Value>> {
    vec![
        row(&[("device_id", json!("dev-01")), ("metric", json!("temperature")), ("value", json!(21.5)), ("recorded_at", json!("2026-01-10T10:00:00Z"))]),
        row(&[("device_id", json!("dev-01")), ("metric", json!("humidity")), ("value", json!(40.2)), ("recorded_at", json!("2026-01-10T10:00:00Z"))]),
        row(&[("device_id", json!("dev-02")), ("metric", json!("temperature")), ("value", json!(-3.0)), ("recorded_at", json!("2026-01-10T10:05:00Z"))]),
        row(&[("device_id", json!("dev-03")), ("metric", json!("vibration")), ("value", json!(0.7)), ("recorded_at", json!("2026-01-10T10:06:00Z"))]),
    ]
}
