//! Structural single-pass validation.
//!
//! No RDF expansion, reasoning, or schema inference; documents are checked
//! as labeled JSON trees against the envelope rules and SHACL-lite shapes.

use crate::operation::{Operation, ALLOWED_METHODS};
use crate::shape::PropertyShape;
use serde_json::Value;

/// One validation finding with a stable machine code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Machine code, e.g. `MISSING_REQUIRED_PROPERTY`.
    pub code: &'static str,
    /// Property path or attribute the finding refers to.
    pub path: String,
    /// Human-readable detail.
    pub message: String,
}

impl Violation {
    fn new(code: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validation outcome: hard errors and advisory warnings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl ValidationReport {
    /// True when no hard errors were recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Paths of all hard errors, for 422 bodies.
    pub fn error_paths(&self) -> Vec<String> {
        self.errors.iter().map(|v| v.path.clone()).collect()
    }
}

fn lookup<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = doc.as_object()?;
    keys.iter().find_map(|k| obj.get(*k))
}

/// Validate the resource envelope.
///
/// Fails with `MISSING_ID` / `MISSING_TYPE` / `INVALID_IRI`; a missing
/// `@context` is only a warning since context can be inherited.
pub fn validate_resource(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    match lookup(doc, &["@id", "id"]) {
        None => report.errors.push(Violation::new(
            "MISSING_ID",
            "@id",
            "resource has no identifier",
        )),
        Some(Value::String(_)) => {}
        Some(_) => report.errors.push(Violation::new(
            "INVALID_IRI",
            "@id",
            "resource identifier must be a string",
        )),
    }
    let has_type = lookup(doc, &["@type", "type"])
        .map(|v| match v {
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => items.iter().any(|i| i.as_str().is_some()),
            _ => false,
        })
        .unwrap_or(false);
    if !has_type {
        report.errors.push(Violation::new(
            "MISSING_TYPE",
            "@type",
            "resource declares no primary type",
        ));
    }
    if lookup(doc, &["@context"]).is_none() {
        report.warnings.push(Violation::new(
            "MISSING_CONTEXT",
            "@context",
            "no @context; context is assumed inherited",
        ));
    }
    if let Some(ops) = lookup(doc, &["operation", "hydra:operation"]) {
        let items: Vec<&Value> = match ops {
            Value::Array(list) => list.iter().collect(),
            other => vec![other],
        };
        for (idx, item) in items.iter().enumerate() {
            let nested = validate_operation(item);
            for mut err in nested.errors {
                err.path = format!("operation[{idx}].{}", err.path);
                report.errors.push(err);
            }
        }
    }
    report
}

/// Validate an operation object: method in the allowed HTTP set and a
/// non-empty title.
pub fn validate_operation(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    match Operation::from_value(doc, None) {
        None => report.errors.push(Violation::new(
            "MISSING_REQUIRED_PROPERTY",
            "method",
            "operation has no method",
        )),
        Some(op) => {
            if !op.method_allowed() {
                report.errors.push(Violation::new(
                    "INVALID_PROPERTY_TYPE",
                    "method",
                    format!(
                        "method {} not in {}",
                        op.method,
                        ALLOWED_METHODS.join("/")
                    ),
                ));
            }
            if op.title.as_deref().map(str::is_empty).unwrap_or(true) {
                report.errors.push(Violation::new(
                    "MISSING_REQUIRED_PROPERTY",
                    "title",
                    "operation has no title",
                ));
            }
        }
    }
    report
}

/// Validate an input payload against a list of property shapes.
///
/// A missing optional property short-circuits the rest of its checks.
pub fn validate_input(payload: &Value, shapes: &[PropertyShape]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let empty = serde_json::Map::new();
    let obj = payload.as_object().unwrap_or(&empty);
    for shape in shapes {
        let value = obj.get(&shape.property);
        let Some(value) = value else {
            if shape.required {
                report.errors.push(Violation::new(
                    "MISSING_REQUIRED_PROPERTY",
                    &shape.property,
                    format!("required property {} absent", shape.property),
                ));
            }
            continue;
        };
        if let Some(datatype) = shape.datatype {
            if !datatype.accepts(value) {
                report.errors.push(Violation::new(
                    "INVALID_PROPERTY_TYPE",
                    &shape.property,
                    format!("{} does not match declared datatype", shape.property),
                ));
                continue;
            }
        }
        check_shacl(shape, value, &mut report);
    }
    report
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_shacl(shape: &PropertyShape, value: &Value, report: &mut ValidationReport) {
    let mut violation = |message: String| {
        report
            .errors
            .push(Violation::new("SHACL_VIOLATION", &shape.property, message));
    };
    if let Some(text) = value.as_str() {
        if let Some(min) = shape.min_length {
            if text.chars().count() < min {
                violation(format!("{} shorter than minLength {min}", shape.property));
            }
        }
        if let Some(max) = shape.max_length {
            if text.chars().count() > max {
                violation(format!("{} longer than maxLength {max}", shape.property));
            }
        }
        if let Some(pattern) = &shape.pattern {
            if !PropertyShape::pattern_matches(pattern, text) {
                violation(format!("{} does not match pattern", shape.property));
            }
        }
    }
    if let Some(number) = value_as_number(value) {
        if let Some(min) = shape.min_inclusive {
            if number < min {
                violation(format!("{} below minInclusive {min}", shape.property));
            }
        }
        if let Some(max) = shape.max_inclusive {
            if number > max {
                violation(format!("{} above maxInclusive {max}", shape.property));
            }
        }
    }
    if !shape.one_of.is_empty() && !shape.one_of.contains(value) {
        violation(format!("{} not in the allowed value set", shape.property));
    }
}
