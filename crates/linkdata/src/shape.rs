//! Property shapes: the SHACL-lite constraint vocabulary for operation inputs.

use serde_json::Value;

/// Expected datatype of a property value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Uri,
}

impl Datatype {
    /// Parse the document spelling (`"string"`, `"xsd:integer"`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        let local = name.rsplit(':').next().unwrap_or(name);
        match local.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "decimal" | "double" | "float" => Some(Self::Decimal),
            "boolean" | "bool" => Some(Self::Boolean),
            "datetime" | "date" => Some(Self::Datetime),
            "uri" | "anyuri" => Some(Self::Uri),
            _ => None,
        }
    }

    /// Structural check of a JSON value against this datatype.
    ///
    /// Numeric strings are accepted for the numeric datatypes since wire
    /// payloads routinely quote numbers.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => match value {
                Value::Number(n) => n.is_i64() || n.is_u64(),
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            Self::Decimal => match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            },
            Self::Boolean => value.is_boolean(),
            Self::Datetime => value
                .as_str()
                .map(|s| s.len() >= 10 && s.as_bytes()[4] == b'-')
                .unwrap_or(false),
            Self::Uri => value
                .as_str()
                .map(|s| s.contains(':') && !s.contains(' '))
                .unwrap_or(false),
        }
    }
}

/// One property shape inside an operation's `expects` list.
///
/// Only `property` is mandatory; everything else narrows the accepted values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyShape {
    pub property: String,
    pub required: bool,
    pub datatype: Option<Datatype>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<f64>,
    pub max_inclusive: Option<f64>,
    /// Substring pattern; a leading `^` / trailing `$` anchor to the ends.
    pub pattern: Option<String>,
    /// Closed value set (`sh:in`).
    pub one_of: Vec<Value>,
}

impl PropertyShape {
    /// Parse a single shape object; `None` when `property` is absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let property = obj
            .get("property")
            .or_else(|| obj.get("hydra:property"))
            .or_else(|| obj.get("sh:path"))?
            .as_str()?
            .to_string();
        Some(Self {
            property,
            required: obj
                .get("required")
                .or_else(|| obj.get("hydra:required"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            datatype: obj
                .get("datatype")
                .or_else(|| obj.get("sh:datatype"))
                .and_then(Value::as_str)
                .and_then(Datatype::parse),
            min_length: obj.get("minLength").and_then(Value::as_u64).map(|n| n as usize),
            max_length: obj.get("maxLength").and_then(Value::as_u64).map(|n| n as usize),
            min_inclusive: obj.get("minInclusive").and_then(Value::as_f64),
            max_inclusive: obj.get("maxInclusive").and_then(Value::as_f64),
            pattern: obj.get("pattern").and_then(Value::as_str).map(str::to_string),
            one_of: obj
                .get("in")
                .or_else(|| obj.get("sh:in"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }

    /// Parse an `expects` attribute (single object or list) into shapes.
    pub fn from_expects(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().filter_map(Self::from_value).collect(),
            Value::Object(_) => Self::from_value(value).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Match `pattern` against a candidate, with `^`/`$` anchors and a bare
    /// substring match otherwise. No regex engine behind this.
    pub fn pattern_matches(pattern: &str, candidate: &str) -> bool {
        let anchored_start = pattern.starts_with('^');
        let anchored_end = pattern.ends_with('$');
        let core = pattern
            .trim_start_matches('^')
            .trim_end_matches('$');
        match (anchored_start, anchored_end) {
            (true, true) => candidate == core,
            (true, false) => candidate.starts_with(core),
            (false, true) => candidate.ends_with(core),
            (false, false) => candidate.contains(core),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datatype_parse_spellings() {
        assert_eq!(Datatype::parse("string"), Some(Datatype::String));
        assert_eq!(Datatype::parse("xsd:integer"), Some(Datatype::Integer));
        assert_eq!(Datatype::parse("anyURI"), Some(Datatype::Uri));
        assert_eq!(Datatype::parse("blob"), None);
    }

    #[test]
    fn test_integer_accepts_numeric_strings() {
        assert!(Datatype::Integer.accepts(&json!(7)));
        assert!(Datatype::Integer.accepts(&json!("42")));
        assert!(!Datatype::Integer.accepts(&json!("4.2")));
    }

    #[test]
    fn test_shape_requires_property() {
        assert!(PropertyShape::from_value(&json!({"required": true})).is_none());
        let shape = PropertyShape::from_value(&json!({
            "property": "schema:price",
            "required": true,
            "minInclusive": 0
        }))
        .unwrap();
        assert_eq!(shape.property, "schema:price");
        assert_eq!(shape.min_inclusive, Some(0.0));
    }

    #[test]
    fn test_pattern_anchoring() {
        assert!(PropertyShape::pattern_matches("^did:", "did:web:h"));
        assert!(!PropertyShape::pattern_matches("^did:", "urn:did:x"));
        assert!(PropertyShape::pattern_matches(".jsonld$", "ctx.jsonld"));
        assert!(PropertyShape::pattern_matches("spend", "total_spend"));
    }
}
