//! Fixed namespace table and context helpers.

use serde_json::{json, Value};

/// Protocol version advertised in the `X-HyprCAT-Version` header.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Canonical context document URL embedded in responses.
pub const CONTEXT_URL: &str = "https://hyprcat.dev/context/v1.jsonld";

/// Well-known discovery path.
pub const WELL_KNOWN_PATH: &str = "/.well-known/hyprcat";

/// Prefix bindings. Order is stable so emitted contexts are deterministic.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("hydra", "https://www.w3.org/ns/hydra/core#"),
    ("schema", "https://schema.org/"),
    ("dcat", "http://www.w3.org/ns/dcat#"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("odrl", "http://www.w3.org/ns/odrl/2/"),
    ("did", "https://www.w3.org/ns/did#"),
    ("cred", "https://www.w3.org/2018/credentials#"),
    ("x402", "https://hyprcat.dev/ns/x402#"),
    ("czero", "https://hyprcat.dev/ns/czero#"),
    ("hyprcat", "https://hyprcat.dev/ns/core#"),
];

/// Expand a prefixed name (`hydra:Collection`) to its full IRI.
///
/// Unknown prefixes and absolute IRIs pass through unchanged.
pub fn expand_iri(name: &str) -> String {
    if name.starts_with("http://") || name.starts_with("https://") || name.starts_with("urn:") {
        return name.to_string();
    }
    if let Some((prefix, local)) = name.split_once(':') {
        for (known, base) in NAMESPACES {
            if *known == prefix {
                return format!("{base}{local}");
            }
        }
    }
    name.to_string()
}

/// Compact a full IRI back to its prefixed form when a binding matches.
pub fn compact_iri(iri: &str) -> String {
    for (prefix, base) in NAMESPACES {
        if let Some(local) = iri.strip_prefix(base) {
            return format!("{prefix}:{local}");
        }
    }
    iri.to_string()
}

/// Inline `@context` object carrying the canonical prefix bindings.
pub fn default_context() -> Value {
    let mut context = serde_json::Map::new();
    context.insert("@vocab".to_string(), json!(expand_iri("hyprcat:")));
    for (prefix, base) in NAMESPACES {
        context.insert((*prefix).to_string(), json!(base));
    }
    Value::Object(context)
}
