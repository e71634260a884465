//! Query planner: maps table references onto simulated backing sources by
//! keyword, falling back to a designated default.

use crate::parser::Query;
use crate::source::SourceDescriptor;

/// Keyword dictionary for source resolution. First match wins.
const SOURCE_KEYWORDS: &[(&str, &str)] = &[
    ("analytics", "analytics"),
    ("metrics", "analytics"),
    ("usage", "analytics"),
    ("sales", "sales"),
    ("orders", "sales"),
    ("revenue", "sales"),
    ("inventory", "inventory"),
    ("stock", "inventory"),
    ("products", "inventory"),
    ("telemetry", "telemetry"),
    ("sensors", "telemetry"),
    ("devices", "telemetry"),
    ("broken", "broken"),
    ("offline", "broken"),
];

/// Source name used when no keyword matches.
pub const DEFAULT_SOURCE: &str = "analytics";

/// An execution plan: the resolved source set, in dispatch order.
#[derive(Clone, Debug)]
pub struct Plan {
    pub sources: Vec<SourceDescriptor>,
}

fn resolve(table: &str, available: &[SourceDescriptor]) -> SourceDescriptor {
    let lowered = table.to_ascii_lowercase();
    let name = SOURCE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, name)| *name)
        .unwrap_or(DEFAULT_SOURCE);
    available
        .iter()
        .find(|s| s.name == name)
        .or_else(|| available.iter().find(|s| s.name == DEFAULT_SOURCE))
        .cloned()
        .unwrap_or_else(|| SourceDescriptor::simulated(name))
}

/// Build a plan for a parsed query against the available sources.
///
/// `JOIN` / `UNION` references add their mapped sources; duplicates are
/// dropped while preserving first-reference order.
pub fn plan(query: &Query, available: &[SourceDescriptor]) -> Plan {
    let mut sources: Vec<SourceDescriptor> = Vec::new();
    let mut push = |descriptor: SourceDescriptor| {
        if !sources.iter().any(|s| s.name == descriptor.name) {
            sources.push(descriptor);
        }
    };
    push(resolve(&query.from, available));
    for table in &query.extra_tables {
        push(resolve(table, available));
    }
    Plan { sources }
}
