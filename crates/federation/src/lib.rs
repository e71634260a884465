//! Federation engine.
//!
//! One declarative query (a strict SQL subset) fans out to simulated
//! backing sources; each source filters, sorts, and projects its own rows,
//! and the merger stitches the results back together with per-row source
//! provenance. Real backends would slot in behind the same dispatch
//! interface.

pub mod engine;
pub mod parser;
pub mod planner;
pub mod source;

pub use engine::{FederationEngine, ResultSet};
pub use parser::{parse, CmpOp, Literal, OrderBy, Predicate, Query};
pub use planner::{plan, Plan};
pub use source::{MockSource, SourceDescriptor};

/// Default row limit when a query declares none.
pub const DEFAULT_LIMIT: usize = 100;

/// Hard cap on any query's row limit.
pub const MAX_LIMIT: usize = 10_000;

/// Federation errors.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// Query text is outside the supported subset.
    #[error("query parse error: {0}")]
    Parse(String),
    /// A planned source failed during dispatch.
    #[error("federation source failed: {endpoint}")]
    SourceFailure { endpoint: String },
    /// The fan-out exceeded its overall deadline.
    #[error("federation deadline exceeded")]
    Timeout,
}
