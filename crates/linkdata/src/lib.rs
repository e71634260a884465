//! Linked-data core: node envelope, affordance views, SHACL-lite validation.
//!
//! Resources are JSON-LD documents treated as labeled JSON trees. The common
//! envelope (`id`, `types`, everything else in `extra`) is wrapped by typed
//! accessors instead of an inheritance hierarchy, so every subsystem works
//! against the same small surface.

pub mod ident;
pub mod node;
pub mod operation;
pub mod shape;
pub mod validate;
pub mod vocab;

pub use ident::IdKind;
pub use node::Node;
pub use operation::Operation;
pub use shape::{Datatype, PropertyShape};
pub use validate::{
    validate_input, validate_operation, validate_resource, ValidationReport, Violation,
};
pub use vocab::{compact_iri, default_context, expand_iri, CONTEXT_URL, PROTOCOL_VERSION};
