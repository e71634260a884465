//! Agent runtime: the Observe → Negotiate → Attest loop.
//!
//! An agent fetches a resource, asks its registered strategies which
//! affordance to invoke, satisfies the affordance's governance constraints
//! (auto-paying within its budget), executes, and records a provenance
//! entity/activity pair before advancing to the next unvisited resource.

pub mod runtime;
pub mod strategies;
pub mod strategy;

pub use runtime::{AgentConfig, AgentRuntime, RunReport, RunState};
pub use strategies::{AnalyticsStrategy, RetailStrategy};
pub use strategy::{Decision, Strategy, StrategyContext, WalletSnapshot};

use hyprcat_navigator::FetchError;
use hyprcat_provenance::ProvError;

/// Agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Run invoked from a state other than idle.
    #[error("agent is {0}, expected idle")]
    InvalidState(String),
    /// The starting resource could not be observed.
    #[error("start url unreachable: {0}")]
    StartUnreachable(#[source] FetchError),
    /// Provenance recording failed.
    #[error(transparent)]
    Provenance(#[from] ProvError),
}
