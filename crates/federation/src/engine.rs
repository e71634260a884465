//! Dispatcher and merger: fan a parsed query out to every planned source
//! and stitch the results back in plan order.

use crate::parser::{parse, Query};
use crate::planner::plan;
use crate::source::MockSource;
use crate::FederationError;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Merged federation result.
#[derive(Clone, Debug)]
pub struct ResultSet {
    /// Rows in plan order, each carrying its `provenance` stamp.
    pub items: Vec<Map<String, Value>>,
    pub total_results: usize,
    /// Dialect tag for the result envelope.
    pub query_language: String,
    /// Overall wall-clock time, `"<digits>ms"`.
    pub execution_time: String,
    /// Endpoints actually dispatched, in plan order.
    pub sources: Vec<String>,
    /// Provenance activity the result was generated by; set by the caller.
    pub was_generated_by: Option<String>,
}

/// The federation engine: a source registry plus a fan-out deadline.
pub struct FederationEngine {
    sources: Vec<Arc<MockSource>>,
    deadline: Duration,
}

impl FederationEngine {
    /// Engine over the standard simulated source set.
    pub fn new() -> Self {
        Self::with_sources(MockSource::standard_set(), Duration::from_secs(30))
    }

    /// Engine over an explicit source set, for tests and embedding.
    pub fn with_sources(sources: Vec<MockSource>, deadline: Duration) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            deadline,
        }
    }

    /// Parse only; surfaced separately so callers can 422 on bad input
    /// before paying for dispatch.
    pub fn parse_query(&self, text: &str) -> Result<Query, FederationError> {
        parse(text)
    }

    /// Execute a query end to end.
    ///
    /// Each planned source runs in its own task and sorts its own rows when
    /// `ORDER BY` is present; the merger concatenates per-source results in
    /// plan order without re-sorting across sources, then applies the
    /// overall limit. A single source failure fails the whole query unless
    /// tolerant mode is requested.
    pub async fn execute(&self, text: &str) -> Result<ResultSet, FederationError> {
        self.execute_with_tolerance(text, false).await
    }

    /// Execute, optionally tolerating individual source failures (failed
    /// sources are dropped from the merge).
    pub async fn execute_with_tolerance(
        &self,
        text: &str,
        tolerant: bool,
    ) -> Result<ResultSet, FederationError> {
        let started = Instant::now();
        let query = parse(text)?;
        let descriptors: Vec<_> = self.sources.iter().map(|s| s.descriptor.clone()).collect();
        let plan = plan(&query, &descriptors);
        debug!(from = %query.from, sources = plan.sources.len(), "dispatching federated query");

        let (tx, mut rx) = mpsc::channel(plan.sources.len().max(1));
        for (position, descriptor) in plan.sources.iter().enumerate() {
            let source = self
                .sources
                .iter()
                .find(|s| s.descriptor.name == descriptor.name)
                .cloned();
            let tx = tx.clone();
            let query = query.clone();
            let endpoint = descriptor.endpoint.clone();
            tokio::spawn(async move {
                let outcome = match source {
                    Some(source) if !source.failing => Ok(source.execute(&query)),
                    _ => Err(endpoint),
                };
                // Receiver dropping means the overall deadline fired.
                let _ = tx.send((position, outcome)).await;
            });
        }
        drop(tx);

        let mut collected: Vec<Option<Vec<Map<String, Value>>>> =
            vec![None; plan.sources.len()];
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        let mut remaining = plan.sources.len();
        while remaining > 0 {
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some((position, Ok(rows))) => {
                            collected[position] = Some(rows);
                            remaining -= 1;
                        }
                        Some((position, Err(endpoint))) => {
                            if tolerant {
                                warn!(%endpoint, "tolerated source failure");
                                collected[position] = Some(Vec::new());
                                remaining -= 1;
                            } else {
                                return Err(FederationError::SourceFailure { endpoint });
                            }
                        }
                        None => break,
                    }
                }
                _ = &mut deadline => return Err(FederationError::Timeout),
            }
        }

        // Merge preserves per-source contiguity in plan order.
        let mut items: Vec<Map<String, Value>> = Vec::new();
        for rows in collected.into_iter().flatten() {
            items.extend(rows);
        }
        items.truncate(query.limit);

        let elapsed = started.elapsed().as_millis() as u64;
        Ok(ResultSet {
            total_results: items.len(),
            items,
            query_language: "hyprcat-sql".to_string(),
            execution_time: format!("{elapsed}ms"),
            sources: plan.sources.iter().map(|s| s.endpoint.clone()).collect(),
            was_generated_by: None,
        })
    }
}

impl Default for FederationEngine {
    fn default() -> Self {
        Self::new()
    }
}
