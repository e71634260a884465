//! Provenance service: per-agent append-only chains of entities (resource
//! snapshots) and activities (operation records), exportable as linked data.

pub mod chain;
pub mod export;

pub use chain::{ActivityDraft, ChainItem, ProvActivity, ProvChain, ProvEntity};
pub use export::{export_bundle, export_summary};

use hyprcat_storage::JsonDir;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Provenance errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvError {
    /// An activity needs a current entity to reference.
    #[error("chain has no current entity")]
    NoCurrentEntity,
    /// The chain is sealed and rejects appends.
    #[error("chain is sealed")]
    Sealed,
    /// No chain recorded for the agent.
    #[error("no provenance chain for {0}")]
    UnknownAgent(String),
}

/// Chain registry keyed by agent DID.
///
/// Appends within one chain are serialized by the service lock so the
/// current-entity pointer advances deterministically; chains of different
/// agents do not synchronize with each other.
pub struct ProvenanceService {
    chains: Mutex<HashMap<String, Vec<ProvChain>>>,
    persist: Option<JsonDir>,
}

impl ProvenanceService {
    /// In-memory service.
    pub fn new() -> Self {
        Self::with_persistence(None)
    }

    /// Service that mirrors sealed and open chains under `provenance/`.
    pub fn with_persistence(persist: Option<JsonDir>) -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            persist,
        }
    }

    fn commit(&self, chain: &ProvChain) {
        if let Some(persist) = &self.persist {
            if let Ok(doc) = serde_json::to_value(chain) {
                if let Err(err) = persist.write(&chain.id, &doc) {
                    tracing::warn!(chain = %chain.id, error = %err, "provenance persist failed");
                }
            }
        }
    }

    fn with_open_chain<T>(
        &self,
        agent_did: &str,
        f: impl FnOnce(&mut ProvChain) -> Result<T, ProvError>,
    ) -> Result<T, ProvError> {
        let mut chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        let list = chains.entry(agent_did.to_string()).or_default();
        let needs_new = list.last().map(|c| c.sealed).unwrap_or(true);
        if needs_new {
            let chain = ProvChain::start(agent_did);
            debug!(agent = %agent_did, chain = %chain.id, "started provenance chain");
            list.push(chain);
        }
        let chain = list.last_mut().expect("chain just ensured");
        let out = f(chain)?;
        self.commit(chain);
        Ok(out)
    }

    /// Record an observation entity; returns its URN id.
    pub fn record_entity(
        &self,
        agent_did: &str,
        label: &str,
        snapshot: serde_json::Value,
    ) -> Result<String, ProvError> {
        self.with_open_chain(agent_did, |chain| chain.record_entity(label, snapshot))
    }

    /// Record an operation activity; returns its URN id.
    pub fn record_activity(
        &self,
        agent_did: &str,
        draft: ActivityDraft,
    ) -> Result<String, ProvError> {
        self.with_open_chain(agent_did, |chain| chain.record_activity(draft))
    }

    /// Seal the agent's open chain, when one exists.
    pub fn seal(&self, agent_did: &str) -> Result<(), ProvError> {
        let mut chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        let list = chains
            .get_mut(agent_did)
            .ok_or_else(|| ProvError::UnknownAgent(agent_did.to_string()))?;
        let chain = list
            .last_mut()
            .ok_or_else(|| ProvError::UnknownAgent(agent_did.to_string()))?;
        chain.sealed = true;
        self.commit(chain);
        Ok(())
    }

    /// All chains recorded for an agent, ordered by start time ascending.
    pub fn history_of(&self, agent_did: &str) -> Vec<ProvChain> {
        let chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        let mut list = chains.get(agent_did).cloned().unwrap_or_default();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }

    /// Total chains across all agents (stats surface).
    pub fn chain_count(&self) -> usize {
        let chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        chains.values().map(Vec::len).sum()
    }
}

impl Default for ProvenanceService {
    fn default() -> Self {
        Self::new()
    }
}
