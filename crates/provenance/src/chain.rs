//! Chain data model and append rules.

use crate::ProvError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

fn urn() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// A resource snapshot observed by an agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvEntity {
    pub id: String,
    pub label: String,
    /// Resource value at observation time.
    pub snapshot: Value,
    pub timestamp: DateTime<Utc>,
}

/// An executed operation record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvActivity {
    pub id: String,
    pub label: String,
    /// Action vocabulary term, e.g. `schema:BuyAction`.
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall-clock duration of the operation, milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Entity this activity consumed; always an earlier chain item.
    pub used_entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_did: String,
}

/// Builder for an activity append.
#[derive(Clone, Debug, Default)]
pub struct ActivityDraft {
    pub label: String,
    pub action_type: String,
    pub payload: Option<Value>,
    pub strategy: Option<String>,
    pub method: Option<String>,
    pub target_url: Option<String>,
    pub status_code: Option<u16>,
    pub duration_ms: Option<u64>,
}

impl ActivityDraft {
    /// Minimal draft with a label and action type.
    pub fn new(label: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action_type: action_type.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn duration_ms(mut self, millis: u64) -> Self {
        self.duration_ms = Some(millis);
        self
    }

    pub fn strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy = Some(name.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// One chain item.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChainItem {
    Entity(ProvEntity),
    Activity(ProvActivity),
}

/// An append-only provenance chain for a single agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvChain {
    pub id: String,
    pub agent_did: String,
    pub started_at: DateTime<Utc>,
    pub items: Vec<ChainItem>,
    pub sealed: bool,
    /// Id of the entity new activities reference.
    pub current_entity: Option<String>,
}

impl ProvChain {
    /// Open a fresh chain for an agent.
    pub fn start(agent_did: &str) -> Self {
        Self {
            id: urn(),
            agent_did: agent_did.to_string(),
            started_at: Utc::now(),
            items: Vec::new(),
            sealed: false,
            current_entity: None,
        }
    }

    /// Append an observation entity and advance the current-entity pointer.
    pub fn record_entity(&mut self, label: &str, snapshot: Value) -> Result<String, ProvError> {
        if self.sealed {
            return Err(ProvError::Sealed);
        }
        let entity = ProvEntity {
            id: urn(),
            label: label.to_string(),
            snapshot,
            timestamp: Utc::now(),
        };
        let id = entity.id.clone();
        self.current_entity = Some(id.clone());
        self.items.push(ChainItem::Entity(entity));
        Ok(id)
    }

    /// Append an activity consuming the current entity.
    ///
    /// The first item of a chain must be an entity, so an activity append
    /// on an empty chain fails with `NoCurrentEntity`.
    pub fn record_activity(&mut self, draft: ActivityDraft) -> Result<String, ProvError> {
        if self.sealed {
            return Err(ProvError::Sealed);
        }
        let used = self
            .current_entity
            .clone()
            .ok_or(ProvError::NoCurrentEntity)?;
        let activity = ProvActivity {
            id: urn(),
            label: draft.label,
            action_type: draft.action_type,
            payload: draft.payload,
            strategy: draft.strategy,
            method: draft.method,
            target_url: draft.target_url,
            status_code: draft.status_code,
            duration_ms: draft.duration_ms,
            used_entity_id: used,
            timestamp: Utc::now(),
            agent_did: self.agent_did.clone(),
        };
        let id = activity.id.clone();
        self.items.push(ChainItem::Activity(activity));
        Ok(id)
    }

    /// Timestamp of an item, for ordering checks.
    pub fn item_timestamp(item: &ChainItem) -> DateTime<Utc> {
        match item {
            ChainItem::Entity(e) => e.timestamp,
            ChainItem::Activity(a) => a.timestamp,
        }
    }
}
