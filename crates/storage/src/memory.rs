//! In-process resource store.

use crate::{ResourceStore, StoreResult};
use hyprcat_linkdata::Node;
use std::collections::HashMap;
use std::sync::RwLock;

/// Memory-backed store. Whole values are swapped under the write lock so
/// concurrent readers never observe a torn resource.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Node>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Node>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Node>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResourceStore for MemoryStore {
    fn get(&self, id: &str) -> StoreResult<Option<Node>> {
        Ok(self.read().get(id).cloned())
    }

    fn put(&self, id: &str, node: Node) -> StoreResult<()> {
        self.write().insert(id.to_string(), node);
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.write().remove(id).is_some())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn find_by_type(&self, ty: &str) -> StoreResult<Vec<Node>> {
        let mut found: Vec<Node> = self
            .read()
            .values()
            .filter(|node| node.is_of_type(ty))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}
