//! Catalog service: seeds the demonstration mesh, registers new resources
//! into the root catalog, and answers type/domain/free-text searches.

pub mod search;
pub mod seed;

pub use search::{SearchParams, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use hyprcat_linkdata::{validate_resource, Node, ValidationReport};
use hyprcat_storage::{ResourceStore, StorageError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Registration payload failed envelope validation.
    #[error("invalid resource: {0:?}")]
    Invalid(Vec<String>),
    /// The root catalog collection is missing from the store.
    #[error("catalog collection not seeded")]
    MissingCatalog,
    /// Store-level failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The catalog service over a shared resource store.
pub struct CatalogService {
    store: Arc<dyn ResourceStore>,
    base_url: String,
}

impl CatalogService {
    pub fn new(store: Arc<dyn ResourceStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    /// Base URL all seeded identifiers hang off.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Id of the root catalog collection.
    pub fn catalog_id(&self) -> String {
        format!("{}/catalog", self.base_url)
    }

    /// Seed the demonstration mesh; idempotent and deterministic.
    pub fn seed(&self) -> Result<usize, CatalogError> {
        let nodes = seed::seed_mesh(&self.base_url);
        let count = nodes.len();
        for node in nodes {
            let id = node.id.clone().expect("seed nodes carry ids");
            self.store.put(&id, node)?;
        }
        info!(resources = count, "seeded catalog mesh");
        Ok(count)
    }

    /// Register a resource document.
    ///
    /// Validates the envelope, stores the resource, and appends a reference
    /// to the root catalog's member list.
    pub fn register(&self, doc: &Value) -> Result<Node, CatalogError> {
        let report: ValidationReport = validate_resource(doc);
        if !report.is_valid() {
            return Err(CatalogError::Invalid(
                report.errors.iter().map(|v| format!("{}: {}", v.code, v.message)).collect(),
            ));
        }
        let node = Node::from_value(doc);
        let id = node.id.clone().expect("validated resource has id");
        self.store.put(&id, node.clone())?;

        let catalog_id = self.catalog_id();
        let mut catalog = self
            .store
            .get(&catalog_id)?
            .ok_or(CatalogError::MissingCatalog)?;
        let mut members = catalog
            .property("member")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let already_listed = members
            .iter()
            .any(|m| m.get("@id").and_then(Value::as_str) == Some(id.as_str()));
        if !already_listed {
            members.push(json!({
                "@id": id,
                "@type": node.types.clone(),
            }));
            let total = members.len();
            catalog.extra.insert("member".to_string(), Value::Array(members));
            catalog.extra.insert("totalItems".to_string(), json!(total));
            self.store.put(&catalog_id, catalog)?;
        }
        info!(%id, "registered resource");
        Ok(node)
    }

    /// Search the mesh; see [`search`] for filter semantics.
    pub fn search(&self, params: &SearchParams) -> Result<Value, CatalogError> {
        search::run(self.store.as_ref(), &self.base_url, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyprcat_storage::MemoryStore;

    fn service() -> CatalogService {
        let service = CatalogService::new(Arc::new(MemoryStore::new()), "https://hyprcat.test");
        service.seed().unwrap();
        service
    }

    #[test]
    fn test_seed_is_idempotent() {
        let svc = service();
        let first = svc.store.list().unwrap();
        svc.seed().unwrap();
        assert_eq!(svc.store.list().unwrap(), first);
    }

    #[test]
    fn test_seed_contains_expected_mesh() {
        let svc = service();
        let catalog = svc.store.get(&svc.catalog_id()).unwrap().unwrap();
        assert!(catalog.is_of_type("hydra:Collection"));
        assert!(catalog.members().len() >= 3);
        let stores = svc.store.find_by_type("schema:Store").unwrap();
        assert_eq!(stores.len(), 1);
        let products = svc.store.find_by_type("czero:DataProduct").unwrap();
        assert_eq!(products.len(), 1);
    }

    #[test]
    fn test_register_requires_id_and_type() {
        let svc = service();
        let err = svc.register(&serde_json::json!({"schema:name": "x"})).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[test]
    fn test_register_appends_to_catalog() {
        let svc = service();
        let before = svc.store.get(&svc.catalog_id()).unwrap().unwrap().members().len();
        svc.register(&serde_json::json!({
            "@id": "https://hyprcat.test/nodes/custom/one",
            "@type": "schema:Dataset",
            "schema:name": "Custom"
        }))
        .unwrap();
        let catalog = svc.store.get(&svc.catalog_id()).unwrap().unwrap();
        assert_eq!(catalog.members().len(), before + 1);
        // Registering twice does not duplicate the reference.
        svc.register(&serde_json::json!({
            "@id": "https://hyprcat.test/nodes/custom/one",
            "@type": "schema:Dataset"
        }))
        .unwrap();
        let catalog = svc.store.get(&svc.catalog_id()).unwrap().unwrap();
        assert_eq!(catalog.members().len(), before + 1);
    }
}
