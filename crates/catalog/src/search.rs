//! Catalog search: filtering, deterministic ordering, clamped pagination.

use crate::CatalogError;
use hyprcat_linkdata::{default_context, Node};
use hyprcat_storage::ResourceStore;
use serde_json::{json, Value};

/// Default page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper clamp for `pageSize`.
pub const MAX_PAGE_SIZE: usize = 50;

/// Search filters and pagination, straight from the query string.
#[derive(Clone, Debug, Default)]
pub struct SearchParams {
    /// Case-insensitive substring against title and description.
    pub query: Option<String>,
    /// Matches any declared type.
    pub r#type: Option<String>,
    /// Exact match on the `schema:domain` property.
    pub domain: Option<String>,
    /// 1-based page number; values below 1 clamp to 1.
    pub page: i64,
    /// Page size; clamped into `1..=MAX_PAGE_SIZE`.
    pub page_size: i64,
}

impl SearchParams {
    fn clamped(&self) -> (usize, usize) {
        let page = self.page.max(1) as usize;
        let size = if self.page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            (self.page_size as usize).min(MAX_PAGE_SIZE)
        };
        (page, size)
    }
}

fn matches(node: &Node, params: &SearchParams) -> bool {
    if let Some(ty) = &params.r#type {
        if !node.is_of_type(ty) {
            return false;
        }
    }
    if let Some(domain) = &params.domain {
        if node.str_property("schema:domain") != Some(domain.as_str()) {
            return false;
        }
    }
    if let Some(query) = &params.query {
        let needle = query.to_lowercase();
        let title_hit = node
            .title()
            .map(|t| t.to_lowercase().contains(&needle))
            .unwrap_or(false);
        let desc_hit = node
            .description()
            .map(|d| d.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if !title_hit && !desc_hit {
            return false;
        }
    }
    true
}

fn page_url(base: &str, params: &SearchParams, page: usize, size: usize) -> String {
    let mut url = format!("{base}/catalog?page={page}&pageSize={size}");
    if let Some(q) = &params.query {
        url.push_str(&format!("&q={}", urlencoding::encode(q)));
    }
    if let Some(ty) = &params.r#type {
        url.push_str(&format!("&type={}", urlencoding::encode(ty)));
    }
    if let Some(domain) = &params.domain {
        url.push_str(&format!("&domain={}", urlencoding::encode(domain)));
    }
    url
}

/// Run a search over everything in the store.
///
/// Results are ordered by ascending id so pagination is deterministic.
pub fn run(
    store: &dyn ResourceStore,
    base_url: &str,
    params: &SearchParams,
) -> Result<Value, CatalogError> {
    let (page, size) = params.clamped();
    let mut hits: Vec<Node> = Vec::new();
    for id in store.list()? {
        if let Some(node) = store.get(&id)? {
            if matches(&node, params) {
                hits.push(node);
            }
        }
    }
    hits.sort_by(|a, b| a.id.cmp(&b.id));

    let total = hits.len();
    let start = (page - 1).saturating_mul(size);
    let members: Vec<Value> = hits
        .iter()
        .skip(start)
        .take(size)
        .map(Node::to_value)
        .collect();
    let has_next = start + members.len() < total;

    let mut view = serde_json::Map::new();
    view.insert("@id".to_string(), json!(page_url(base_url, params, page, size)));
    view.insert("@type".to_string(), json!("hydra:PartialCollectionView"));
    view.insert(
        "first".to_string(),
        json!(page_url(base_url, params, 1, size)),
    );
    if page > 1 {
        view.insert(
            "previous".to_string(),
            json!(page_url(base_url, params, page - 1, size)),
        );
    }
    if has_next {
        view.insert(
            "next".to_string(),
            json!(page_url(base_url, params, page + 1, size)),
        );
    }

    Ok(json!({
        "@context": default_context(),
        "@id": format!("{base_url}/catalog"),
        "@type": ["hydra:Collection", "dcat:Catalog"],
        "totalItems": total,
        "member": members,
        "view": Value::Object(view),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogService;
    use hyprcat_storage::MemoryStore;
    use std::sync::Arc;

    fn seeded() -> CatalogService {
        let svc = CatalogService::new(Arc::new(MemoryStore::new()), "https://hyprcat.test");
        svc.seed().unwrap();
        svc
    }

    #[test]
    fn test_type_filter() {
        let svc = seeded();
        let result = svc
            .search(&SearchParams {
                r#type: Some("schema:Store".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result["totalItems"], 1);
        assert_eq!(result["member"][0]["schema:name"], "HyprMart");
    }

    #[test]
    fn test_free_text_is_case_insensitive() {
        let svc = seeded();
        let result = svc
            .search(&SearchParams {
                query: Some("MARKET".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(result["totalItems"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn test_domain_filter_is_exact() {
        let svc = seeded();
        let result = svc
            .search(&SearchParams {
                domain: Some("retail".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result["totalItems"], 1);
        let none = svc
            .search(&SearchParams {
                domain: Some("ret".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(none["totalItems"], 0);
    }

    #[test]
    fn test_pagination_clamps_and_links() {
        let svc = seeded();
        let result = svc
            .search(&SearchParams {
                page: -3,
                page_size: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result["member"].as_array().unwrap().len(), 2);
        let view = &result["view"];
        assert!(view["first"].as_str().unwrap().contains("page=1"));
        assert!(view["next"].as_str().unwrap().contains("page=2"));
        assert!(view.get("previous").is_none());

        let second = svc
            .search(&SearchParams {
                page: 2,
                page_size: 2,
                ..Default::default()
            })
            .unwrap();
        assert!(second["view"]["previous"].as_str().unwrap().contains("page=1"));
    }

    #[test]
    fn test_page_size_clamped_to_max() {
        let svc = seeded();
        let result = svc
            .search(&SearchParams {
                page_size: 10_000,
                ..Default::default()
            })
            .unwrap();
        assert!(result["view"]["first"]
            .as_str()
            .unwrap()
            .contains(&format!("pageSize={MAX_PAGE_SIZE}")));
    }

    #[test]
    fn test_ordering_is_ascending_by_id() {
        let svc = seeded();
        let result = svc.search(&SearchParams::default()).unwrap();
        let ids: Vec<&str> = result["member"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["@id"].as_str().unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
