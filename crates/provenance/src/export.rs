//! Chain export encodings: a linked-data bundle and a flat summary listing.

use crate::chain::{ChainItem, ProvChain};
use hyprcat_linkdata::default_context;
use serde_json::{json, Value};

/// Export a chain as a JSON-LD bundle document.
///
/// Members are typed `prov:Entity` / `prov:Activity` nodes carrying their
/// salient attributes; activities reference their consumed entity through
/// `prov:used`.
pub fn export_bundle(chain: &ProvChain) -> Value {
    let members: Vec<Value> = chain
        .items
        .iter()
        .map(|item| match item {
            ChainItem::Entity(entity) => json!({
                "@id": entity.id,
                "@type": "prov:Entity",
                "rdfs:label": entity.label,
                "prov:generatedAtTime": entity.timestamp.to_rfc3339(),
                "hyprcat:snapshot": entity.snapshot,
            }),
            ChainItem::Activity(activity) => {
                let mut doc = json!({
                    "@id": activity.id,
                    "@type": "prov:Activity",
                    "rdfs:label": activity.label,
                    "hyprcat:actionType": activity.action_type,
                    "prov:used": activity.used_entity_id,
                    "prov:startedAtTime": activity.timestamp.to_rfc3339(),
                    "prov:wasAssociatedWith": activity.agent_did,
                });
                let obj = doc.as_object_mut().expect("object literal");
                if let Some(strategy) = &activity.strategy {
                    obj.insert("hyprcat:strategy".to_string(), json!(strategy));
                }
                if let Some(method) = &activity.method {
                    obj.insert("hyprcat:method".to_string(), json!(method));
                }
                if let Some(target) = &activity.target_url {
                    obj.insert("hyprcat:targetUrl".to_string(), json!(target));
                }
                if let Some(status) = activity.status_code {
                    obj.insert("hyprcat:statusCode".to_string(), json!(status));
                }
                if let Some(duration) = activity.duration_ms {
                    obj.insert("hyprcat:duration".to_string(), json!(format!("{duration}ms")));
                }
                doc
            }
        })
        .collect();
    json!({
        "@context": default_context(),
        "@id": chain.id,
        "@type": "prov:Bundle",
        "prov:wasAttributedTo": chain.agent_did,
        "prov:generatedAtTime": chain.started_at.to_rfc3339(),
        "hyprcat:sealed": chain.sealed,
        "member": members,
        "totalItems": chain.items.len(),
    })
}

/// Export a chain as a flat summary listing, one line item per chain entry.
pub fn export_summary(chain: &ProvChain) -> Value {
    let items: Vec<Value> = chain
        .items
        .iter()
        .map(|item| match item {
            ChainItem::Entity(entity) => json!({
                "kind": "entity",
                "id": entity.id,
                "label": entity.label,
                "timestamp": entity.timestamp.to_rfc3339(),
            }),
            ChainItem::Activity(activity) => json!({
                "kind": "activity",
                "id": activity.id,
                "label": activity.label,
                "actionType": activity.action_type,
                "targetUrl": activity.target_url,
                "statusCode": activity.status_code,
                "timestamp": activity.timestamp.to_rfc3339(),
            }),
        })
        .collect();
    json!({
        "id": chain.id,
        "agent": chain.agent_did,
        "startedAt": chain.started_at.to_rfc3339(),
        "sealed": chain.sealed,
        "items": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ActivityDraft;
    use serde_json::json;

    fn sample_chain() -> ProvChain {
        let mut chain = ProvChain::start("did:web:a");
        chain
            .record_entity("catalog", json!({"@id": "https://h/catalog"}))
            .unwrap();
        chain
            .record_activity(
                ActivityDraft::new("buy widget", "schema:BuyAction")
                    .method("POST")
                    .target_url("https://h/operations/checkout")
                    .status_code(201)
                    .duration_ms(12),
            )
            .unwrap();
        chain
    }

    #[test]
    fn test_bundle_shape() {
        let chain = sample_chain();
        let bundle = export_bundle(&chain);
        assert_eq!(bundle["@type"], "prov:Bundle");
        assert_eq!(bundle["prov:wasAttributedTo"], "did:web:a");
        assert_eq!(bundle["totalItems"], 2);
        let members = bundle["member"].as_array().unwrap();
        assert_eq!(members[0]["@type"], "prov:Entity");
        assert_eq!(members[1]["@type"], "prov:Activity");
        assert_eq!(members[1]["prov:used"], members[0]["@id"]);
        assert_eq!(members[1]["hyprcat:duration"], "12ms");
    }

    #[test]
    fn test_summary_shape() {
        let chain = sample_chain();
        let summary = export_summary(&chain);
        let items = summary["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["kind"], "entity");
        assert_eq!(items[1]["statusCode"], 201);
    }
}
