//! The deterministic demonstration mesh.

use hyprcat_linkdata::vocab::WELL_KNOWN_PATH;
use hyprcat_linkdata::Node;
use serde_json::json;

fn buy_operation(base: &str, price: u64) -> serde_json::Value {
    json!({
        "method": "POST",
        "title": "Buy this product",
        "target": format!("{base}/operations/checkout"),
        "returns": "schema:Order",
        "expects": [
            {"property": "schema:price", "required": true, "datatype": "integer", "minInclusive": 0},
            {"property": "schema:itemOffered", "required": false, "datatype": "uri"}
        ],
        "constraint": {
            "@type": "x402:PaymentConstraint",
            "x402:amount": price,
            "x402:currency": "SAT",
            "x402:recipient": "did:web:hyprmart.example"
        }
    })
}

fn product(base: &str, slug: &str, name: &str, price: u64, stock: u64) -> serde_json::Value {
    json!({
        "@id": format!("{base}/nodes/product/{slug}"),
        "@type": "schema:Product",
        "schema:name": name,
        "schema:price": price,
        "schema:priceCurrency": "SAT",
        "schema:inventoryLevel": stock,
        "operation": buy_operation(base, price)
    })
}

const PRODUCTS: &[(&str, &str, u64, u64)] = &[
    ("widget-mark-ii", "Widget Mark II", 3_500, 120),
    ("gadget-pro", "Gadget Pro", 4_800, 0),
    ("sensor-array", "Sensor Array", 9_800, 12),
];

/// Build the full seed mesh for a base URL. Deterministic: identical input
/// yields identical documents.
pub fn seed_mesh(base: &str) -> Vec<Node> {
    let catalog_id = format!("{base}/catalog");
    let store_id = format!("{base}/nodes/store/hyprmart");
    let dataproduct_id = format!("{base}/nodes/dataproduct/market-pulse");
    let lrs_id = format!("{base}/nodes/lrs/agent-learning");
    let prompts_id = format!("{base}/prompts");

    let service_description = Node::from_value(&json!({
        "@id": format!("{base}{WELL_KNOWN_PATH}"),
        "@type": ["hydra:ApiDocumentation", "hyprcat:ServiceDescription"],
        "schema:name": "HyprCAT gateway",
        "schema:description": "Hypermedia data-marketplace gateway",
        "hydra:entrypoint": catalog_id,
    }));

    let root = Node::from_value(&json!({
        "@id": format!("{base}/"),
        "@type": "hyprcat:EntryPoint",
        "schema:name": "HyprCAT root",
        "hyprcat:catalog": catalog_id,
        "hyprcat:prompts": prompts_id,
    }));

    let catalog = Node::from_value(&json!({
        "@id": catalog_id,
        "@type": ["hydra:Collection", "dcat:Catalog"],
        "schema:name": "HyprCAT catalog",
        "schema:description": "Entry resources of the mesh",
        "member": [
            {"@id": store_id, "@type": ["schema:Store", "hydra:Resource"]},
            {"@id": dataproduct_id, "@type": ["dcat:Dataset", "czero:DataProduct"]},
            {"@id": lrs_id, "@type": "hyprcat:LearningRecordStore"},
        ],
        "totalItems": 3,
    }));

    let product_docs: Vec<serde_json::Value> = PRODUCTS
        .iter()
        .map(|(slug, name, price, stock)| product(base, slug, name, *price, *stock))
        .collect();

    let retail_store = Node::from_value(&json!({
        "@id": store_id,
        "@type": ["schema:Store", "hydra:Resource"],
        "schema:name": "HyprMart",
        "schema:description": "Demonstration retail store with paid affordances",
        "schema:domain": "retail",
        "member": product_docs,
        "totalItems": 3,
    }));

    let data_product = Node::from_value(&json!({
        "@id": dataproduct_id,
        "@type": ["dcat:Dataset", "czero:DataProduct", "hyprcat:VirtualGraph"],
        "schema:name": "Market Pulse",
        "schema:description": "Virtual graph over the simulated analytics, sales, inventory and telemetry sources",
        "schema:domain": "analytics",
        "czero:sources": [
            "https://sources.hyprcat.dev/analytics",
            "https://sources.hyprcat.dev/sales",
            "https://sources.hyprcat.dev/inventory",
            "https://sources.hyprcat.dev/telemetry",
        ],
        "operation": [{
            "method": "POST",
            "title": "Run a federated query",
            "target": format!("{base}/operations/query"),
            "returns": "czero:ResultSet",
            "expects": [
                {"property": "schema:query", "required": true, "datatype": "string", "minLength": 1}
            ]
        }]
    }));

    let learning_records = Node::from_value(&json!({
        "@id": lrs_id,
        "@type": ["hyprcat:LearningRecordStore", "hydra:Resource"],
        "schema:name": "Agent learning records",
        "schema:description": "Provenance chains recorded by visiting agents",
        "operation": [{
            "method": "GET",
            "title": "Export learning records",
            "target": format!("{base}/operations/lrs/export"),
            "returns": "prov:Bundle"
        }]
    }));

    let prompts = Node::from_value(&json!({
        "@id": prompts_id,
        "@type": "hydra:Collection",
        "schema:name": "Agent prompts",
        "member": [
            {
                "@id": format!("{base}/prompts/observe"),
                "@type": "hyprcat:Prompt",
                "schema:name": "Observe",
                "schema:text": "Fetch the resource and record what you saw before acting."
            },
            {
                "@id": format!("{base}/prompts/negotiate"),
                "@type": "hyprcat:Prompt",
                "schema:name": "Negotiate",
                "schema:text": "Weigh every affordance and satisfy its constraints before committing."
            },
            {
                "@id": format!("{base}/prompts/attest"),
                "@type": "hyprcat:Prompt",
                "schema:name": "Attest",
                "schema:text": "Record a signed activity for every action you execute."
            }
        ],
        "totalItems": 3,
    }));

    let mut nodes = vec![
        service_description,
        root,
        catalog,
        retail_store,
        data_product,
        learning_records,
        prompts,
    ];
    // Products are also addressable on their own, so affordance shapes can
    // be resolved from an item reference.
    nodes.extend(
        PRODUCTS
            .iter()
            .map(|(slug, name, price, stock)| {
                Node::from_value(&product(base, slug, name, *price, *stock))
            }),
    );
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_deterministic() {
        let a: Vec<_> = seed_mesh("https://h").iter().map(Node::to_value).collect();
        let b: Vec<_> = seed_mesh("https://h").iter().map(Node::to_value).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_service_description_points_at_catalog() {
        let mesh = seed_mesh("https://h");
        let sd = &mesh[0];
        assert_eq!(
            sd.str_property("hydra:entrypoint"),
            Some("https://h/catalog")
        );
    }

    #[test]
    fn test_store_products_carry_payment_constraints() {
        let mesh = seed_mesh("https://h");
        let store = mesh
            .iter()
            .find(|n| n.is_of_type("schema:Store"))
            .unwrap();
        let products = store.members();
        assert_eq!(products.len(), 3);
        for p in &products {
            let ops = p.operations();
            assert!(!ops.is_empty());
            let buy = &ops[0];
            assert_eq!(buy.method, "POST");
            assert!(buy.constraint.is_some());
        }
    }

    #[test]
    fn test_affordance_methods_and_targets_valid() {
        for node in seed_mesh("https://h") {
            for op in node.operations() {
                assert!(op.method_allowed(), "bad method on {:?}", node.id);
                let target = op.target_or_default();
                assert!(
                    target.starts_with("http") || target.starts_with("did:"),
                    "bad target {target}"
                );
            }
        }
    }
}
