//! End-to-end tests over the router, no socket needed.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use hyprcat_gateway::{router, AppState, Config};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BASE: &str = "http://hyprcat.test";

fn app() -> (Router, Arc<AppState>) {
    let state = AppState::new(Config::for_tests(BASE)).unwrap();
    (router(Arc::clone(&state)), state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::ACCEPT, "application/ld+json")
        .body(Body::empty())
        .unwrap()
}

fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn session_token(app: &Router, did: &str) -> String {
    let challenge = body_json(
        app.clone()
            .oneshot(post_json("/auth/challenge", &json!({})))
            .await
            .unwrap(),
    )
    .await;
    let nonce = challenge["nonce"].as_str().unwrap().to_string();
    let verified = app
        .clone()
        .oneshot(post_json(
            "/auth/verify",
            &json!({"did": did, "signature": "sim:test", "nonce": nonce}),
        ))
        .await
        .unwrap();
    assert_eq!(verified.status(), StatusCode::OK);
    body_json(verified).await["token"].as_str().unwrap().to_string()
}

// Scenario: discovery traversal across the seeded mesh.
#[tokio::test]
async fn test_discovery_traversal() {
    let (app, _) = app();

    let response = app.clone().oneshot(get("/.well-known/hyprcat")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "application/ld+json"
    );
    assert_eq!(response.headers().get("X-HyprCAT-Version").unwrap(), "1.0.0");
    let description = body_json(response).await;
    assert_eq!(
        description["hydra:entrypoint"].as_str().unwrap(),
        format!("{BASE}/catalog")
    );

    let catalog = body_json(app.clone().oneshot(get("/catalog")).await.unwrap()).await;
    let members = catalog["member"].as_array().unwrap();
    assert!(members.len() >= 3);
    let has_store = members.iter().any(|m| {
        m["@type"]
            .as_array()
            .map(|ts| ts.first().and_then(Value::as_str) == Some("schema:Store"))
            .unwrap_or(m["@type"] == "schema:Store")
    });
    let has_data_product = members.iter().any(|m| {
        m["@type"]
            .as_array()
            .map(|ts| ts.iter().any(|t| t == "czero:DataProduct"))
            .unwrap_or(false)
    });
    assert!(has_store, "catalog lists the retail store");
    assert!(has_data_product, "catalog lists the data product");

    let store = body_json(app.clone().oneshot(get("/nodes/store/hyprmart")).await.unwrap()).await;
    let products = store["member"].as_array().unwrap();
    assert!(!products.is_empty());
    for product in products {
        let op = &product["operation"];
        assert_eq!(op["method"], "POST");
        assert_eq!(op["constraint"]["@type"], "x402:PaymentConstraint");
    }
}

// Scenario: the 402 payment flow end to end.
#[tokio::test]
async fn test_payment_flow() {
    let (app, state) = app();
    let did = "did:web:shopper";
    let token = session_token(&app, did).await;

    // No proof: 402 with a fresh invoice.
    let response = app
        .clone()
        .oneshot(post_json("/operations/checkout", &json!({"schema:price": "100"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let invoice = body_json(response).await;
    assert_eq!(invoice["x402:amount"], 100);
    assert!(!invoice["x402:bolt11"].as_str().unwrap().is_empty());
    let invoice_id = invoice["x402:invoiceId"].as_str().unwrap().to_string();

    // With a 32-char proof and a session: 201 and an order document.
    let proof = "a".repeat(32);
    let request = Request::builder()
        .method("POST")
        .uri("/operations/checkout")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("X-Payment-Proof", format!("{invoice_id}:{proof}"))
        .body(Body::from(
            serde_json::to_vec(&json!({"schema:price": "100"})).unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["@type"], "schema:Order");
    assert_eq!(order["schema:price"], 100);
    assert!(order["x402:paymentReceipt"]["id"].as_str().is_some());
    assert_eq!(order["x402:paymentReceipt"]["status"], "confirmed");

    // The payer's SAT balance decreased by exactly 100.
    let wallet = state.wallets.get(did).unwrap();
    assert_eq!(wallet.balance("SAT"), hyprcat_wallet::DEMO_BALANCE - 100);
}

// Scenario: nonce replay is rejected.
#[tokio::test]
async fn test_nonce_replay_rejected() {
    let (app, _) = app();
    let challenge = body_json(
        app.clone()
            .oneshot(post_json("/auth/challenge", &json!({})))
            .await
            .unwrap(),
    )
    .await;
    let nonce = challenge["nonce"].as_str().unwrap();
    let body = json!({"did": "did:web:replayer", "signature": "sim:x", "nonce": nonce});

    let first = app
        .clone()
        .oneshot(post_json("/auth/verify", &body))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(body_json(first).await["token"].as_str().is_some());

    let second = app
        .clone()
        .oneshot(post_json("/auth/verify", &body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(second).await["type"], "AuthenticationFailed");
}

// Scenario: federated query with filtering, ordering, and provenance tags.
#[tokio::test]
async fn test_federated_query() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(post_json(
            "/operations/query",
            &json!({"schema:query": "SELECT user_id, total_spend FROM analytics WHERE total_spend > 500"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["@type"], "czero:ResultSet");
    assert!(result["sources"].as_array().unwrap().len() >= 1);
    let time = result["executionTime"].as_str().unwrap();
    assert!(time.ends_with("ms"));
    assert!(time.trim_end_matches("ms").chars().all(|c| c.is_ascii_digit()));
    for item in result["items"].as_array().unwrap() {
        assert!(item["total_spend"].as_i64().unwrap() > 500);
        assert!(item["provenance"]["sourceNode"].as_str().is_some());
    }

    let ordered = body_json(
        app.clone()
            .oneshot(post_json(
                "/operations/query",
                &json!({"schema:query": "SELECT user_id, total_spend FROM analytics ORDER BY total_spend DESC LIMIT 3"}),
            ))
            .await
            .unwrap(),
    )
    .await;
    let items = ordered["items"].as_array().unwrap();
    assert!(items.len() <= 3);
    let spends: Vec<i64> = items.iter().map(|i| i["total_spend"].as_i64().unwrap()).collect();
    assert!(spends.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_query_parse_error_is_422_and_source_failure_502() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(post_json("/operations/query", &json!({"schema:query": "DROP TABLE x"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["type"], "ValidationError");

    let response = app
        .clone()
        .oneshot(post_json(
            "/operations/query",
            &json!({"schema:query": "SELECT * FROM broken_feed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["type"], "FederationError");
    assert!(body["hyprcat:failedSource"].as_str().unwrap().contains("broken"));
}

// Scenario: SHACL-lite rejection through a product's buy affordance.
#[tokio::test]
async fn test_shacl_rejection_on_checkout() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(post_json(
            "/operations/checkout",
            &json!({
                "schema:price": -1,
                "schema:itemOffered": format!("{BASE}/nodes/product/widget-mark-ii")
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let paths = body["hyprcat:paths"].as_array().unwrap();
    assert!(paths.iter().any(|p| p == "schema:price"));
}

#[tokio::test]
async fn test_register_and_refetch() {
    let (app, _) = app();
    let doc = json!({
        "@id": format!("{BASE}/nodes/custom/widget-feed"),
        "@type": "dcat:Dataset",
        "schema:name": "Widget feed"
    });
    let response = app.clone().oneshot(post_json("/nodes", &doc)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let fetched = app
        .clone()
        .oneshot(get("/nodes/custom/widget-feed"))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(body_json(fetched).await["schema:name"], "Widget feed");

    let invalid = app
        .clone()
        .oneshot(post_json("/nodes", &json!({"schema:name": "no id"})))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_node_is_jsonld_404() {
    let (app, _) = app();
    let response = app.clone().oneshot(get("/nodes/missing/thing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["type"], "NotFound");
    assert_eq!(body["statusCode"], 404);
    assert!(body["title"].as_str().is_some());
}

#[tokio::test]
async fn test_content_negotiation_406() {
    let (app, _) = app();
    let request = Request::builder()
        .uri("/catalog")
        .header(header::ACCEPT, "text/html")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_catalog_pagination_clamps() {
    let (app, _) = app();
    let response = app
        .clone()
        .oneshot(get("/catalog?page=-5&pageSize=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["view"]["first"].as_str().unwrap().contains("page=1"));

    let typed = body_json(
        app.clone()
            .oneshot(get("/catalog?type=schema%3AStore"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(typed["totalItems"], 1);
}

#[tokio::test]
async fn test_wallet_requires_identity() {
    let (app, _) = app();
    let response = app.clone().oneshot(get("/wallet")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["hyprcat:challengeEndpoint"].as_str().unwrap().contains("/auth/challenge"));

    let request = Request::builder()
        .uri("/wallet")
        .header(header::ACCEPT, "application/ld+json")
        .header("X-Agent-DID", "did:web:weak")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let wallet = body_json(response).await;
    assert_eq!(wallet["hyprcat:balances"]["SAT"], 10_000);
}

#[tokio::test]
async fn test_profile_requires_session() {
    let (app, _) = app();
    let request = Request::builder()
        .uri("/auth/profile")
        .header(header::ACCEPT, "application/ld+json")
        .header("X-Agent-DID", "did:web:weak")
        .body(Body::empty())
        .unwrap();
    // Weak attribution is not enough for the profile.
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = session_token(&app, "did:web:profiled").await;
    let request = Request::builder()
        .uri("/auth/profile")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["@id"], "did:web:profiled");
}

#[tokio::test]
async fn test_token_mint_and_burn_economics() {
    let (app, state) = app();
    let did = "did:web:collector";
    let token = session_token(&app, did).await;

    // Mint without proof: 402 priced at count * unit price.
    let response = app
        .clone()
        .oneshot(post_json(
            "/operations/token/mint",
            &json!({"tokenId": "hyprpass", "amount": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let invoice = body_json(response).await;
    assert_eq!(invoice["x402:amount"], 30);
    let invoice_id = invoice["x402:invoiceId"].as_str().unwrap().to_string();

    // Pay and mint.
    let request = Request::builder()
        .method("POST")
        .uri("/operations/token/mint")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header("X-Payment-Proof", format!("{invoice_id}:{}", "b".repeat(32)))
        .body(Body::from(
            serde_json::to_vec(&json!({"tokenId": "hyprpass", "amount": 3})).unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["hyprcat:balance"], 3);

    // Burn two back: half the mint price refunded.
    let before = state.wallets.get(did).unwrap().balance("SAT");
    let request = Request::builder()
        .method("DELETE")
        .uri("/operations/token/burn")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(
            serde_json::to_vec(&json!({"tokenId": "hyprpass", "amount": 2})).unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let burn = body_json(response).await;
    assert_eq!(burn["hyprcat:remaining"], 1);
    assert_eq!(burn["hyprcat:refund"], 10);
    assert_eq!(state.wallets.get(did).unwrap().balance("SAT"), before + 10);

    // Burning more than held is a 400.
    let request = Request::builder()
        .method("DELETE")
        .uri("/operations/token/burn")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(
            serde_json::to_vec(&json!({"tokenId": "hyprpass", "amount": 50})).unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_window() {
    let mut config = Config::for_tests(BASE);
    config.rate_limit_max = 3;
    let state = AppState::new(config).unwrap();
    let app = router(Arc::clone(&state));

    for _ in 0..3 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("X-RateLimit-Remaining"));
    }
    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
}

#[tokio::test]
async fn test_stats_and_link_headers() {
    let (app, _) = app();
    app.clone().oneshot(get("/catalog")).await.unwrap();
    let response = app.clone().oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let link = response.headers().get(header::LINK).unwrap().to_str().unwrap();
    assert!(link.contains("service-desc"));
    assert!(link.contains("/catalog"));
    let stats = body_json(response).await;
    assert!(stats["resources"].as_u64().unwrap() >= 7);
    assert!(stats["requests"].as_u64().unwrap() >= 1);

    let response = app.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_lrs_export_requires_identity_and_lists_chains() {
    let (app, state) = app();
    let response = app.clone().oneshot(get("/operations/lrs/export")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Run a query to generate a provenance chain for the DID.
    let request = Request::builder()
        .method("POST")
        .uri("/operations/query")
        .header(header::ACCEPT, "application/ld+json")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Agent-DID", "did:web:learner")
        .body(Body::from(
            serde_json::to_vec(&json!({"schema:query": "SELECT * FROM analytics LIMIT 1"}))
                .unwrap(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-Provenance-Id"));
    assert_eq!(state.provenance.history_of("did:web:learner").len(), 1);

    let request = Request::builder()
        .uri("/operations/lrs/export?format=summary")
        .header(header::ACCEPT, "application/ld+json")
        .header("X-Agent-DID", "did:web:learner")
        .body(Body::empty())
        .unwrap();
    let export = body_json(app.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(export["totalItems"], 1);
    assert_eq!(export["member"][0]["agent"], "did:web:learner");
}
