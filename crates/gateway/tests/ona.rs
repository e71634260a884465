//! End-to-end: a retail agent runs its O.N.A. loop against a live gateway.

use hyprcat_agent::{AgentConfig, AgentRuntime, RetailStrategy, RunState};
use hyprcat_gateway::{router, AppState, Config};
use hyprcat_navigator::{Navigator, NavigatorConfig};
use hyprcat_provenance::{ChainItem, ProvenanceService};
use std::sync::Arc;
use std::time::Duration;

const AGENT_DID: &str = "did:web:ona-agent";

async fn spawn_gateway() -> (String, Arc<AppState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    let state = AppState::new(Config::for_tests(&base_url)).unwrap();
    let app = router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base_url, state)
}

#[tokio::test]
async fn test_retail_agent_buys_through_live_gateway() {
    let (base_url, state) = spawn_gateway().await;

    let navigator = Arc::new(Navigator::new(NavigatorConfig {
        agent_did: Some(AGENT_DID.to_string()),
        max_retries: 1,
        backoff_base: Duration::from_millis(10),
        ..Default::default()
    }));
    let provenance = Arc::new(ProvenanceService::new());
    let runtime = AgentRuntime::new(
        AgentConfig {
            agent_did: AGENT_DID.to_string(),
            key_material: "ona-agent-key".to_string(),
            base_url: base_url.clone(),
            start_url: format!("{base_url}/catalog"),
            max_iterations: 8,
            iteration_delay: Duration::ZERO,
            auto_pay_enabled: true,
            auto_pay_max_amount: 5_000,
        },
        Arc::clone(&navigator),
        Arc::clone(&provenance),
    );
    runtime.register_strategy(Arc::new(RetailStrategy::new(5_000)));

    let report = runtime.run().await.unwrap();
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.executed_operations, 1, "exactly one purchase");

    // The wallet was debited by the 3 500 SAT product price.
    let wallet = state.wallets.get(AGENT_DID).unwrap();
    assert_eq!(
        wallet.balance("SAT"),
        hyprcat_wallet::DEMO_BALANCE - 3_500
    );

    // The agent's provenance chain starts with the catalog snapshot and
    // carries a successful buy activity.
    let history = provenance.history_of(AGENT_DID);
    assert_eq!(history.len(), 1);
    let chain = &history[0];
    match &chain.items[0] {
        ChainItem::Entity(entity) => {
            let id = entity.snapshot["@id"].as_str().unwrap();
            assert!(id.ends_with("/catalog"), "first entity snapshots the catalog");
        }
        _ => panic!("chain must open with an entity"),
    }
    let buy = chain
        .items
        .iter()
        .filter_map(|item| match item {
            ChainItem::Activity(a) if a.action_type.contains("BuyAction") => Some(a),
            _ => None,
        })
        .last()
        .expect("a buy activity was recorded");
    assert_eq!(buy.status_code, Some(201));
    assert_eq!(buy.method.as_deref(), Some("POST"));

    // Server-side accounting agrees: one confirmed receipt for the agent.
    let receipts = state.governance.payments().receipts_for(AGENT_DID);
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].amount, 3_500);
}
