//! The O.N.A. loop and its run state machine.

use crate::strategy::{Decision, Strategy, StrategyContext, WalletSnapshot};
use crate::AgentError;
use hmac::{Hmac, Mac};
use hyprcat_governance::{policy, Constraint, RequestContext};
use hyprcat_linkdata::Node;
use hyprcat_navigator::{FetchError, Navigator};
use hyprcat_provenance::{ActivityDraft, ProvenanceService};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Agent configuration.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Identity every request and provenance record is attributed to.
    pub agent_did: String,
    /// Key material used to sign payment proofs.
    pub key_material: String,
    /// Gateway base URL, for the wallet snapshot.
    pub base_url: String,
    /// First resource to observe.
    pub start_url: String,
    pub max_iterations: u32,
    pub iteration_delay: Duration,
    /// Settle 402s automatically within the budget below.
    pub auto_pay_enabled: bool,
    /// Largest amount auto-pay will settle without asking.
    pub auto_pay_max_amount: u64,
}

impl AgentConfig {
    /// Sensible demo defaults for an agent exploring `base_url`.
    pub fn demo(agent_did: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            agent_did: agent_did.into(),
            key_material: "demo-agent-key".to_string(),
            start_url: format!("{base_url}/catalog"),
            base_url,
            max_iterations: 10,
            iteration_delay: Duration::ZERO,
            auto_pay_enabled: true,
            auto_pay_max_amount: 5_000,
        }
    }
}

/// Run states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Error => "error",
        }
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub iterations: u32,
    pub executed_operations: u32,
    pub state: RunState,
    pub visited: Vec<String>,
}

/// The agent runtime.
pub struct AgentRuntime {
    config: AgentConfig,
    navigator: Arc<Navigator>,
    provenance: Arc<ProvenanceService>,
    strategies: Mutex<Vec<Arc<dyn Strategy>>>,
    state: Mutex<RunState>,
    paused: AtomicBool,
    stopped: AtomicBool,
    frontier: Mutex<VecDeque<String>>,
    // Keys of operations already executed, so revisits do not repeat them.
    executed_keys: Mutex<HashSet<String>>,
}

impl AgentRuntime {
    pub fn new(
        config: AgentConfig,
        navigator: Arc<Navigator>,
        provenance: Arc<ProvenanceService>,
    ) -> Self {
        Self {
            config,
            navigator,
            provenance,
            strategies: Mutex::new(Vec::new()),
            state: Mutex::new(RunState::Idle),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            frontier: Mutex::new(VecDeque::new()),
            executed_keys: Mutex::new(HashSet::new()),
        }
    }

    fn decision_key(decision: &Decision) -> String {
        let target = decision
            .operation
            .as_ref()
            .map(|op| op.target_or_default())
            .unwrap_or_default();
        let input = decision
            .input
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();
        format!("{target}|{input}")
    }

    fn already_executed(&self, decision: &Decision) -> bool {
        self.executed_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&Self::decision_key(decision))
    }

    fn mark_executed(&self, decision: &Decision) {
        self.executed_keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(Self::decision_key(decision));
    }

    /// Register a strategy; call before `run`.
    pub fn register_strategy(&self, strategy: Arc<dyn Strategy>) {
        self.strategies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(strategy);
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Freeze the loop at the next iteration boundary; history is kept.
    pub fn pause(&self) {
        if self.state() == RunState::Running {
            self.paused.store(true, Ordering::SeqCst);
            self.set_state(RunState::Paused);
        }
    }

    /// Resume a paused run.
    pub fn resume(&self) {
        if self.state() == RunState::Paused {
            self.paused.store(false, Ordering::SeqCst);
            self.set_state(RunState::Running);
        }
    }

    /// Stop the run: cancels in-flight fetches and discards the frontier.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.navigator.cancel();
        self.frontier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Sign a payment proof over an invoice id.
    fn sign_proof(&self, invoice_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.key_material.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(invoice_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Build payment headers for an invoice, when it fits the auto-pay
    /// budget and the wallet.
    fn payment_headers(
        &self,
        invoice: &Value,
        wallet: &WalletSnapshot,
    ) -> Option<HashMap<String, String>> {
        let amount = invoice
            .get("x402:amount")
            .or_else(|| invoice.get("amount"))
            .and_then(Value::as_u64)?;
        let invoice_id = invoice
            .get("x402:invoiceId")
            .or_else(|| invoice.get("invoiceId"))
            .and_then(Value::as_str)?;
        if amount > self.config.auto_pay_max_amount || wallet.balance_sat < amount {
            debug!(amount, budget = self.config.auto_pay_max_amount, "auto-pay declined");
            return None;
        }
        let proof = self.sign_proof(invoice_id);
        let mut headers = HashMap::new();
        headers.insert(
            "X-Payment-Proof".to_string(),
            format!("{invoice_id}:{proof}"),
        );
        headers.insert("X-Payment-Invoice".to_string(), invoice_id.to_string());
        info!(invoice = %invoice_id, amount, "auto-paying invoice");
        Some(headers)
    }

    async fn wallet_snapshot(&self) -> WalletSnapshot {
        let url = format!("{}/wallet", self.config.base_url.trim_end_matches('/'));
        match self.navigator.fetch_with_headers(&url, &HashMap::new()).await {
            Ok(node) => WalletSnapshot::from_value(&node.to_value()),
            Err(err) => {
                warn!(error = %err, "wallet snapshot unavailable");
                WalletSnapshot::default()
            }
        }
    }

    /// Observe a resource, auto-paying a 402 once when allowed.
    async fn observe(&self, url: &str, wallet: &WalletSnapshot) -> Result<Node, FetchError> {
        match self.navigator.fetch(url).await {
            Err(FetchError::PaymentRequired { invoice }) if self.config.auto_pay_enabled => {
                match self.payment_headers(&invoice, wallet) {
                    Some(headers) => self.navigator.fetch_with_headers(url, &headers).await,
                    None => Err(FetchError::PaymentRequired { invoice }),
                }
            }
            other => other,
        }
    }

    /// Pre-check a constraint the agent can decide locally (token gates and
    /// policies). Payments negotiate through the 402 round instead.
    fn constraint_satisfiable(&self, constraint: &Constraint, wallet: &WalletSnapshot) -> bool {
        match constraint {
            Constraint::Payment(payment) => {
                !self.config.auto_pay_enabled
                    || payment.amount <= self.config.auto_pay_max_amount
            }
            Constraint::TokenGate(gate) => {
                wallet
                    .tokens
                    .get(&gate.required_token)
                    .copied()
                    .unwrap_or(0)
                    >= gate.min_balance
            }
            Constraint::Policy(doc) => {
                let ctx = RequestContext {
                    did: Some(self.config.agent_did.clone()),
                    action: None,
                    target: None,
                    payment_proof: None,
                };
                policy::evaluate(doc, &ctx).is_ok()
            }
            Constraint::AllOf(parts) => parts
                .iter()
                .all(|part| self.constraint_satisfiable(part, wallet)),
            Constraint::AnyOf(parts) => parts
                .iter()
                .any(|part| self.constraint_satisfiable(part, wallet)),
        }
    }

    /// Execute a decision and record the attestation.
    async fn attest(&self, decision: &Decision, wallet: &WalletSnapshot) -> bool {
        let Some(op) = &decision.operation else {
            return false;
        };
        let action_type = decision
            .action_type
            .clone()
            .unwrap_or_else(|| "hyprcat:Execute".to_string());
        let target = op.target_or_default();

        if let Some(raw) = &op.constraint {
            if let Some(constraint) = Constraint::from_value(raw) {
                if !self.constraint_satisfiable(&constraint, wallet) {
                    warn!(%target, "constraint unsatisfiable, skipping execution");
                    let _ = self.provenance.record_activity(
                        &self.config.agent_did,
                        ActivityDraft::new(decision.reason.as_str(), action_type.as_str())
                            .method(op.method.as_str())
                            .target_url(target.as_str())
                            .status_code(500)
                            .payload(json!({"error": "constraint unsatisfiable"})),
                    );
                    return false;
                }
            }
        }

        let started = Instant::now();
        let outcome = self
            .navigator
            .execute_operation(op, decision.input.as_ref(), &HashMap::new())
            .await;
        let outcome = match outcome {
            Err(FetchError::PaymentRequired { invoice }) if self.config.auto_pay_enabled => {
                match self.payment_headers(&invoice, wallet) {
                    Some(headers) => {
                        self.navigator
                            .execute_operation(op, decision.input.as_ref(), &headers)
                            .await
                    }
                    None => Err(FetchError::PaymentRequired { invoice }),
                }
            }
            other => other,
        };
        let duration = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((status, body)) => {
                let draft = ActivityDraft::new(decision.reason.as_str(), action_type.as_str())
                    .method(op.method.as_str())
                    .target_url(target.as_str())
                    .status_code(status)
                    .duration_ms(duration)
                    .strategy(decision.reason.clone())
                    .payload(decision.input.clone().unwrap_or(Value::Null));
                let _ = self
                    .provenance
                    .record_activity(&self.config.agent_did, draft);
                let label = body
                    .get("schema:name")
                    .and_then(Value::as_str)
                    .unwrap_or("operation result")
                    .to_string();
                let _ = self
                    .provenance
                    .record_entity(&self.config.agent_did, &label, body);
                true
            }
            Err(err) => {
                warn!(%target, error = %err, "operation execution failed");
                let draft = ActivityDraft::new(decision.reason.as_str(), action_type.as_str())
                    .method(op.method.as_str())
                    .target_url(target.as_str())
                    .status_code(500)
                    .duration_ms(duration)
                    .payload(json!({"error": err.to_string()}));
                let _ = self
                    .provenance
                    .record_activity(&self.config.agent_did, draft);
                false
            }
        }
    }

    async fn wait_while_paused(&self) {
        while self.paused.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Run the loop to completion.
    pub async fn run(&self) -> Result<RunReport, AgentError> {
        {
            let state = self.state();
            if state != RunState::Idle {
                return Err(AgentError::InvalidState(state.as_str().to_string()));
            }
        }
        self.set_state(RunState::Running);
        self.stopped.store(false, Ordering::SeqCst);
        self.navigator.reset_cancellation();
        info!(agent = %self.config.agent_did, start = %self.config.start_url, "agent run starting");

        let mut current = self.config.start_url.clone();
        let mut iterations = 0u32;
        let mut executed = 0u32;

        while iterations < self.config.max_iterations {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            self.wait_while_paused().await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            iterations += 1;

            let wallet = self.wallet_snapshot().await;

            // Observe.
            let node = match self.observe(&current, &wallet).await {
                Ok(node) => node,
                Err(err) if iterations == 1 => {
                    self.set_state(RunState::Error);
                    return Err(AgentError::StartUnreachable(err));
                }
                Err(err) => {
                    warn!(url = %current, error = %err, "observation failed, advancing");
                    match self.next_url() {
                        Some(next) => {
                            current = next;
                            continue;
                        }
                        None => break,
                    }
                }
            };
            let label = node.title().unwrap_or(current.as_str()).to_string();
            self.provenance
                .record_entity(&self.config.agent_did, &label, node.to_value())?;

            // Negotiate.
            let ctx = StrategyContext {
                resource: node.clone(),
                wallet: wallet.clone(),
                visited: self.navigator.history(),
            };
            let decisions: Vec<Decision> = {
                let strategies = self.strategies.lock().unwrap_or_else(|e| e.into_inner());
                strategies
                    .iter()
                    .filter(|s| s.matches(&ctx))
                    .filter_map(|s| s.evaluate(&ctx))
                    .collect()
            };
            let best = decisions
                .iter()
                .filter(|d| d.should_execute && !self.already_executed(d))
                .max_by_key(|d| d.priority);

            // Attest.
            if let Some(decision) = best {
                debug!(reason = %decision.reason, priority = decision.priority, "executing decision");
                self.mark_executed(decision);
                if self.attest(decision, &wallet).await {
                    executed += 1;
                }
            }

            // Widen the frontier with unvisited members.
            {
                let mut frontier = self.frontier.lock().unwrap_or_else(|e| e.into_inner());
                for member in node.members() {
                    if let Some(id) = member.id {
                        if !self.navigator.visited(&id) && !frontier.contains(&id) {
                            frontier.push_back(id);
                        }
                    }
                }
            }

            // Advance: strategy suggestion first, then the frontier.
            let suggestion = decisions
                .iter()
                .filter(|d| !d.should_execute)
                .filter_map(|d| d.navigate_to.clone())
                .find(|url| !self.navigator.visited(url));
            match suggestion.or_else(|| self.next_url()) {
                Some(next) => current = next,
                None => break,
            }

            if !self.config.iteration_delay.is_zero() {
                tokio::time::sleep(self.config.iteration_delay).await;
            }
        }

        self.set_state(RunState::Completed);
        info!(iterations, executed, "agent run completed");
        Ok(RunReport {
            iterations,
            executed_operations: executed,
            state: RunState::Completed,
            visited: self.navigator.history(),
        })
    }

    fn next_url(&self) -> Option<String> {
        let mut frontier = self.frontier.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(candidate) = frontier.pop_front() {
            if !self.navigator.visited(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::RetailStrategy;
    use hyprcat_navigator::NavigatorConfig;
    use hyprcat_provenance::ChainItem;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn runtime_for(server_uri: &str, auto_pay_max: u64) -> AgentRuntime {
        let navigator = Arc::new(Navigator::new(NavigatorConfig {
            agent_did: Some("did:web:test-agent".to_string()),
            max_retries: 0,
            ..Default::default()
        }));
        let config = AgentConfig {
            agent_did: "did:web:test-agent".to_string(),
            key_material: "test-key".to_string(),
            base_url: server_uri.to_string(),
            start_url: format!("{server_uri}/catalog"),
            max_iterations: 5,
            iteration_delay: Duration::ZERO,
            auto_pay_enabled: true,
            auto_pay_max_amount: auto_pay_max,
        };
        AgentRuntime::new(config, navigator, Arc::new(ProvenanceService::new()))
    }

    async fn mount_mesh(server: &MockServer) {
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/wallet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@id": "did:web:test-agent",
                "@type": "hyprcat:Wallet",
                "hyprcat:balances": {"SAT": 10_000},
                "hyprcat:tokens": {}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@id": format!("{base}/catalog"),
                "@type": "hydra:Collection",
                "schema:name": "catalog",
                "member": [
                    {"@id": format!("{base}/nodes/store/hyprmart"), "@type": "schema:Store"}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nodes/store/hyprmart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@id": format!("{base}/nodes/store/hyprmart"),
                "@type": "schema:Store",
                "schema:name": "HyprMart",
                "member": [{
                    "@id": format!("{base}/nodes/product/widget"),
                    "@type": "schema:Product",
                    "schema:name": "Widget Mark II",
                    "schema:price": 3_500,
                    "schema:inventoryLevel": 12,
                    "operation": {
                        "method": "POST",
                        "title": "Buy this product",
                        "target": format!("{base}/operations/checkout"),
                        "constraint": {
                            "@type": "x402:PaymentConstraint",
                            "x402:amount": 3_500,
                            "x402:currency": "SAT",
                            "x402:recipient": "did:web:hyprmart.example"
                        }
                    }
                }]
            })))
            .mount(server)
            .await;
        // Checkout: 402 without proof, 201 with one.
        Mock::given(method("POST"))
            .and(path("/operations/checkout"))
            .and(header_exists("X-Payment-Proof"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "@type": "schema:Order",
                "schema:name": "Order for Widget Mark II",
                "schema:price": 3_500
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/operations/checkout"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "@type": "x402:PaymentRequired",
                "x402:amount": 3_500,
                "x402:invoiceId": "inv-retail-1",
                "x402:bolt11": "lnsim1deadbeef"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_retail_loop_buys_and_attests() {
        let server = MockServer::start().await;
        mount_mesh(&server).await;
        let runtime = runtime_for(&server.uri(), 5_000);
        runtime.register_strategy(Arc::new(RetailStrategy::new(5_000)));

        let report = runtime.run().await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.executed_operations, 1);
        assert_eq!(runtime.state(), RunState::Completed);

        let history = runtime.provenance.history_of("did:web:test-agent");
        assert_eq!(history.len(), 1);
        let chain = &history[0];
        // First item snapshots the catalog.
        match &chain.items[0] {
            ChainItem::Entity(entity) => {
                assert!(entity.snapshot["@id"].as_str().unwrap().ends_with("/catalog"));
            }
            _ => panic!("chain must start with an entity"),
        }
        // A buy activity with status 201 is recorded.
        let buy = chain.items.iter().find_map(|item| match item {
            ChainItem::Activity(a) if a.action_type.contains("BuyAction") => Some(a),
            _ => None,
        });
        let buy = buy.expect("buy activity recorded");
        assert_eq!(buy.status_code, Some(201));
    }

    #[tokio::test]
    async fn test_auto_pay_respects_budget() {
        let server = MockServer::start().await;
        mount_mesh(&server).await;
        // Budget below the product price: the 402 must not be settled.
        let runtime = runtime_for(&server.uri(), 1_000);
        runtime.register_strategy(Arc::new(RetailStrategy::new(5_000)));

        let report = runtime.run().await.unwrap();
        assert_eq!(report.executed_operations, 0);
        // No request with a payment proof reached the server.
        let paid_requests: Vec<Request> = server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.headers.contains_key("X-Payment-Proof"))
            .collect();
        assert!(paid_requests.is_empty());
    }

    #[tokio::test]
    async fn test_run_requires_idle_state() {
        let server = MockServer::start().await;
        mount_mesh(&server).await;
        let runtime = runtime_for(&server.uri(), 5_000);
        runtime.run().await.unwrap();
        let err = runtime.run().await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_unreachable_start_is_error() {
        let server = MockServer::start().await;
        // No mounts: catalog 404s.
        let runtime = runtime_for(&server.uri(), 5_000);
        let err = runtime.run().await.unwrap_err();
        assert!(matches!(err, AgentError::StartUnreachable(_)));
        assert_eq!(runtime.state(), RunState::Error);
    }

    #[tokio::test]
    async fn test_stop_discards_frontier() {
        let server = MockServer::start().await;
        mount_mesh(&server).await;
        let runtime = runtime_for(&server.uri(), 5_000);
        runtime.stop();
        assert!(runtime
            .frontier
            .lock()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_state_machine_transitions() {
        let runtime = runtime_for("http://localhost:0", 0);
        assert_eq!(runtime.state(), RunState::Idle);
        // pause is a no-op unless running
        runtime.pause();
        assert_eq!(runtime.state(), RunState::Idle);
        runtime.set_state(RunState::Running);
        runtime.pause();
        assert_eq!(runtime.state(), RunState::Paused);
        runtime.resume();
        assert_eq!(runtime.state(), RunState::Running);
    }

    #[test]
    fn test_sign_proof_is_stable_and_long_enough() {
        let runtime = runtime_for("http://localhost:0", 0);
        let a = runtime.sign_proof("inv-1");
        let b = runtime.sign_proof("inv-1");
        assert_eq!(a, b);
        assert!(a.len() >= 32);
        assert_ne!(a, runtime.sign_proof("inv-2"));
    }
}
