//! Shared application state wiring every subsystem together.

use crate::config::Config;
use hyprcat_catalog::CatalogService;
use hyprcat_federation::FederationEngine;
use hyprcat_governance::{GovernancePipeline, PaymentService};
use hyprcat_identity::{IdentityConfig, IdentityService};
use hyprcat_linkdata::Node;
use hyprcat_provenance::{ActivityDraft, ProvenanceService};
use hyprcat_storage::{open_backend, Backend, JsonDir, ResourceStore};
use hyprcat_wallet::WalletStore;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Request counters for the stats surface.
#[derive(Default)]
pub struct Stats {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
}

impl Stats {
    pub fn record(&self, is_error: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Everything handlers need, shared behind `Arc`.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ResourceStore>,
    pub catalog: CatalogService,
    pub identity: IdentityService,
    pub wallets: Arc<WalletStore>,
    pub governance: GovernancePipeline,
    pub federation: FederationEngine,
    pub provenance: ProvenanceService,
    pub stats: Stats,
    pub started_at: Instant,
}

impl AppState {
    /// Build and seed the full service graph from configuration.
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let file_backed = config.storage_backend == Backend::File;
        let store = open_backend(config.storage_backend, &config.storage_dir);
        let catalog = CatalogService::new(Arc::clone(&store), config.base_url.clone());
        catalog.seed()?;

        let wallets = Arc::new(WalletStore::with_persistence(
            file_backed.then(|| JsonDir::new(config.storage_dir.join("wallets"))),
        ));
        let identity = IdentityService::new(
            IdentityConfig {
                token_secret: config.jwt_secret.clone(),
                domain: config.base_url.clone(),
                allow_simulated: config.allow_simulated_signatures,
            },
            file_backed.then(|| JsonDir::new(config.storage_dir.join("sessions"))),
        );
        let payments = PaymentService::new(config.payment_secret.clone(), Arc::clone(&wallets));
        let governance = GovernancePipeline::new(payments, Arc::clone(&wallets));
        let federation = FederationEngine::new();
        let provenance = ProvenanceService::with_persistence(
            file_backed.then(|| JsonDir::new(config.storage_dir.join("provenance"))),
        );

        info!(base_url = %config.base_url, backend = ?config.storage_backend, "state initialized");
        Ok(Arc::new(Self {
            config,
            store,
            catalog,
            identity,
            wallets,
            governance,
            federation,
            provenance,
            stats: Stats::default(),
            started_at: Instant::now(),
        }))
    }

    /// Resolve a stored resource by its path under `/nodes/`.
    pub fn node_id_for(&self, path: &str) -> String {
        format!("{}/nodes/{}", self.config.base_url, path)
    }

    /// Record an attributed entity/activity pair for a handler that mutates
    /// or attributes. Returns the activity id for `X-Provenance-Id` and
    /// `wasGeneratedBy`; recording failures are logged, never fatal to the
    /// request.
    pub fn attribute(
        &self,
        did: &str,
        label: &str,
        snapshot: Value,
        draft: ActivityDraft,
    ) -> Option<String> {
        if let Err(err) = self.provenance.record_entity(did, label, snapshot) {
            tracing::warn!(error = %err, "provenance entity recording failed");
            return None;
        }
        match self.provenance.record_activity(did, draft) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "provenance activity recording failed");
                None
            }
        }
    }

    /// Spawn the background sweeper pruning expired challenges and
    /// invoices once per rate-limit window.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(self);
        let interval = state.config.rate_limit_window.max(Duration::from_secs(30));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let challenges = state.identity.sweep_expired();
                let invoices = state.governance.payments().sweep_expired();
                if challenges + invoices > 0 {
                    info!(challenges, invoices, "swept expired entries");
                }
            }
        })
    }

    /// Store lookup helper returning the typed envelope.
    pub fn get_resource(&self, id: &str) -> Result<Option<Node>, hyprcat_storage::StorageError> {
        self.store.get(id)
    }
}
