//! Wallet-state store: per-DID balances, token holdings, and subscriptions.
//!
//! Every mutation is a read-modify-write under a per-DID critical section so
//! concurrent debits cannot drive a balance negative. Locking is sharded by
//! DID hash to bound contention without a global mutex.

use hyprcat_storage::{JsonDir, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use tracing::debug;

/// Default settlement currency.
pub const DEFAULT_CURRENCY: &str = "SAT";

/// Demo balance seeded into a fresh wallet.
pub const DEMO_BALANCE: u64 = 10_000;

const SHARD_COUNT: usize = 16;

/// Wallet errors.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Debit exceeds the available balance.
    #[error("insufficient funds: need {needed} {currency}, have {available}")]
    InsufficientFunds {
        currency: String,
        needed: u64,
        available: u64,
    },
    /// Burn exceeds the held token count.
    #[error("insufficient tokens: need {needed} of {token}, have {available}")]
    InsufficientTokens {
        token: String,
        needed: u64,
        available: u64,
    },
    /// No wallet exists for the DID.
    #[error("unknown wallet: {0}")]
    Unknown(String),
    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Per-identity wallet record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletState {
    /// Owning identity.
    pub did: String,
    /// Currency code to non-negative balance.
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    /// Token id to non-negative count.
    #[serde(default)]
    pub tokens: BTreeMap<String, u64>,
    /// Active subscription identifiers.
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

impl WalletState {
    /// Fresh demo wallet for a DID.
    pub fn demo(did: impl Into<String>) -> Self {
        let mut balances = BTreeMap::new();
        balances.insert(DEFAULT_CURRENCY.to_string(), DEMO_BALANCE);
        Self {
            did: did.into(),
            balances,
            tokens: BTreeMap::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Balance in `currency`, zero when absent.
    pub fn balance(&self, currency: &str) -> u64 {
        self.balances.get(currency).copied().unwrap_or(0)
    }

    /// Held count of `token`, zero when absent.
    pub fn token_balance(&self, token: &str) -> u64 {
        self.tokens.get(token).copied().unwrap_or(0)
    }

    /// True when `amount` of `currency` is available.
    pub fn can_afford(&self, currency: &str, amount: u64) -> bool {
        self.balance(currency) >= amount
    }
}

type Shard = Mutex<HashMap<String, WalletState>>;

/// Wallet store with sharded per-DID locking and optional file persistence.
pub struct WalletStore {
    shards: Vec<Shard>,
    persist: Option<JsonDir>,
}

impl WalletStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self::with_persistence(None)
    }

    /// Store that mirrors every committed state into `persist`.
    pub fn with_persistence(persist: Option<JsonDir>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, persist }
    }

    fn shard_for(&self, did: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        did.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    fn load_into<'a>(
        &self,
        guard: &'a mut HashMap<String, WalletState>,
        did: &str,
    ) -> Option<&'a mut WalletState> {
        if !guard.contains_key(did) {
            if let Some(persist) = &self.persist {
                if let Ok(Some(doc)) = persist.read(did) {
                    if let Ok(state) = serde_json::from_value::<WalletState>(doc) {
                        guard.insert(did.to_string(), state);
                    }
                }
            }
        }
        guard.get_mut(did)
    }

    fn commit(&self, state: &WalletState) {
        if let Some(persist) = &self.persist {
            if let Ok(doc) = serde_json::to_value(state) {
                if let Err(err) = persist.write(&state.did, &doc) {
                    tracing::warn!(did = %state.did, error = %err, "wallet persist failed");
                }
            }
        }
    }

    /// Snapshot of a wallet, when one exists.
    pub fn get(&self, did: &str) -> Option<WalletState> {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        self.load_into(&mut guard, did).map(|s| s.clone())
    }

    /// Replace a wallet state wholesale.
    pub fn put(&self, state: WalletState) {
        let mut guard = self
            .shard_for(&state.did)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        self.commit(&state);
        guard.insert(state.did.clone(), state);
    }

    /// Fetch the wallet for `did`, seeding a demo wallet on first touch.
    pub fn create_if_absent(&self, did: &str) -> WalletState {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = self.load_into(&mut guard, did) {
            return existing.clone();
        }
        let state = WalletState::demo(did);
        debug!(%did, balance = DEMO_BALANCE, "seeded demo wallet");
        self.commit(&state);
        guard.insert(did.to_string(), state.clone());
        state
    }

    /// Debit `amount` of `currency`; returns the new balance.
    pub fn debit(&self, did: &str, currency: &str, amount: u64) -> Result<u64, WalletError> {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        let state = self
            .load_into(&mut guard, did)
            .ok_or_else(|| WalletError::Unknown(did.to_string()))?;
        let available = state.balance(currency);
        if available < amount {
            return Err(WalletError::InsufficientFunds {
                currency: currency.to_string(),
                needed: amount,
                available,
            });
        }
        let next = available - amount;
        state.balances.insert(currency.to_string(), next);
        let snapshot = state.clone();
        drop(guard);
        self.commit(&snapshot);
        Ok(next)
    }

    /// Credit `amount` of `currency`; returns the new balance.
    pub fn credit(&self, did: &str, currency: &str, amount: u64) -> Result<u64, WalletError> {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        if self.load_into(&mut guard, did).is_none() {
            guard.insert(did.to_string(), WalletState::demo(did));
        }
        let state = guard.get_mut(did).expect("wallet just ensured");
        let next = state.balance(currency).saturating_add(amount);
        state.balances.insert(currency.to_string(), next);
        let snapshot = state.clone();
        drop(guard);
        self.commit(&snapshot);
        Ok(next)
    }

    /// Add `count` units of `token`; returns the new holding.
    pub fn add_tokens(&self, did: &str, token: &str, count: u64) -> Result<u64, WalletError> {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        let state = self
            .load_into(&mut guard, did)
            .ok_or_else(|| WalletError::Unknown(did.to_string()))?;
        let next = state.token_balance(token).saturating_add(count);
        state.tokens.insert(token.to_string(), next);
        let snapshot = state.clone();
        drop(guard);
        self.commit(&snapshot);
        Ok(next)
    }

    /// Burn `count` units of `token`; returns the remaining holding.
    pub fn burn_tokens(&self, did: &str, token: &str, count: u64) -> Result<u64, WalletError> {
        let mut guard = self.shard_for(did).lock().unwrap_or_else(|e| e.into_inner());
        let state = self
            .load_into(&mut guard, did)
            .ok_or_else(|| WalletError::Unknown(did.to_string()))?;
        let available = state.token_balance(token);
        if available < count {
            return Err(WalletError::InsufficientTokens {
                token: token.to_string(),
                needed: count,
                available,
            });
        }
        let next = available - count;
        if next == 0 {
            state.tokens.remove(token);
        } else {
            state.tokens.insert(token.to_string(), next);
        }
        let snapshot = state.clone();
        drop(guard);
        self.commit(&snapshot);
        Ok(next)
    }

    /// True when `did` holds at least `amount` of `currency`.
    pub fn can_afford(&self, did: &str, currency: &str, amount: u64) -> bool {
        self.get(did)
            .map(|state| state.can_afford(currency, amount))
            .unwrap_or(false)
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_demo_wallet_seeded_once() {
        let store = WalletStore::new();
        let first = store.create_if_absent("did:web:a");
        assert_eq!(first.balance(DEFAULT_CURRENCY), DEMO_BALANCE);
        store.debit("did:web:a", DEFAULT_CURRENCY, 100).unwrap();
        let second = store.create_if_absent("did:web:a");
        assert_eq!(second.balance(DEFAULT_CURRENCY), DEMO_BALANCE - 100);
    }

    #[test]
    fn test_debit_decreases_by_exact_amount() {
        let store = WalletStore::new();
        store.create_if_absent("did:web:a");
        let after = store.debit("did:web:a", "SAT", 3_500).unwrap();
        assert_eq!(after, DEMO_BALANCE - 3_500);
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let store = WalletStore::new();
        store.create_if_absent("did:web:a");
        let err = store.debit("did:web:a", "SAT", DEMO_BALANCE + 1).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(store.get("did:web:a").unwrap().balance("SAT"), DEMO_BALANCE);
    }

    #[test]
    fn test_concurrent_debits_serialize() {
        let store = Arc::new(WalletStore::new());
        store.create_if_absent("did:web:race");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let _ = store.debit("did:web:race", "SAT", 10);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // All 800 debits fit in the seed, so every one must be accounted.
        let remaining = store.get("did:web:race").unwrap().balance("SAT");
        assert_eq!(remaining, DEMO_BALANCE - 800 * 10);
    }

    #[test]
    fn test_token_mint_and_burn() {
        let store = WalletStore::new();
        store.create_if_absent("did:web:a");
        assert_eq!(store.add_tokens("did:web:a", "hyprpass", 5).unwrap(), 5);
        assert_eq!(store.burn_tokens("did:web:a", "hyprpass", 2).unwrap(), 3);
        let err = store.burn_tokens("did:web:a", "hyprpass", 10).unwrap_err();
        assert!(matches!(err, WalletError::InsufficientTokens { .. }));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let jsondir = JsonDir::new(dir.path().join("wallets"));
        {
            let store = WalletStore::with_persistence(Some(jsondir.clone()));
            store.create_if_absent("did:web:a");
            store.debit("did:web:a", "SAT", 250).unwrap();
        }
        let reloaded = WalletStore::with_persistence(Some(jsondir));
        assert_eq!(
            reloaded.get("did:web:a").unwrap().balance("SAT"),
            DEMO_BALANCE - 250
        );
    }
}
