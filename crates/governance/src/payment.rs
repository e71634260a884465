//! The 402 payment engine: invoices, proof verification, receipts.

use crate::{GovernanceError, PaymentConstraint};
use hmac::{Hmac, Mac};
use hyprcat_wallet::WalletStore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Invoice lifetime.
pub const INVOICE_TTL_SECS: u64 = 600;

/// Structural minimum for a payment proof string.
pub const MIN_PROOF_LEN: usize = 16;

/// Invoice id recorded on receipts settled without an invoice reference.
pub const DIRECT_INVOICE: &str = "direct";

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A time-bounded payment invoice issued alongside a 402 response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: String,
    pub amount: u64,
    pub currency: String,
    pub recipient: String,
    /// Simulated Lightning payment request.
    pub bolt11: String,
    /// Expiry timestamp (unix millis), at most 10 minutes out.
    pub expires_at: u64,
}

/// Receipt settlement status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

/// The authoritative confirmation of a settled payment. Immutable once
/// confirmed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub invoice_id: String,
    pub payer_did: String,
    pub amount: u64,
    pub currency: String,
    pub proof: String,
    pub status: ReceiptStatus,
    /// Creation timestamp (unix millis).
    pub created_at: u64,
}

/// Parsed `X-Payment-Proof` header: `"<invoiceId>:<proof>"` or a bare proof.
#[derive(Clone, Debug, Default)]
pub struct PaymentProof {
    pub invoice_id: Option<String>,
    pub proof: String,
}

impl PaymentProof {
    /// Parse the header value. A single `:` splits invoice id from proof;
    /// without one the whole value is the proof of a direct payment.
    pub fn parse(header: &str) -> Self {
        match header.split_once(':') {
            Some((invoice_id, proof)) if !invoice_id.is_empty() => Self {
                invoice_id: Some(invoice_id.to_string()),
                proof: proof.to_string(),
            },
            _ => Self {
                invoice_id: None,
                proof: header.to_string(),
            },
        }
    }
}

/// Payment engine. Invoices live in the pending set until consumed or
/// swept; consumption is an atomic remove, so a failed attempt is final
/// for that invoice.
pub struct PaymentService {
    secret: Vec<u8>,
    wallets: Arc<WalletStore>,
    pending: Mutex<HashMap<String, Invoice>>,
    receipts: Mutex<Vec<Receipt>>,
}

impl PaymentService {
    pub fn new(secret: Vec<u8>, wallets: Arc<WalletStore>) -> Self {
        Self {
            secret,
            wallets,
            pending: Mutex::new(HashMap::new()),
            receipts: Mutex::new(Vec::new()),
        }
    }

    fn simulated_bolt11(&self, invoice_id: &str, amount: u64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key length");
        mac.update(invoice_id.as_bytes());
        mac.update(&amount.to_be_bytes());
        format!("lnsim1{}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Issue an invoice for a payment constraint and record it pending.
    pub fn issue_invoice(&self, constraint: &PaymentConstraint) -> Invoice {
        let invoice_id = Uuid::new_v4().to_string();
        let invoice = Invoice {
            bolt11: self.simulated_bolt11(&invoice_id, constraint.amount),
            invoice_id: invoice_id.clone(),
            amount: constraint.amount,
            currency: constraint.currency.clone(),
            recipient: constraint.recipient.clone(),
            expires_at: now_millis() + INVOICE_TTL_SECS * 1_000,
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(invoice_id, invoice.clone());
        invoice
    }

    /// Verify a payment proof and settle it against the payer's wallet.
    ///
    /// Rejection order: structural proof check, invoice lookup (consumed
    /// either way), expiry, amount match, wallet debit. The confirmed
    /// receipt is retained and returned.
    pub fn verify_and_settle(
        &self,
        payer_did: &str,
        proof: &PaymentProof,
        expected: &PaymentConstraint,
    ) -> Result<Receipt, GovernanceError> {
        if proof.proof.len() < MIN_PROOF_LEN {
            return Err(GovernanceError::InvalidProof);
        }
        let (invoice_id, amount, currency) = match &proof.invoice_id {
            Some(id) => {
                let invoice = {
                    let mut pending =
                        self.pending.lock().unwrap_or_else(|e| e.into_inner());
                    pending
                        .remove(id)
                        .ok_or_else(|| GovernanceError::InvoiceUnknown(id.clone()))?
                };
                if invoice.expires_at <= now_millis() {
                    return Err(GovernanceError::InvoiceExpired(invoice.invoice_id));
                }
                if invoice.amount != expected.amount {
                    return Err(GovernanceError::AmountMismatch {
                        expected: expected.amount,
                        presented: invoice.amount,
                    });
                }
                (invoice.invoice_id, invoice.amount, invoice.currency)
            }
            None => (
                DIRECT_INVOICE.to_string(),
                expected.amount,
                expected.currency.clone(),
            ),
        };
        self.wallets.create_if_absent(payer_did);
        self.wallets.debit(payer_did, &currency, amount)?;
        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            invoice_id,
            payer_did: payer_did.to_string(),
            amount,
            currency,
            proof: proof.proof.clone(),
            status: ReceiptStatus::Confirmed,
            created_at: now_millis(),
        };
        info!(payer = %payer_did, amount, receipt = %receipt.id, "payment settled");
        let mut receipts = self.receipts.lock().unwrap_or_else(|e| e.into_inner());
        receipts.push(receipt.clone());
        Ok(receipt)
    }

    /// Confirmed receipts for a payer, newest last.
    pub fn receipts_for(&self, payer_did: &str) -> Vec<Receipt> {
        let receipts = self.receipts.lock().unwrap_or_else(|e| e.into_inner());
        receipts
            .iter()
            .filter(|r| r.payer_did == payer_did)
            .cloned()
            .collect()
    }

    /// Total settled receipts (stats surface).
    pub fn receipt_count(&self) -> usize {
        self.receipts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Pending invoices (stats surface).
    pub fn pending_invoices(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drop expired pending invoices; returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let now = now_millis();
        let before = pending.len();
        pending.retain(|_, invoice| invoice.expires_at > now);
        let removed = before.saturating_sub(pending.len());
        if removed > 0 {
            debug!(removed, "swept expired invoices");
        }
        removed
    }
}
