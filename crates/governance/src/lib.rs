//! Governance pipeline: the 402 payment flow, token gates, and policy
//! evaluation, composable through a single constraint sum type.

pub mod constraint;
pub mod payment;
pub mod policy;

pub use constraint::{Constraint, PaymentConstraint, TokenGateConstraint};
pub use payment::{Invoice, PaymentProof, PaymentService, Receipt, ReceiptStatus, MIN_PROOF_LEN};
pub use policy::{PolicyClause, PolicyDocument, PolicyRule};

use hyprcat_wallet::{WalletError, WalletStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Governance errors. Failed gate and policy checks mutate nothing; a
/// failed payment attempt discards its invoice.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    /// Invoice id not in the pending set (never issued, consumed, or swept).
    #[error("unknown invoice: {0}")]
    InvoiceUnknown(String),
    /// Invoice past its expiry; treated as unknown by callers.
    #[error("invoice expired: {0}")]
    InvoiceExpired(String),
    /// Paid amount does not match the invoice.
    #[error("payment amount mismatch: invoice wants {expected}, proof covers {presented}")]
    AmountMismatch { expected: u64, presented: u64 },
    /// Proof string fails the structural minimum.
    #[error("invalid payment proof")]
    InvalidProof,
    /// Wallet-level failure (insufficient funds surfaces here).
    #[error(transparent)]
    Wallet(#[from] WalletError),
    /// Token gate unsatisfied.
    #[error("token gate denied: need {required} of {token}, hold {held}")]
    GateDenied {
        token: String,
        required: u64,
        held: u64,
    },
    /// Policy prohibition matched or obligation unsatisfied.
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    /// Payer identity is required for settlement.
    #[error("payment requires an identified payer")]
    PayerRequired,
}

/// Request context a constraint is evaluated against.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Authenticated or attributed identity.
    pub did: Option<String>,
    /// Action name for policy matching.
    pub action: Option<String>,
    /// Target resource for policy matching.
    pub target: Option<String>,
    /// Parsed `X-Payment-Proof` header, when present.
    pub payment_proof: Option<PaymentProof>,
}

/// Pipeline outcome for a satisfiable constraint.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Constraint satisfied; receipts settled along the way.
    Granted { receipts: Vec<Receipt> },
    /// Payment still owed; a fresh invoice has been recorded.
    PaymentRequired(Invoice),
}

/// Governance pipeline tying payments, wallets, and policy together.
pub struct GovernancePipeline {
    payments: PaymentService,
    wallets: Arc<WalletStore>,
}

impl GovernancePipeline {
    pub fn new(payments: PaymentService, wallets: Arc<WalletStore>) -> Self {
        Self { payments, wallets }
    }

    /// The payment engine, for direct invoice/receipt access.
    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }

    /// Evaluate a constraint against a request context.
    pub fn evaluate(
        &self,
        constraint: &Constraint,
        ctx: &RequestContext,
    ) -> Result<Outcome, GovernanceError> {
        match constraint {
            Constraint::Payment(payment) => self.evaluate_payment(payment, ctx),
            Constraint::TokenGate(gate) => self.evaluate_gate(gate, ctx).map(|()| Outcome::Granted {
                receipts: Vec::new(),
            }),
            Constraint::Policy(doc) => {
                policy::evaluate(doc, ctx).map(|()| Outcome::Granted { receipts: Vec::new() })
            }
            Constraint::AllOf(parts) => {
                let mut receipts = Vec::new();
                for part in parts {
                    match self.evaluate(part, ctx)? {
                        Outcome::Granted { receipts: mut r } => receipts.append(&mut r),
                        owed @ Outcome::PaymentRequired(_) => return Ok(owed),
                    }
                }
                Ok(Outcome::Granted { receipts })
            }
            Constraint::AnyOf(parts) => {
                let mut owed = None;
                let mut last_err = None;
                for part in parts {
                    match self.evaluate(part, ctx) {
                        Ok(Outcome::Granted { receipts }) => {
                            return Ok(Outcome::Granted { receipts })
                        }
                        Ok(Outcome::PaymentRequired(invoice)) => {
                            owed.get_or_insert(invoice);
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                if let Some(invoice) = owed {
                    return Ok(Outcome::PaymentRequired(invoice));
                }
                Err(last_err.unwrap_or(GovernanceError::PolicyDenied(
                    "empty alternative constraint".to_string(),
                )))
            }
        }
    }

    fn evaluate_payment(
        &self,
        payment: &PaymentConstraint,
        ctx: &RequestContext,
    ) -> Result<Outcome, GovernanceError> {
        match &ctx.payment_proof {
            None => {
                let invoice = self.payments.issue_invoice(payment);
                debug!(invoice = %invoice.invoice_id, amount = payment.amount, "payment required");
                Ok(Outcome::PaymentRequired(invoice))
            }
            Some(proof) => {
                let payer = ctx.did.as_deref().ok_or(GovernanceError::PayerRequired)?;
                let receipt = self.payments.verify_and_settle(payer, proof, payment)?;
                Ok(Outcome::Granted {
                    receipts: vec![receipt],
                })
            }
        }
    }

    fn evaluate_gate(
        &self,
        gate: &TokenGateConstraint,
        ctx: &RequestContext,
    ) -> Result<(), GovernanceError> {
        let did = ctx.did.as_deref().ok_or(GovernanceError::PayerRequired)?;
        let held = self
            .wallets
            .get(did)
            .map(|w| w.token_balance(&gate.required_token))
            .unwrap_or(0);
        if held >= gate.min_balance {
            Ok(())
        } else {
            Err(GovernanceError::GateDenied {
                token: gate.required_token.clone(),
                required: gate.min_balance,
                held,
            })
        }
    }
}

/// Parse a constraint from its JSON-LD representation, when one is present.
pub fn constraint_from_value(value: &Value) -> Option<Constraint> {
    Constraint::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyprcat_wallet::DEFAULT_CURRENCY;
    use serde_json::json;

    fn pipeline() -> GovernancePipeline {
        let wallets = Arc::new(WalletStore::new());
        let payments = PaymentService::new(b"payment-secret".to_vec(), Arc::clone(&wallets));
        GovernancePipeline::new(payments, wallets)
    }

    fn paid_constraint(amount: u64) -> Constraint {
        Constraint::Payment(PaymentConstraint {
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            recipient: "did:web:hyprcat.dev".to_string(),
        })
    }

    #[test]
    fn test_payment_without_proof_yields_invoice() {
        let pipe = pipeline();
        let ctx = RequestContext::default();
        match pipe.evaluate(&paid_constraint(100), &ctx).unwrap() {
            Outcome::PaymentRequired(invoice) => {
                assert_eq!(invoice.amount, 100);
                assert!(!invoice.bolt11.is_empty());
            }
            _ => panic!("expected payment required"),
        }
    }

    #[test]
    fn test_payment_with_proof_settles_and_debits() {
        let pipe = pipeline();
        pipe.wallets.create_if_absent("did:web:payer");
        let invoice = match pipe
            .evaluate(&paid_constraint(100), &RequestContext::default())
            .unwrap()
        {
            Outcome::PaymentRequired(invoice) => invoice,
            _ => panic!(),
        };
        let ctx = RequestContext {
            did: Some("did:web:payer".to_string()),
            payment_proof: Some(PaymentProof {
                invoice_id: Some(invoice.invoice_id.clone()),
                proof: "a".repeat(32),
            }),
            ..Default::default()
        };
        match pipe.evaluate(&paid_constraint(100), &ctx).unwrap() {
            Outcome::Granted { receipts } => {
                assert_eq!(receipts.len(), 1);
                assert_eq!(receipts[0].amount, 100);
            }
            _ => panic!("expected grant"),
        }
        let balance = pipe.wallets.get("did:web:payer").unwrap().balance("SAT");
        assert_eq!(balance, hyprcat_wallet::DEMO_BALANCE - 100);
    }

    #[test]
    fn test_gate_denied_without_tokens() {
        let pipe = pipeline();
        pipe.wallets.create_if_absent("did:web:holder");
        let gate = Constraint::TokenGate(TokenGateConstraint {
            required_token: "hyprpass".to_string(),
            min_balance: 1,
            chain_id: None,
            standard: None,
        });
        let ctx = RequestContext {
            did: Some("did:web:holder".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            pipe.evaluate(&gate, &ctx).unwrap_err(),
            GovernanceError::GateDenied { .. }
        ));
        pipe.wallets.add_tokens("did:web:holder", "hyprpass", 1).unwrap();
        assert!(matches!(
            pipe.evaluate(&gate, &ctx).unwrap(),
            Outcome::Granted { .. }
        ));
    }

    #[test]
    fn test_all_of_returns_invoice_before_grant() {
        let pipe = pipeline();
        pipe.wallets.create_if_absent("did:web:p");
        pipe.wallets.add_tokens("did:web:p", "hyprpass", 5).unwrap();
        let combined = Constraint::AllOf(vec![
            Constraint::TokenGate(TokenGateConstraint {
                required_token: "hyprpass".to_string(),
                min_balance: 1,
                chain_id: None,
                standard: None,
            }),
            paid_constraint(50),
        ]);
        let ctx = RequestContext {
            did: Some("did:web:p".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            pipe.evaluate(&combined, &ctx).unwrap(),
            Outcome::PaymentRequired(_)
        ));
    }

    #[test]
    fn test_any_of_grants_when_one_branch_passes() {
        let pipe = pipeline();
        pipe.wallets.create_if_absent("did:web:p");
        pipe.wallets.add_tokens("did:web:p", "hyprpass", 1).unwrap();
        let either = Constraint::AnyOf(vec![
            paid_constraint(100),
            Constraint::TokenGate(TokenGateConstraint {
                required_token: "hyprpass".to_string(),
                min_balance: 1,
                chain_id: None,
                standard: None,
            }),
        ]);
        let ctx = RequestContext {
            did: Some("did:web:p".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            pipe.evaluate(&either, &ctx).unwrap(),
            Outcome::Granted { .. }
        ));
    }

    #[test]
    fn test_policy_prohibition_denies() {
        let pipe = pipeline();
        let policy = Constraint::from_value(&json!({
            "@type": "odrl:Policy",
            "odrl:prohibition": [{
                "target": "https://h/nodes/secret",
                "action": "odrl:read"
            }]
        }))
        .unwrap();
        let ctx = RequestContext {
            did: Some("did:web:p".to_string()),
            action: Some("odrl:read".to_string()),
            target: Some("https://h/nodes/secret".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            pipe.evaluate(&policy, &ctx).unwrap_err(),
            GovernanceError::PolicyDenied(_)
        ));
    }
}
