//! Client event bus: a broadcast channel listeners subscribe to per kind.

/// Events emitted by the navigator while working.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// An outbound request is being sent.
    Request { method: String, url: String },
    /// A response arrived.
    Response { url: String, status: u16 },
    /// A 402 was encountered (before any auto-pay decision).
    PaymentRequired { url: String, amount: Option<u64> },
    /// The navigator moved to a new URL.
    Navigation { url: String },
}
