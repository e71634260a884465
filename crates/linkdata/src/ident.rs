//! Identifier classification.
//!
//! Three identifier families are distinguished by prefix alone; seed data
//! mixes `did:web:` and `http` forms so no structural heuristics are applied.

/// Identifier family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    /// Dereferenceable http/https URL.
    Iri,
    /// Decentralized identifier (`did:<method>:<id>`).
    Did,
    /// URN (`urn:<ns>:<suffix>`).
    Urn,
    /// Anything else.
    Opaque,
}

impl IdKind {
    /// Classify an identifier string by prefix.
    pub fn classify(id: &str) -> Self {
        if id.starts_with("http://") || id.starts_with("https://") {
            Self::Iri
        } else if id.starts_with("did:") {
            Self::Did
        } else if id.starts_with("urn:") {
            Self::Urn
        } else {
            Self::Opaque
        }
    }

    /// True for identifiers the store accepts as resource ids.
    pub fn is_addressable(self) -> bool {
        matches!(self, Self::Iri | Self::Did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_prefix() {
        assert_eq!(IdKind::classify("https://host/x"), IdKind::Iri);
        assert_eq!(IdKind::classify("did:web:host"), IdKind::Did);
        assert_eq!(IdKind::classify("urn:uuid:1234"), IdKind::Urn);
        assert_eq!(IdKind::classify("plain-string"), IdKind::Opaque);
    }

    #[test]
    fn test_addressable() {
        assert!(IdKind::classify("did:key:z6Mk").is_addressable());
        assert!(IdKind::classify("http://h/r").is_addressable());
        assert!(!IdKind::classify("urn:uuid:1").is_addressable());
    }
}
