//! Error types for address and record handling

/// Errors raised while parsing a `kind:pubkey:identifier` address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Address must have three ':'-separated parts, got: {0}")]
    WrongShape(String),

    #[error("Invalid kind in address: {0}")]
    InvalidKind(String),

    #[error("Address has an empty public key: {0}")]
    EmptyPubkey(String),

    #[error("Address has an empty identifier: {0}")]
    EmptyIdentifier(String),
}

/// Errors raised while checking a record against what the caller expects
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("Expected record kind {expected}, found {found}")]
    WrongKind { expected: u32, found: u32 },
}
