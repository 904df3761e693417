//! Crate-wide error type.
//!
//! Every fallible operation surfaces a `SecurityError`; nothing is recovered
//! internally. Failures on the decrypt path all collapse into
//! `DecryptionFailed` so callers cannot distinguish a bad tag from a bad
//! length from a bad key (oracle discipline).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// An algorithm name is not implemented by the crypto backend.
    UnknownAlgorithm(String),
    /// An algorithm is implemented but disallowed by the local catalog.
    RejectedAlgorithm(String),
    /// Length fields, list counts, or buffer bounds inconsistent with the protocol.
    Malformed(&'static str),
    /// A backend primitive (key generation, derivation, encryption) failed.
    Backend(&'static str),
    /// Ciphertext could not be decrypted. Covers AEAD tag mismatch.
    DecryptionFailed,
    /// A transcript signature or verification-data comparison failed.
    VerificationFailed,
    /// The operation requires generated session keys or a non-empty buffer.
    NotReady(&'static str),
    /// `synchronize` was called after the exchange reached a terminal stage.
    InvalidStage,
    /// An exchange for this address is already resolving; do not retry concurrently.
    ExchangeInProgress(String),
    /// The exchange outlived its allotted window.
    Expired,
}

impl fmt::Display for SecurityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown algorithm: {}", name),
            Self::RejectedAlgorithm(name) => write!(f, "algorithm rejected by catalog: {}", name),
            Self::Malformed(detail) => write!(f, "malformed handshake data: {}", detail),
            Self::Backend(detail) => write!(f, "crypto backend failure: {}", detail),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::VerificationFailed => write!(f, "verification failed"),
            Self::NotReady(detail) => write!(f, "not ready: {}", detail),
            Self::InvalidStage => write!(f, "synchronizer invoked in a terminal stage"),
            Self::ExchangeInProgress(address) => {
                write!(f, "an exchange is already resolving for {}", address)
            }
            Self::Expired => write!(f, "exchange expired"),
        }
    }
}

impl std::error::Error for SecurityError {}
