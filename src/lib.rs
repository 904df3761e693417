//! # Palisade
//!
//! Cipher-suite negotiation, hybrid classical/post-quantum key exchange,
//! and authenticated record protection for peer-to-peer mesh nodes.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use palisade::{
//!     Algorithms, ConfidentialityLevel, ExchangeRole, SupportedAlgorithms,
//!     SynchronizationStatus, Synchronizer,
//! };
//!
//! let mut catalog = SupportedAlgorithms::new();
//! catalog.insert(
//!     ConfidentialityLevel::High,
//!     Algorithms::new(vec!["ecdh-p-384"], vec!["aes-256-ctr"], vec!["sha384"]),
//! );
//! let catalog = Arc::new(catalog);
//!
//! let mut initiator = Synchronizer::new(ExchangeRole::Initiator, Arc::downgrade(&catalog));
//! let mut acceptor = Synchronizer::new(ExchangeRole::Acceptor, Arc::downgrade(&catalog));
//!
//! // proposal -> selection -> key exchange -> verification
//! let proposal = initiator.initialize();
//! let _ = acceptor.initialize(); // the acceptor emits nothing first
//! let selection = acceptor.synchronize(&proposal.message);
//! let exchange = initiator.synchronize(&selection.message);
//! let verification = acceptor.synchronize(&exchange.message);
//! let done = initiator.synchronize(&verification.message);
//!
//! assert_eq!(done.status, SynchronizationStatus::Ready);
//! let alpha = initiator.finalize().unwrap();
//! let omega = acceptor.finalize().unwrap();
//!
//! let record = alpha.encrypt(b"Hello World!").unwrap();
//! assert_eq!(omega.decrypt(&record).unwrap(), b"Hello World!");
//! ```
//!
//! ## Security Properties
//!
//! - **Hybrid-ready negotiation**: FFDH, ECDH, and ML-KEM agreements behind
//!   one catalog-driven selection rule
//! - **Transcript binding**: the final frames carry HMACs over every frame
//!   exchanged; tampering anywhere fails the handshake
//! - **Uniform decrypt errors**: tag mismatch, bad lengths, and bad keys
//!   are indistinguishable
//! - **Zeroization**: secret buffers are wiped on drop and on erase
//!
//! ## What's NOT Provided
//!
//! - Wire transport, routing, or peer discovery
//! - On-disk key persistence
//! - Certificate PKI or identity issuance

#![deny(unsafe_code)]

// ---------------------------------------------------------------------------
// Internal modules
// ---------------------------------------------------------------------------

mod agreement;
mod buffer;
mod catalog;
mod cipher;
mod digest;
mod error;
mod keystore;
mod mediator;
mod package;
mod suite;
mod synchronizer;
mod wire;

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

pub use buffer::{
    EncryptionKey, PrincipalKey, PublicKey, Salt, SecureBuffer, SharedSecret, SignatureKey,
    SupplementalData,
};
pub use catalog::{AlgorithmCategory, Algorithms, SupportedAlgorithms};
pub use error::SecurityError;
pub use keystore::{ExchangeRole, KeyStore, PRINCIPAL_RANDOM_SIZE};
pub use mediator::{
    ExchangeDisposition, ExchangeObserver, ExchangeProcessor, ExchangeStatus, Mediator,
    MessageSink, PeerProxy, SecurityState,
};
pub use package::{CipherPackage, VerificationStatus};
pub use suite::{CipherSuite, ConfidentialityLevel};
pub use synchronizer::{
    SynchronizationResult, SynchronizationStatus, Synchronizer, SynchronizerContext,
};
pub use wire::{
    MAX_ALGORITHMS_PER_CATEGORY, MAX_ALGORITHM_NAME_SIZE, MAX_PUBLIC_KEY_SIZE, MAX_SALT_SIZE,
};

pub use agreement::KeyAgreementModel;
