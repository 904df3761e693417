//! State shared between synchronization stages.
//!
//! The context carries what the role executors hand back and forth: the
//! catalog handle, the selected suite, the keystore while keys are being
//! assembled, and the finalized cipher package afterwards. Generating
//! session keys moves the keystore into the package; the keystore is never
//! usable from the context again.

use std::sync::{Arc, Weak};

use crate::buffer::{PublicKey, Salt, SecureBuffer, SharedSecret};
use crate::catalog::{AlgorithmCategory, SupportedAlgorithms};
use crate::error::SecurityError;
use crate::keystore::{ExchangeRole, KeyStore, PRINCIPAL_RANDOM_SIZE};
use crate::package::{CipherPackage, VerificationStatus};
use crate::suite::CipherSuite;

pub struct SynchronizerContext {
    role: ExchangeRole,
    supported_algorithms: Weak<SupportedAlgorithms>,
    /// Packed proposal computed once at construction; no process-global
    /// cache.
    proposal: Vec<u8>,
    suite: Option<CipherSuite>,
    keystore: Option<KeyStore>,
    verification_data: Option<SecureBuffer>,
    package: Option<CipherPackage>,
}

impl SynchronizerContext {
    pub fn new(role: ExchangeRole, supported_algorithms: Weak<SupportedAlgorithms>) -> Self {
        let proposal = supported_algorithms
            .upgrade()
            .map(|catalog| catalog.pack_proposal())
            .unwrap_or_default();

        Self {
            role,
            supported_algorithms,
            proposal,
            suite: None,
            keystore: None,
            verification_data: None,
            package: None,
        }
    }

    pub fn role(&self) -> ExchangeRole {
        self.role
    }

    pub fn supported_algorithms(&self) -> Option<Arc<SupportedAlgorithms>> {
        self.supported_algorithms.upgrade()
    }

    /// The packed supported-algorithms proposal. Empty means the catalog
    /// was gone at construction, which makes the exchange unstartable.
    pub fn proposal_frame(&self) -> Result<Vec<u8>, SecurityError> {
        if self.proposal.is_empty() {
            return Err(SecurityError::NotReady("no supported algorithms"));
        }
        Ok(self.proposal.clone())
    }

    pub fn suite(&self) -> Option<&CipherSuite> {
        self.suite.as_ref()
    }

    pub fn package(&self) -> Option<&CipherPackage> {
        self.package.as_ref()
    }

    pub fn is_package_ready(&self) -> bool {
        self.package.is_some()
    }

    /// Size of this side's public key; zero before the keystore exists.
    pub fn public_key_size(&self) -> usize {
        self.keystore.as_ref().map(KeyStore::public_key_size).unwrap_or(0)
    }

    /// Size of one salt half as exchanged on the wire.
    pub fn salt_size(&self) -> usize {
        PRINCIPAL_RANDOM_SIZE
    }

    pub fn signature_size(&self) -> usize {
        self.suite.as_ref().map(CipherSuite::signature_size).unwrap_or(0)
    }

    /// Wire size of the encrypted verification payload under the selected
    /// suite; zero before selection.
    pub fn verification_data_size(&self) -> usize {
        self.suite
            .as_ref()
            .map(|suite| suite.encrypted_size(PRINCIPAL_RANDOM_SIZE))
            .unwrap_or(0)
    }

    /// Build the suite for the peer-chosen component names, at the minimum
    /// of their catalog levels. A name missing from the catalog means the
    /// peer is negotiating outside our declared support.
    pub fn create_mutual_suite(
        &self,
        key_agreement: &str,
        cipher: &str,
        hash_function: &str,
    ) -> Result<CipherSuite, SecurityError> {
        let catalog = self
            .supported_algorithms()
            .ok_or(SecurityError::NotReady("supported algorithms released"))?;

        let agreement_level = catalog
            .level_of(AlgorithmCategory::KeyAgreement, key_agreement)
            .ok_or_else(|| SecurityError::RejectedAlgorithm(key_agreement.to_string()))?;
        let cipher_level = catalog
            .level_of(AlgorithmCategory::Cipher, cipher)
            .ok_or_else(|| SecurityError::RejectedAlgorithm(cipher.to_string()))?;
        let hash_level = catalog
            .level_of(AlgorithmCategory::HashFunction, hash_function)
            .ok_or_else(|| SecurityError::RejectedAlgorithm(hash_function.to_string()))?;

        // One weak component degrades the whole suite.
        let level = agreement_level.min(cipher_level).min(hash_level);

        CipherSuite::new(level, key_agreement, cipher, hash_function)
    }

    /// Adopt the selected suite and stand up the keystore around this
    /// side's public key. Returns the salt half to place on the wire.
    pub fn setup_key_share(
        &mut self,
        suite: CipherSuite,
        public_key: PublicKey,
    ) -> Result<&Salt, SecurityError> {
        self.suite = Some(suite);
        self.keystore = Some(KeyStore::new(public_key)?);
        self.keystore
            .as_ref()
            .map(KeyStore::salt)
            .ok_or(SecurityError::Backend("keystore unavailable"))
    }

    /// Store the peer's public key and fold its salt half into the session
    /// salt on the role's side.
    pub fn set_peer_public_key_and_salt(
        &mut self,
        public_key: PublicKey,
        salt: &Salt,
    ) -> Result<(), SecurityError> {
        let keystore =
            self.keystore.as_mut().ok_or(SecurityError::NotReady("keystore unavailable"))?;
        keystore.set_peer_public_key(public_key);
        match self.role {
            ExchangeRole::Initiator => keystore.prepend_session_salt(salt),
            ExchangeRole::Acceptor => keystore.append_session_salt(salt),
        }
        Ok(())
    }

    /// Derive the session keys, move the keystore into a cipher package,
    /// and return the encrypted verification payload for the peer. The
    /// keystore is unavailable from here on.
    pub fn generate_session_keys(
        &mut self,
        shared_secret: SharedSecret,
    ) -> Result<Vec<u8>, SecurityError> {
        let suite = self.suite.clone().ok_or(SecurityError::NotReady("no suite selected"))?;
        let mut keystore =
            self.keystore.take().ok_or(SecurityError::NotReady("keystore unavailable"))?;

        let verification = keystore.generate_session_keys(self.role, &suite, shared_secret)?;
        let package = CipherPackage::new(suite, keystore);
        let encrypted = package.encrypt(verification.as_slice())?;

        self.verification_data = Some(verification);
        self.package = Some(package);
        Ok(encrypted)
    }

    /// Decrypt the peer's verification payload and compare it against our
    /// derived plaintext in constant time.
    pub fn verify_key_share(&self, encrypted: &[u8]) -> VerificationStatus {
        match (&self.package, &self.verification_data) {
            (Some(package), Some(expected)) => package.verify_key_share(encrypted, expected),
            _ => VerificationStatus::Failed,
        }
    }

    /// Transfer the cipher package out. The context is inert afterwards.
    pub fn release_package(&mut self) -> Option<CipherPackage> {
        self.package.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Algorithms;
    use crate::suite::ConfidentialityLevel;

    fn catalog() -> Arc<SupportedAlgorithms> {
        let mut catalog = SupportedAlgorithms::new();
        catalog.insert(
            ConfidentialityLevel::Medium,
            Algorithms::new(vec!["ecdh-p-256"], vec!["aes-128-ctr"], vec!["sha256"]),
        );
        catalog.insert(
            ConfidentialityLevel::High,
            Algorithms::new(vec!["ecdh-p-384"], vec!["aes-256-ctr"], vec!["sha384"]),
        );
        Arc::new(catalog)
    }

    #[test]
    fn mutual_suite_takes_the_level_floor() {
        let catalog = catalog();
        let context = SynchronizerContext::new(ExchangeRole::Initiator, Arc::downgrade(&catalog));
        let suite = context.create_mutual_suite("ecdh-p-384", "aes-128-ctr", "sha384").unwrap();
        assert_eq!(suite.level(), ConfidentialityLevel::Medium);
    }

    #[test]
    fn uncataloged_component_is_rejected() {
        let catalog = catalog();
        let context = SynchronizerContext::new(ExchangeRole::Initiator, Arc::downgrade(&catalog));
        assert!(matches!(
            context.create_mutual_suite("ecdh-x25519", "aes-256-ctr", "sha384"),
            Err(SecurityError::RejectedAlgorithm(_))
        ));
    }

    #[test]
    fn released_catalog_blocks_the_exchange() {
        let catalog = catalog();
        let weak = Arc::downgrade(&catalog);
        drop(catalog);
        let context = SynchronizerContext::new(ExchangeRole::Initiator, weak);
        assert!(context.proposal_frame().is_err());
        assert!(context.create_mutual_suite("ecdh-p-384", "aes-256-ctr", "sha384").is_err());
    }

    #[test]
    fn verification_sizes_follow_the_suite() {
        let catalog = catalog();
        let mut context = SynchronizerContext::new(ExchangeRole::Acceptor, Arc::downgrade(&catalog));
        assert_eq!(context.verification_data_size(), 0);
        assert_eq!(context.signature_size(), 0);

        let suite = context.create_mutual_suite("ecdh-p-384", "aes-256-ctr", "sha384").unwrap();
        context.setup_key_share(suite, PublicKey::new(vec![0x11; 97])).unwrap();
        // 32 plaintext + 16 iv under aes-256-ctr.
        assert_eq!(context.verification_data_size(), 48);
        assert_eq!(context.signature_size(), 48);
        assert_eq!(context.public_key_size(), 97);
    }
}
