//! Key custody for one exchange.
//!
//! The keystore owns the local public key, the peer's public key once it
//! arrives, the concatenated session salt, and the principal key derived
//! from the shared secret. Content and signature keys are not copied out:
//! they are cordons naming fixed ranges of the principal key, resolved on
//! demand and erased with it.
//!
//! The principal key sectors are fixed between roles:
//!   1. initiator content key
//!   2. acceptor content key
//!   3. initiator signature key
//!   4. acceptor signature key
//! Cordons are assigned by the caller's role so that "own" and "peer" on
//! both sides name the same bytes, mirrored.

use zeroize::Zeroize;

use crate::buffer::{
    EncryptionKey, PrincipalKey, PublicKey, Salt, SecureBuffer, SharedSecret, SignatureKey,
};
use crate::digest::shake256_expand;
use crate::error::SecurityError;
use crate::suite::CipherSuite;

/// Width of each participant's random salt half, of the verification seed
/// sector, and of the verification plaintext.
pub const PRINCIPAL_RANDOM_SIZE: usize = 32;

/// 128-bit floor for derived content and signature keys.
const MINIMUM_KEY_SIZE: usize = 16;

/// Domain separator mixed into the verification plaintext.
const VERIFICATION_SEED: &[u8] = b"verify";

/// Which side of the exchange this synchronizer drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeRole {
    Initiator,
    Acceptor,
}

pub struct KeyStore {
    public_key: PublicKey,
    peer_public_key: Option<PublicKey>,
    salt: Salt,
    principal_key: Option<PrincipalKey>,
    content_key: Option<EncryptionKey>,
    peer_content_key: Option<EncryptionKey>,
    signature_key: Option<SignatureKey>,
    peer_signature_key: Option<SignatureKey>,
    has_generated_keys: bool,
}

impl KeyStore {
    /// Take custody of the local public key and generate this side's salt
    /// half.
    pub fn new(public_key: PublicKey) -> Result<Self, SecurityError> {
        if public_key.is_empty() {
            return Err(SecurityError::NotReady("empty public key"));
        }

        let mut salt = vec![0u8; PRINCIPAL_RANDOM_SIZE];
        getrandom::getrandom(&mut salt).map_err(|_| SecurityError::Backend("salt generation"))?;

        Ok(Self {
            public_key,
            peer_public_key: None,
            salt: Salt::new(salt),
            principal_key: None,
            content_key: None,
            peer_content_key: None,
            signature_key: None,
            peer_signature_key: None,
            has_generated_keys: false,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_size(&self) -> usize {
        self.public_key.len()
    }

    pub fn peer_public_key(&self) -> Option<&PublicKey> {
        self.peer_public_key.as_ref()
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn salt_size(&self) -> usize {
        self.salt.len()
    }

    pub fn has_generated_keys(&self) -> bool {
        self.has_generated_keys
    }

    pub fn set_peer_public_key(&mut self, public_key: PublicKey) {
        self.peer_public_key = Some(public_key);
    }

    /// New salt = `peer ‖ own`. The initiator's composition.
    pub fn prepend_session_salt(&mut self, peer_salt: &Salt) {
        self.salt.prepend(peer_salt);
    }

    /// New salt = `own ‖ peer`. The acceptor's composition.
    pub fn append_session_salt(&mut self, peer_salt: &Salt) {
        self.salt.append(peer_salt);
    }

    /// Derive the principal key from the shared secret and session salt,
    /// partition the cordons for `role`, and return the verification
    /// plaintext that proves the derivation to the peer.
    pub fn generate_session_keys(
        &mut self,
        role: ExchangeRole,
        suite: &CipherSuite,
        shared_secret: SharedSecret,
    ) -> Result<SecureBuffer, SecurityError> {
        let content_key_size = suite.encryption_key_size();
        let signature_key_size = suite.signature_key_size();

        if content_key_size < MINIMUM_KEY_SIZE || signature_key_size < MINIMUM_KEY_SIZE {
            return Err(SecurityError::Backend("key size below the security floor"));
        }

        let partitioned = 2 * content_key_size + 2 * signature_key_size;
        let total = partitioned + PRINCIPAL_RANDOM_SIZE;

        // The raw shared secret is statistically strong but not uniform;
        // expand secret ‖ salt through the XOF into key-grade bytes.
        let mut derivation = Vec::with_capacity(shared_secret.len() + self.salt.len());
        derivation.extend_from_slice(shared_secret.as_slice());
        derivation.extend_from_slice(self.salt.as_slice());
        let mut derived = shake256_expand(&derivation, total);
        derivation.zeroize();
        drop(shared_secret);

        if derived.len() != total {
            derived.zeroize();
            return Err(SecurityError::Backend("session key derivation"));
        }

        let principal = PrincipalKey::from_buffer(SecureBuffer::from_vec(derived));

        let offset = match role {
            ExchangeRole::Initiator => {
                self.set_initiator_key_cordons(content_key_size, signature_key_size)
            }
            ExchangeRole::Acceptor => {
                self.set_acceptor_key_cordons(content_key_size, signature_key_size)
            }
        };
        debug_assert_eq!(offset, partitioned);

        let verification = principal
            .cordon(partitioned, PRINCIPAL_RANDOM_SIZE)
            .map(|seed| {
                let mut input = Vec::with_capacity(seed.len() + VERIFICATION_SEED.len());
                input.extend_from_slice(seed);
                input.extend_from_slice(VERIFICATION_SEED);
                let plaintext = shake256_expand(&input, PRINCIPAL_RANDOM_SIZE);
                input.zeroize();
                SecureBuffer::from_vec(plaintext)
            })
            .ok_or(SecurityError::Backend("verification data derivation"))?;

        self.principal_key = Some(principal);
        self.has_generated_keys = true;
        Ok(verification)
    }

    /// Resolve the local content-key cordon.
    pub fn content_key(&self) -> Option<&[u8]> {
        self.resolve_encryption(self.content_key)
    }

    /// Resolve the peer content-key cordon.
    pub fn peer_content_key(&self) -> Option<&[u8]> {
        self.resolve_encryption(self.peer_content_key)
    }

    /// Resolve the local signature-key cordon.
    pub fn signature_key(&self) -> Option<&[u8]> {
        self.resolve_signature(self.signature_key)
    }

    /// Resolve the peer signature-key cordon.
    pub fn peer_signature_key(&self) -> Option<&[u8]> {
        self.resolve_signature(self.peer_signature_key)
    }

    /// Zeroize everything and reset the store to its unkeyed state.
    pub fn erase(&mut self) {
        if let Some(mut key) = self.peer_public_key.take() {
            key.erase();
        }
        self.salt.erase();
        if let Some(mut principal) = self.principal_key.take() {
            principal.erase();
        }
        if let Some(mut cordon) = self.content_key.take() {
            cordon.erase();
        }
        if let Some(mut cordon) = self.peer_content_key.take() {
            cordon.erase();
        }
        if let Some(mut cordon) = self.signature_key.take() {
            cordon.erase();
        }
        if let Some(mut cordon) = self.peer_signature_key.take() {
            cordon.erase();
        }
        self.has_generated_keys = false;
    }

    fn resolve_encryption(&self, cordon: Option<EncryptionKey>) -> Option<&[u8]> {
        let principal = self.principal_key.as_ref()?;
        cordon?.resolve(principal)
    }

    fn resolve_signature(&self, cordon: Option<SignatureKey>) -> Option<&[u8]> {
        let principal = self.principal_key.as_ref()?;
        cordon?.resolve(principal)
    }

    fn set_initiator_key_cordons(&mut self, content: usize, signature: usize) -> usize {
        let mut offset = 0;
        self.content_key = Some(EncryptionKey::new(offset, content));
        offset += content;
        self.peer_content_key = Some(EncryptionKey::new(offset, content));
        offset += content;
        self.signature_key = Some(SignatureKey::new(offset, signature));
        offset += signature;
        self.peer_signature_key = Some(SignatureKey::new(offset, signature));
        offset += signature;
        offset
    }

    fn set_acceptor_key_cordons(&mut self, content: usize, signature: usize) -> usize {
        let mut offset = 0;
        self.peer_content_key = Some(EncryptionKey::new(offset, content));
        offset += content;
        self.content_key = Some(EncryptionKey::new(offset, content));
        offset += content;
        self.peer_signature_key = Some(SignatureKey::new(offset, signature));
        offset += signature;
        self.signature_key = Some(SignatureKey::new(offset, signature));
        offset += signature;
        offset
    }
}

impl Drop for KeyStore {
    fn drop(&mut self) {
        self.erase();
    }
}
