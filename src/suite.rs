//! Cipher suite: the negotiated `(level, key agreement, cipher, hash)`
//! tuple and the cached sizes the record layer needs.

use std::cmp::Ordering;

use crate::cipher::CipherAlgorithm;
use crate::digest::HashAlgorithm;
use crate::error::SecurityError;

// ---------------------------------------------------------------------------
// Confidentiality level
// ---------------------------------------------------------------------------

/// Tier a suite may be used at. The negotiated suite's level is the minimum
/// over its three components' catalog levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfidentialityLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidentialityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cipher suite
// ---------------------------------------------------------------------------

/// Immutable description of a negotiated suite. Construction resolves the
/// cipher and hash names against the backend and caches their metadata;
/// the key-agreement name is validated separately when its model is built.
#[derive(Clone, Debug)]
pub struct CipherSuite {
    level: ConfidentialityLevel,
    agreement: String,
    cipher: String,
    hash: String,

    cipher_algorithm: CipherAlgorithm,
    hash_algorithm: HashAlgorithm,

    encryption_key_size: usize,
    iv_size: usize,
    block_size: usize,
    pads_input: bool,
    is_authenticated: bool,
    needs_generated_iv: bool,
    tag_size: usize,
    signature_size: usize,
}

impl CipherSuite {
    pub fn new(
        level: ConfidentialityLevel,
        agreement: &str,
        cipher: &str,
        hash: &str,
    ) -> Result<Self, SecurityError> {
        if agreement.is_empty() || cipher.is_empty() || hash.is_empty() {
            return Err(SecurityError::UnknownAlgorithm(String::new()));
        }

        let cipher_algorithm = CipherAlgorithm::from_name(cipher)?;
        let hash_algorithm = HashAlgorithm::from_name(hash)?;

        let is_authenticated = cipher_algorithm.is_authenticated();

        // AEAD modes normally derive their IV inside the backend; the
        // exceptions take a caller-supplied nonce.
        let mut needs_generated_iv = !is_authenticated;
        if is_authenticated {
            for marker in ["ccm", "ocb", "chacha"] {
                if cipher.contains(marker) {
                    needs_generated_iv = true;
                    break;
                }
            }
        }

        Ok(Self {
            level,
            agreement: agreement.to_string(),
            cipher: cipher.to_string(),
            hash: hash.to_string(),
            cipher_algorithm,
            hash_algorithm,
            encryption_key_size: cipher_algorithm.key_size(),
            iv_size: cipher_algorithm.iv_size(),
            block_size: cipher_algorithm.block_size(),
            pads_input: cipher_algorithm.pads_input(),
            is_authenticated,
            needs_generated_iv,
            tag_size: cipher_algorithm.tag_size(),
            signature_size: hash_algorithm.output_size(),
        })
    }

    pub fn level(&self) -> ConfidentialityLevel {
        self.level
    }

    pub fn key_agreement_name(&self) -> &str {
        &self.agreement
    }

    pub fn cipher_name(&self) -> &str {
        &self.cipher
    }

    pub fn hash_function_name(&self) -> &str {
        &self.hash
    }

    pub fn cipher_algorithm(&self) -> CipherAlgorithm {
        self.cipher_algorithm
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn encryption_key_size(&self) -> usize {
        self.encryption_key_size
    }

    pub fn initialization_vector_size(&self) -> usize {
        self.iv_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn pads_input(&self) -> bool {
        self.pads_input
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn needs_generated_iv(&self) -> bool {
        self.needs_generated_iv
    }

    pub fn tag_size(&self) -> usize {
        self.tag_size
    }

    /// HMAC output size; also the size of each derived signature key.
    pub fn signature_size(&self) -> usize {
        self.signature_size
    }

    pub fn signature_key_size(&self) -> usize {
        self.signature_size
    }

    /// Size of the record produced by encrypting `size` plaintext bytes:
    /// `body ‖ iv ‖ tag?`. Zero in, zero out.
    pub fn encrypted_size(&self, size: usize) -> usize {
        if size == 0 {
            return 0;
        }

        let mut encrypted = size + self.iv_size;
        if self.pads_input {
            encrypted += self.block_size - (size % self.block_size);
        }
        if self.is_authenticated {
            encrypted += self.tag_size;
        }
        encrypted
    }
}

impl PartialEq for CipherSuite {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level
            && self.agreement == other.agreement
            && self.cipher == other.cipher
            && self.hash == other.hash
    }
}

impl Eq for CipherSuite {}

impl PartialOrd for CipherSuite {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CipherSuite {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.level, &self.agreement, &self.cipher, &self.hash).cmp(&(
            other.level,
            &other.agreement,
            &other.cipher,
            &other.hash,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(cipher: &str, hash: &str) -> CipherSuite {
        CipherSuite::new(ConfidentialityLevel::High, "ecdh-p-384", cipher, hash).unwrap()
    }

    #[test]
    fn ctr_suite_metadata() {
        let suite = suite("aes-256-ctr", "sha384");
        assert_eq!(suite.encryption_key_size(), 32);
        assert_eq!(suite.initialization_vector_size(), 16);
        assert!(!suite.pads_input());
        assert!(!suite.is_authenticated());
        assert!(suite.needs_generated_iv());
        assert_eq!(suite.tag_size(), 0);
        assert_eq!(suite.signature_size(), 48);
    }

    #[test]
    fn gcm_suite_metadata() {
        let suite = suite("aes-256-gcm", "sha256");
        assert!(suite.is_authenticated());
        assert!(!suite.needs_generated_iv());
        assert_eq!(suite.tag_size(), 16);
        assert_eq!(suite.initialization_vector_size(), 12);
    }

    #[test]
    fn chacha_requires_caller_nonce() {
        let suite = suite("chacha20-poly1305", "sha512");
        assert!(suite.is_authenticated());
        assert!(suite.needs_generated_iv());
    }

    #[test]
    fn encrypted_size_ctr() {
        let suite = suite("aes-256-ctr", "sha384");
        assert_eq!(suite.encrypted_size(0), 0);
        assert_eq!(suite.encrypted_size(12), 28);
        assert_eq!(suite.encrypted_size(32), 48);
    }

    #[test]
    fn encrypted_size_cbc_pads() {
        let suite = suite("aes-256-cbc", "sha256");
        // 12 + pad(4) + iv(16)
        assert_eq!(suite.encrypted_size(12), 44);
        // Whole block still gains a padding block.
        assert_eq!(suite.encrypted_size(16), 48);
    }

    #[test]
    fn encrypted_size_gcm_adds_tag() {
        let suite = suite("aes-256-gcm", "sha256");
        assert_eq!(suite.encrypted_size(12), 12 + 12 + 16);
    }

    #[test]
    fn empty_names_are_rejected() {
        assert!(CipherSuite::new(ConfidentialityLevel::Low, "", "aes-256-ctr", "sha256").is_err());
        assert!(CipherSuite::new(ConfidentialityLevel::Low, "ecdh-p-256", "", "sha256").is_err());
        assert!(CipherSuite::new(ConfidentialityLevel::Low, "ecdh-p-256", "aes-256-ctr", "").is_err());
    }

    #[test]
    fn ordering_is_level_first() {
        let low = CipherSuite::new(ConfidentialityLevel::Low, "z", "aes-256-gcm", "sha512").unwrap();
        let high = CipherSuite::new(ConfidentialityLevel::High, "a", "aes-128-ctr", "sha256").unwrap();
        assert!(low < high);
    }
}
