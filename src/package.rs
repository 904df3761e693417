//! The cipher package: the only object application traffic touches.
//!
//! Binds a negotiated suite to the keystore it consumed. Records are laid
//! out `body ‖ iv ‖ tag?`; signatures are HMACs over the signed content
//! appended after it. Decrypt failures are uniform.

use subtle::ConstantTimeEq;

use crate::buffer::SecureBuffer;
use crate::cipher;
use crate::error::SecurityError;
use crate::keystore::KeyStore;
use crate::suite::CipherSuite;

/// Result of a signature or verification-data check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    Failed,
}

pub struct CipherPackage {
    suite: CipherSuite,
    store: KeyStore,
}

impl CipherPackage {
    /// Bind `suite` to the keystore, taking ownership of its secrets.
    pub fn new(suite: CipherSuite, store: KeyStore) -> Self {
        Self { suite, store }
    }

    pub fn suite(&self) -> &CipherSuite {
        &self.suite
    }

    /// Encrypt `plaintext` into a fresh record. Empty in, empty out.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let mut destination = Vec::new();
        self.encrypt_into(plaintext, &mut destination)?;
        Ok(destination)
    }

    /// Encrypt `plaintext`, appending the record to `destination`.
    pub fn encrypt_into(
        &self,
        plaintext: &[u8],
        destination: &mut Vec<u8>,
    ) -> Result<(), SecurityError> {
        if !self.store.has_generated_keys() {
            return Err(SecurityError::NotReady("session keys not generated"));
        }
        if plaintext.is_empty() {
            return Ok(());
        }

        let key = self
            .store
            .content_key()
            .ok_or(SecurityError::NotReady("content key unavailable"))?;
        debug_assert_eq!(key.len(), self.suite.encryption_key_size());

        let iv = cipher::random_iv(self.suite.initialization_vector_size())?;
        let (body, tag) = self.suite.cipher_algorithm().seal(key, &iv, plaintext)?;

        let expected = self.suite.encrypted_size(plaintext.len());
        debug_assert_eq!(body.len() + iv.len() + tag.len(), expected);

        destination.reserve(expected);
        destination.extend_from_slice(&body);
        destination.extend_from_slice(&iv);
        destination.extend_from_slice(&tag);
        Ok(())
    }

    /// Decrypt a record produced by the peer's mirrored package.
    pub fn decrypt(&self, buffer: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if !self.store.has_generated_keys() {
            return Err(SecurityError::NotReady("session keys not generated"));
        }

        let iv_size = self.suite.initialization_vector_size();
        let tag_size = self.suite.tag_size();
        let body_size = buffer
            .len()
            .checked_sub(iv_size + tag_size)
            .filter(|&size| size > 0)
            .ok_or(SecurityError::DecryptionFailed)?;

        let key = self.store.peer_content_key().ok_or(SecurityError::DecryptionFailed)?;

        let (body, trailer) = buffer.split_at(body_size);
        let (iv, tag) = trailer.split_at(iv_size);

        self.suite.cipher_algorithm().open(key, iv, body, tag)
    }

    /// Append an HMAC over the buffer's current content to the buffer.
    pub fn sign_buffer(&self, buffer: &mut Vec<u8>) -> Result<(), SecurityError> {
        let signature = self.signature_over(buffer)?;
        buffer.extend_from_slice(&signature);
        Ok(())
    }

    /// Append an HMAC over `source` to `destination`.
    pub fn sign(&self, source: &[u8], destination: &mut Vec<u8>) -> Result<(), SecurityError> {
        let signature = self.signature_over(source)?;
        destination.extend_from_slice(&signature);
        Ok(())
    }

    fn signature_over(&self, source: &[u8]) -> Result<Vec<u8>, SecurityError> {
        if !self.store.has_generated_keys() {
            return Err(SecurityError::NotReady("session keys not generated"));
        }
        if source.is_empty() {
            return Err(SecurityError::NotReady("empty signing input"));
        }

        let key = self
            .store
            .signature_key()
            .ok_or(SecurityError::NotReady("signature key unavailable"))?;
        debug_assert_eq!(key.len(), self.suite.signature_size());

        self.suite.hash_algorithm().hmac(key, source)
    }

    /// Check the trailing signature over the preceding content with the
    /// peer's signature key. Constant-time comparison; every failure mode
    /// reports the same status.
    pub fn verify(&self, buffer: &[u8]) -> VerificationStatus {
        if !self.store.has_generated_keys() {
            return VerificationStatus::Failed;
        }

        let signature_size = self.suite.signature_size();
        if buffer.len() <= signature_size {
            return VerificationStatus::Failed;
        }
        let content_size = buffer.len() - signature_size;

        let Some(key) = self.store.peer_signature_key() else {
            return VerificationStatus::Failed;
        };

        let Ok(expected) = self.suite.hash_algorithm().hmac(key, &buffer[..content_size]) else {
            return VerificationStatus::Failed;
        };

        if bool::from(expected.as_slice().ct_eq(&buffer[content_size..])) {
            VerificationStatus::Success
        } else {
            VerificationStatus::Failed
        }
    }

    /// Constant-time comparison of decrypted verification data against the
    /// locally derived plaintext.
    pub fn verify_key_share(
        &self,
        encrypted: &[u8],
        expected: &SecureBuffer,
    ) -> VerificationStatus {
        let Ok(decrypted) = self.decrypt(encrypted) else {
            return VerificationStatus::Failed;
        };
        if bool::from(decrypted.as_slice().ct_eq(expected.as_slice())) {
            VerificationStatus::Success
        } else {
            VerificationStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PublicKey, SharedSecret};
    use crate::keystore::ExchangeRole;
    use crate::suite::ConfidentialityLevel;

    fn package_pair(cipher: &str, hash: &str) -> (CipherPackage, CipherPackage) {
        let suite =
            CipherSuite::new(ConfidentialityLevel::High, "ecdh-p-384", cipher, hash).unwrap();

        let mut initiator = KeyStore::new(PublicKey::new(vec![0x11; 97])).unwrap();
        let mut acceptor = KeyStore::new(PublicKey::new(vec![0x22; 97])).unwrap();

        let initiator_half = initiator.salt().clone();
        let acceptor_half = acceptor.salt().clone();
        initiator.prepend_session_salt(&acceptor_half);
        acceptor.append_session_salt(&initiator_half);

        let secret = vec![0x77; 48];
        initiator
            .generate_session_keys(ExchangeRole::Initiator, &suite, SharedSecret::new(secret.clone()))
            .unwrap();
        acceptor
            .generate_session_keys(ExchangeRole::Acceptor, &suite, SharedSecret::new(secret))
            .unwrap();

        (CipherPackage::new(suite.clone(), initiator), CipherPackage::new(suite, acceptor))
    }

    #[test]
    fn round_trip_both_directions() {
        let (alpha, omega) = package_pair("aes-256-ctr", "sha384");
        let forward = alpha.encrypt(b"Hello World!").unwrap();
        assert_eq!(forward.len(), 28);
        assert_eq!(omega.decrypt(&forward).unwrap(), b"Hello World!");

        let backward = omega.encrypt(b"Hello World!").unwrap();
        assert_eq!(alpha.decrypt(&backward).unwrap(), b"Hello World!");
    }

    #[test]
    fn empty_plaintext_is_empty_record() {
        let (alpha, _) = package_pair("aes-256-ctr", "sha384");
        assert!(alpha.encrypt(b"").unwrap().is_empty());
    }

    #[test]
    fn encrypt_into_appends() {
        let (alpha, omega) = package_pair("aes-256-gcm", "sha256");
        let mut buffer = b"prefix".to_vec();
        alpha.encrypt_into(b"payload", &mut buffer).unwrap();
        assert_eq!(&buffer[..6], b"prefix");
        assert_eq!(omega.decrypt(&buffer[6..]).unwrap(), b"payload");
    }

    #[test]
    fn unkeyed_store_cannot_encrypt() {
        let suite =
            CipherSuite::new(ConfidentialityLevel::High, "ecdh-p-384", "aes-256-ctr", "sha384")
                .unwrap();
        let store = KeyStore::new(PublicKey::new(vec![0x11; 97])).unwrap();
        let package = CipherPackage::new(suite, store);
        assert!(matches!(package.encrypt(b"data"), Err(SecurityError::NotReady(_))));
    }

    #[test]
    fn aead_record_tamper_fails() {
        let (alpha, omega) = package_pair("aes-256-gcm", "sha256");
        let mut record = alpha.encrypt(b"tamper target").unwrap();
        let last = record.len() - 1;
        record[last] ^= 0x01;
        assert_eq!(omega.decrypt(&record), Err(SecurityError::DecryptionFailed));
    }

    #[test]
    fn stream_record_tamper_garbles() {
        let (alpha, omega) = package_pair("aes-256-ctr", "sha384");
        let mut record = alpha.encrypt(b"tamper target").unwrap();
        record[0] ^= 0x01;
        let plaintext = omega.decrypt(&record).unwrap();
        assert_ne!(plaintext, b"tamper target");
    }

    #[test]
    fn short_record_is_uniform_failure() {
        let (_, omega) = package_pair("aes-256-gcm", "sha256");
        assert_eq!(omega.decrypt(&[0u8; 5]), Err(SecurityError::DecryptionFailed));
        assert_eq!(omega.decrypt(&[]), Err(SecurityError::DecryptionFailed));
        // iv + tag with a zero-length body is also rejected.
        assert_eq!(omega.decrypt(&[0u8; 28]), Err(SecurityError::DecryptionFailed));
    }

    #[test]
    fn sign_verify_round_trip() {
        let (alpha, omega) = package_pair("aes-256-ctr", "sha384");
        let mut message = b"signed payload".to_vec();
        alpha.sign_buffer(&mut message).unwrap();
        assert_eq!(message.len(), 14 + 48);
        assert_eq!(omega.verify(&message), VerificationStatus::Success);
        assert_eq!(alpha.verify(&message), VerificationStatus::Failed);
    }

    #[test]
    fn signature_tamper_fails() {
        let (alpha, omega) = package_pair("aes-256-ctr", "sha384");
        let mut message = vec![0xA5; 1024];
        alpha.sign_buffer(&mut message).unwrap();

        let mut tampered_content = message.clone();
        tampered_content[10] ^= 0x01;
        assert_eq!(omega.verify(&tampered_content), VerificationStatus::Failed);

        let mut tampered_signature = message.clone();
        let last = tampered_signature.len() - 1;
        tampered_signature[last] ^= 0x01;
        assert_eq!(omega.verify(&tampered_signature), VerificationStatus::Failed);
    }

    #[test]
    fn verify_requires_content_beyond_signature() {
        let (alpha, _) = package_pair("aes-256-ctr", "sha384");
        assert_eq!(alpha.verify(&[0u8; 48]), VerificationStatus::Failed);
        assert_eq!(alpha.verify(&[]), VerificationStatus::Failed);
    }

    #[test]
    fn cbc_round_trip_recovers_exact_plaintext() {
        let (alpha, omega) = package_pair("aes-256-cbc", "sha256");
        let record = alpha.encrypt(b"block aligned!!!").unwrap();
        assert_eq!(record.len(), alpha.suite().encrypted_size(16));
        assert_eq!(omega.decrypt(&record).unwrap(), b"block aligned!!!");
    }
}
