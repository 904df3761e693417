//! Elliptic-curve Diffie–Hellman.
//!
//! NIST curves exchange SEC1 uncompressed points; x25519 exchanges raw
//! 32-byte Montgomery u-coordinates. The shared secret is the raw
//! x-coordinate (or u-coordinate) of the agreed point.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;

use crate::buffer::{PublicKey, SharedSecret, SupplementalData};
use crate::error::SecurityError;
use crate::suite::CipherSuite;

const P256_POINT_SIZE: usize = 65;
const P384_POINT_SIZE: usize = 97;
const X25519_KEY_SIZE: usize = 32;

enum KeyMaterial {
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
    // Consumed by the dalek API on agreement.
    X25519(Option<x25519_dalek::EphemeralSecret>),
}

/// Elliptic-curve model state: the curve keypair generated at setup.
pub struct EllipticCurveModel {
    keys: Option<KeyMaterial>,
}

impl EllipticCurveModel {
    pub fn new() -> Self {
        Self { keys: None }
    }

    pub fn is_supported(agreement: &str) -> bool {
        matches!(agreement, "ecdh-p-256" | "ecdh-p-384" | "ecdh-x25519")
    }

    pub fn setup_key_exchange(&mut self, suite: &CipherSuite) -> Result<PublicKey, SecurityError> {
        match suite.key_agreement_name() {
            "ecdh-p-256" => {
                let secret = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false);
                self.keys = Some(KeyMaterial::P256(secret));
                Ok(PublicKey::new(point.as_bytes().to_vec()))
            }
            "ecdh-p-384" => {
                let secret = p384::ecdh::EphemeralSecret::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false);
                self.keys = Some(KeyMaterial::P384(secret));
                Ok(PublicKey::new(point.as_bytes().to_vec()))
            }
            "ecdh-x25519" => {
                let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let public = x25519_dalek::PublicKey::from(&secret);
                self.keys = Some(KeyMaterial::X25519(Some(secret)));
                Ok(PublicKey::new(public.as_bytes().to_vec()))
            }
            other => Err(SecurityError::UnknownAlgorithm(other.to_string())),
        }
    }

    pub fn compute_shared_secret(
        &mut self,
        peer_public_key: &PublicKey,
    ) -> Result<(SharedSecret, SupplementalData), SecurityError> {
        let keys = self.keys.as_mut().ok_or(SecurityError::NotReady("key exchange not set up"))?;

        let shared = match keys {
            KeyMaterial::P256(secret) => {
                if peer_public_key.len() != P256_POINT_SIZE {
                    return Err(SecurityError::Malformed("public key size"));
                }
                let peer = p256::PublicKey::from_sec1_bytes(peer_public_key.as_slice())
                    .map_err(|_| SecurityError::Backend("peer point rejected"))?;
                secret.diffie_hellman(&peer).raw_secret_bytes().to_vec()
            }
            KeyMaterial::P384(secret) => {
                if peer_public_key.len() != P384_POINT_SIZE {
                    return Err(SecurityError::Malformed("public key size"));
                }
                let peer = p384::PublicKey::from_sec1_bytes(peer_public_key.as_slice())
                    .map_err(|_| SecurityError::Backend("peer point rejected"))?;
                secret.diffie_hellman(&peer).raw_secret_bytes().to_vec()
            }
            KeyMaterial::X25519(secret) => {
                if peer_public_key.len() != X25519_KEY_SIZE {
                    return Err(SecurityError::Malformed("public key size"));
                }
                let mut peer_bytes = [0u8; X25519_KEY_SIZE];
                peer_bytes.copy_from_slice(peer_public_key.as_slice());
                let peer = x25519_dalek::PublicKey::from(peer_bytes);
                let secret = secret
                    .take()
                    .ok_or(SecurityError::NotReady("agreement already consumed"))?;
                secret.diffie_hellman(&peer).as_bytes().to_vec()
            }
        };

        Ok((SharedSecret::new(shared), SupplementalData::empty()))
    }
}

impl Default for EllipticCurveModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::ConfidentialityLevel;

    fn suite(agreement: &str) -> CipherSuite {
        CipherSuite::new(ConfidentialityLevel::High, agreement, "aes-256-ctr", "sha384").unwrap()
    }

    fn exchange(agreement: &str, expected_key_size: usize, expected_secret_size: usize) {
        let mut alpha = EllipticCurveModel::new();
        let mut omega = EllipticCurveModel::new();
        let suite = suite(agreement);

        let alpha_public = alpha.setup_key_exchange(&suite).unwrap();
        let omega_public = omega.setup_key_exchange(&suite).unwrap();
        assert_eq!(alpha_public.len(), expected_key_size);

        let (alpha_secret, supplemental) = alpha.compute_shared_secret(&omega_public).unwrap();
        let (omega_secret, _) = omega.compute_shared_secret(&alpha_public).unwrap();
        assert!(supplemental.is_empty());
        assert_eq!(alpha_secret.as_slice(), omega_secret.as_slice());
        assert_eq!(alpha_secret.len(), expected_secret_size);
    }

    #[test]
    fn p256_exchange_agrees() {
        exchange("ecdh-p-256", 65, 32);
    }

    #[test]
    fn p384_exchange_agrees() {
        exchange("ecdh-p-384", 97, 48);
    }

    #[test]
    fn x25519_exchange_agrees() {
        exchange("ecdh-x25519", 32, 32);
    }

    #[test]
    fn malformed_point_is_rejected() {
        let mut model = EllipticCurveModel::new();
        model.setup_key_exchange(&suite("ecdh-p-256")).unwrap();
        // Right length, not a curve point.
        let bogus = PublicKey::new(vec![0x05; 65]);
        assert!(model.compute_shared_secret(&bogus).is_err());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut model = EllipticCurveModel::new();
        model.setup_key_exchange(&suite("ecdh-p-384")).unwrap();
        let short = PublicKey::new(vec![0x04; 65]);
        assert!(matches!(
            model.compute_shared_secret(&short),
            Err(SecurityError::Malformed(_))
        ));
    }
}
