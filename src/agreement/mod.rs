//! Key-agreement models.
//!
//! Three families share one capability set: set up a key exchange and
//! produce a public key, then compute the shared secret either from the
//! peer's public key or, for encapsulation mechanisms, from the
//! supplemental ciphertext the initiator sent.
//!
//! The model is chosen by the key-agreement name's prefix before the first
//! `-`: `ffdhe`, `ecdh`, or `kem`. If no family claims the name,
//! negotiation fails.

mod ecdh;
mod ffdh;
mod kem;

pub use ecdh::EllipticCurveModel;
pub use ffdh::FiniteFieldModel;
pub use kem::KeyEncapsulationModel;

use crate::buffer::{PublicKey, SharedSecret, SupplementalData};
use crate::error::SecurityError;
use crate::suite::CipherSuite;

/// Dispatch over the supported key-agreement families.
pub enum KeyAgreementModel {
    FiniteField(FiniteFieldModel),
    EllipticCurve(EllipticCurveModel),
    Encapsulation(KeyEncapsulationModel),
}

impl KeyAgreementModel {
    /// Instantiate the family claiming `agreement`, verifying the full name
    /// is implemented.
    pub fn create(agreement: &str) -> Result<Self, SecurityError> {
        let family = agreement.split('-').next().unwrap_or(agreement);
        match family {
            "ffdhe" if FiniteFieldModel::is_supported(agreement) => {
                Ok(Self::FiniteField(FiniteFieldModel::new()))
            }
            "ecdh" if EllipticCurveModel::is_supported(agreement) => {
                Ok(Self::EllipticCurve(EllipticCurveModel::new()))
            }
            "kem" if KeyEncapsulationModel::is_supported(agreement) => {
                Ok(Self::Encapsulation(KeyEncapsulationModel::new()))
            }
            _ => Err(SecurityError::UnknownAlgorithm(agreement.to_string())),
        }
    }

    /// Generate this side's keypair for the suite's agreement and return the
    /// public key to place on the wire.
    pub fn setup_key_exchange(&mut self, suite: &CipherSuite) -> Result<PublicKey, SecurityError> {
        match self {
            Self::FiniteField(model) => model.setup_key_exchange(suite),
            Self::EllipticCurve(model) => model.setup_key_exchange(suite),
            Self::Encapsulation(model) => model.setup_key_exchange(suite),
        }
    }

    /// Compute the shared secret from the peer's public key. For the KEM
    /// family this is the initiator path and also yields the encapsulated
    /// ciphertext to forward as supplemental data.
    pub fn compute_shared_secret(
        &mut self,
        peer_public_key: &PublicKey,
    ) -> Result<(SharedSecret, SupplementalData), SecurityError> {
        match self {
            Self::FiniteField(model) => model.compute_shared_secret(peer_public_key),
            Self::EllipticCurve(model) => model.compute_shared_secret(peer_public_key),
            Self::Encapsulation(model) => model.compute_shared_secret(peer_public_key),
        }
    }

    /// Compute the shared secret from supplemental data (KEM decapsulation,
    /// acceptor path). The DH families have none and fail.
    pub fn compute_shared_secret_from_supplemental(
        &mut self,
        supplemental: &SupplementalData,
    ) -> Result<SharedSecret, SecurityError> {
        match self {
            Self::Encapsulation(model) => model.decapsulate(supplemental),
            _ => Err(SecurityError::Backend("model carries no supplemental data")),
        }
    }

    pub fn has_supplemental_data(&self) -> bool {
        matches!(self, Self::Encapsulation(_))
    }

    /// Size of the supplemental payload this model places on the wire.
    /// For models that carry one, calling before setup is an error.
    pub fn supplemental_data_size(&self) -> Result<usize, SecurityError> {
        match self {
            Self::Encapsulation(model) => model.encapsulated_size(),
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_follows_name_prefix() {
        assert!(matches!(
            KeyAgreementModel::create("ffdhe-2048"),
            Ok(KeyAgreementModel::FiniteField(_))
        ));
        assert!(matches!(
            KeyAgreementModel::create("ecdh-p-384"),
            Ok(KeyAgreementModel::EllipticCurve(_))
        ));
        assert!(matches!(
            KeyAgreementModel::create("kem-kyber768"),
            Ok(KeyAgreementModel::Encapsulation(_))
        ));
    }

    #[test]
    fn unknown_families_and_names_fail() {
        assert!(KeyAgreementModel::create("rsa-2048").is_err());
        assert!(KeyAgreementModel::create("ecdh-p-112").is_err());
        assert!(KeyAgreementModel::create("kem-ntru").is_err());
        assert!(KeyAgreementModel::create("").is_err());
    }

    #[test]
    fn only_kem_carries_supplemental_data() {
        assert!(!KeyAgreementModel::create("ecdh-p-256").unwrap().has_supplemental_data());
        assert!(!KeyAgreementModel::create("ffdhe-2048").unwrap().has_supplemental_data());
        assert!(KeyAgreementModel::create("kem-kyber512").unwrap().has_supplemental_data());
    }
}
