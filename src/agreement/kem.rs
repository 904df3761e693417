//! Post-quantum key encapsulation over ML-KEM (FIPS 203).
//!
//! The initiator encapsulates against the acceptor's public key and ships
//! the ciphertext as supplemental data; the acceptor decapsulates with the
//! decapsulation key it kept from setup.
//!
//! Mechanism sizes:
//!   kem-kyber512  — ek 800,  ct 768
//!   kem-kyber768  — ek 1184, ct 1088
//!   kem-kyber1024 — ek 1568, ct 1568

use ml_kem::{
    kem::{Decapsulate, Encapsulate},
    Ciphertext, EncodedSizeUser, KemCore, MlKem1024, MlKem1024Params, MlKem512, MlKem512Params,
    MlKem768, MlKem768Params,
};
use rand_core::OsRng;

use crate::buffer::{PublicKey, SharedSecret, SupplementalData};
use crate::error::SecurityError;
use crate::suite::CipherSuite;

type Dk512 = ml_kem::kem::DecapsulationKey<MlKem512Params>;
type Dk768 = ml_kem::kem::DecapsulationKey<MlKem768Params>;
type Dk1024 = ml_kem::kem::DecapsulationKey<MlKem1024Params>;
type Ek512 = ml_kem::kem::EncapsulationKey<MlKem512Params>;
type Ek768 = ml_kem::kem::EncapsulationKey<MlKem768Params>;
type Ek1024 = ml_kem::kem::EncapsulationKey<MlKem1024Params>;

const KYBER512_PUBLIC_KEY_SIZE: usize = 800;
const KYBER512_CIPHERTEXT_SIZE: usize = 768;
const KYBER768_PUBLIC_KEY_SIZE: usize = 1184;
const KYBER768_CIPHERTEXT_SIZE: usize = 1088;
const KYBER1024_PUBLIC_KEY_SIZE: usize = 1568;
const KYBER1024_CIPHERTEXT_SIZE: usize = 1568;

enum Encapsulator {
    Kyber512(Dk512),
    Kyber768(Dk768),
    Kyber1024(Dk1024),
}

impl Encapsulator {
    fn public_key_size(&self) -> usize {
        match self {
            Self::Kyber512(_) => KYBER512_PUBLIC_KEY_SIZE,
            Self::Kyber768(_) => KYBER768_PUBLIC_KEY_SIZE,
            Self::Kyber1024(_) => KYBER1024_PUBLIC_KEY_SIZE,
        }
    }

    fn encapsulated_size(&self) -> usize {
        match self {
            Self::Kyber512(_) => KYBER512_CIPHERTEXT_SIZE,
            Self::Kyber768(_) => KYBER768_CIPHERTEXT_SIZE,
            Self::Kyber1024(_) => KYBER1024_CIPHERTEXT_SIZE,
        }
    }
}

/// Key-encapsulation model state: the mechanism and decapsulation key kept
/// from setup.
pub struct KeyEncapsulationModel {
    encapsulator: Option<Encapsulator>,
}

impl KeyEncapsulationModel {
    pub fn new() -> Self {
        Self { encapsulator: None }
    }

    pub fn is_supported(agreement: &str) -> bool {
        matches!(agreement, "kem-kyber512" | "kem-kyber768" | "kem-kyber1024")
    }

    pub fn setup_key_exchange(&mut self, suite: &CipherSuite) -> Result<PublicKey, SecurityError> {
        let (encapsulator, public_key) = match suite.key_agreement_name() {
            "kem-kyber512" => {
                let (dk, ek) = MlKem512::generate(&mut OsRng);
                let public = ek.as_bytes().to_vec();
                (Encapsulator::Kyber512(dk), public)
            }
            "kem-kyber768" => {
                let (dk, ek) = MlKem768::generate(&mut OsRng);
                let public = ek.as_bytes().to_vec();
                (Encapsulator::Kyber768(dk), public)
            }
            "kem-kyber1024" => {
                let (dk, ek) = MlKem1024::generate(&mut OsRng);
                let public = ek.as_bytes().to_vec();
                (Encapsulator::Kyber1024(dk), public)
            }
            other => return Err(SecurityError::UnknownAlgorithm(other.to_string())),
        };

        self.encapsulator = Some(encapsulator);
        Ok(PublicKey::new(public_key))
    }

    /// Initiator path: encapsulate against the peer's public key, producing
    /// the shared secret and the ciphertext to forward.
    pub fn compute_shared_secret(
        &mut self,
        peer_public_key: &PublicKey,
    ) -> Result<(SharedSecret, SupplementalData), SecurityError> {
        let encapsulator =
            self.encapsulator.as_ref().ok_or(SecurityError::NotReady("key exchange not set up"))?;

        if peer_public_key.len() != encapsulator.public_key_size() {
            return Err(SecurityError::Malformed("public key size"));
        }

        macro_rules! encapsulate {
            ($ek:ty, $size:expr) => {{
                let bytes: [u8; $size] = peer_public_key
                    .as_slice()
                    .try_into()
                    .map_err(|_| SecurityError::Malformed("public key size"))?;
                let ek = <$ek>::from_bytes(&bytes.into());
                let (ciphertext, shared) = ek
                    .encapsulate(&mut OsRng)
                    .map_err(|_| SecurityError::Backend("encapsulation"))?;
                (shared.as_slice().to_vec(), ciphertext.as_slice().to_vec())
            }};
        }

        let (shared, ciphertext) = match encapsulator {
            Encapsulator::Kyber512(_) => encapsulate!(Ek512, KYBER512_PUBLIC_KEY_SIZE),
            Encapsulator::Kyber768(_) => encapsulate!(Ek768, KYBER768_PUBLIC_KEY_SIZE),
            Encapsulator::Kyber1024(_) => encapsulate!(Ek1024, KYBER1024_PUBLIC_KEY_SIZE),
        };

        Ok((SharedSecret::new(shared), SupplementalData::new(ciphertext)))
    }

    /// Acceptor path: decapsulate the initiator's ciphertext.
    pub fn decapsulate(
        &mut self,
        supplemental: &SupplementalData,
    ) -> Result<SharedSecret, SecurityError> {
        let encapsulator =
            self.encapsulator.as_ref().ok_or(SecurityError::NotReady("key exchange not set up"))?;

        if supplemental.len() != encapsulator.encapsulated_size() {
            return Err(SecurityError::Malformed("supplemental data size"));
        }

        macro_rules! decapsulate {
            ($dk:expr, $mechanism:ty) => {{
                let ciphertext = Ciphertext::<$mechanism>::try_from(supplemental.as_slice())
                    .map_err(|_| SecurityError::Malformed("supplemental data size"))?;
                $dk.decapsulate(&ciphertext)
                    .map_err(|_| SecurityError::Backend("decapsulation"))?
                    .as_slice()
                    .to_vec()
            }};
        }

        let shared = match encapsulator {
            Encapsulator::Kyber512(dk) => decapsulate!(dk, MlKem512),
            Encapsulator::Kyber768(dk) => decapsulate!(dk, MlKem768),
            Encapsulator::Kyber1024(dk) => decapsulate!(dk, MlKem1024),
        };

        Ok(SharedSecret::new(shared))
    }

    /// Ciphertext width this mechanism places on the wire. Invalid before
    /// setup: the mechanism is not known until then.
    pub fn encapsulated_size(&self) -> Result<usize, SecurityError> {
        self.encapsulator
            .as_ref()
            .map(Encapsulator::encapsulated_size)
            .ok_or(SecurityError::NotReady("key exchange not set up"))
    }
}

impl Default for KeyEncapsulationModel {
    fn default() -> Self {
        Self::new()
    }
}
