//! Finite-field Diffie–Hellman over the RFC 7919 groups.
//!
//! Group elements travel as fixed-width big-endian octet strings the size
//! of the prime. The private exponent is 512 random bits.

use num_bigint_dig::BigUint;

use crate::buffer::{PublicKey, SharedSecret, SupplementalData};
use crate::error::SecurityError;
use crate::suite::CipherSuite;

const PRIVATE_EXPONENT_SIZE: usize = 64;

struct FfdheGroup {
    name: &'static str,
    prime_hex: &'static str,
    generator: u32,
    /// Prime width in bytes; also the public-key and shared-secret width.
    size: usize,
}

// RFC 7919 named groups. The table grows by appending constants.
static GROUPS: [FfdheGroup; 2] = [
    FfdheGroup {
        name: "ffdhe-2048",
        prime_hex: concat!(
            "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
            "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
            "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
            "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
            "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
            "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
            "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
            "C58EF1837D1683B2C6F34A26C1B2EFFA886B423861285C97FFFFFFFFFFFFFFFF",
        ),
        generator: 2,
        size: 256,
    },
    FfdheGroup {
        name: "ffdhe-3072",
        prime_hex: concat!(
            "FFFFFFFFFFFFFFFFADF85458A2BB4A9AAFDC5620273D3CF1D8B9C583CE2D3695",
            "A9E13641146433FBCC939DCE249B3EF97D2FE363630C75D8F681B202AEC4617A",
            "D3DF1ED5D5FD65612433F51F5F066ED0856365553DED1AF3B557135E7F57C935",
            "984F0C70E0E68B77E2A689DAF3EFE8721DF158A136ADE73530ACCA4F483A797A",
            "BC0AB182B324FB61D108A94BB2C8E3FBB96ADAB760D7F4681D4F42A3DE394DF4",
            "AE56EDE76372BB190B07A7C8EE0A6D709E02FCE1CDF7E2ECC03404CD28342F61",
            "9172FE9CE98583FF8E4F1232EEF28183C3FE3B1B4C6FAD733BB5FCBC2EC22005",
            "C58EF1837D1683B2C6F34A26C1B2EFFA886B4238611FCFDCDE355B3B6519035B",
            "BC34F4DEF99C023861B46FC9D6E6C9077AD91D2691F7F7EE598CB0FAC186D91C",
            "AEFE130985139270B4130C93BC437944F4FD4452E2D74DD364F2E21E71F54BFF",
            "5CAE82AB9C9DF69EE86D2BC522363A0DABC521979B0DEADA1DBF9A42D5C4484E",
            "0ABCD06BFA53DDEF3C1B20EE3FD59D7C25E41D2B66C62E37FFFFFFFFFFFFFFFF",
        ),
        generator: 2,
        size: 384,
    },
];

fn group_for(name: &str) -> Option<&'static FfdheGroup> {
    GROUPS.iter().find(|group| group.name == name)
}

fn prime(group: &FfdheGroup) -> BigUint {
    // The vendored constants are valid hex.
    BigUint::parse_bytes(group.prime_hex.as_bytes(), 16).unwrap_or_default()
}

/// Left-pad a big-endian encoding to the group's element width.
fn encode_element(value: &BigUint, size: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut element = vec![0u8; size.saturating_sub(bytes.len())];
    element.extend_from_slice(&bytes);
    element
}

/// Finite-field model state: the selected group and this side's exponent.
pub struct FiniteFieldModel {
    group: Option<&'static FfdheGroup>,
    private_exponent: Option<BigUint>,
}

impl FiniteFieldModel {
    pub fn new() -> Self {
        Self { group: None, private_exponent: None }
    }

    pub fn is_supported(agreement: &str) -> bool {
        group_for(agreement).is_some()
    }

    pub fn setup_key_exchange(&mut self, suite: &CipherSuite) -> Result<PublicKey, SecurityError> {
        let group = group_for(suite.key_agreement_name())
            .ok_or_else(|| SecurityError::UnknownAlgorithm(suite.key_agreement_name().to_string()))?;

        let mut exponent_bytes = [0u8; PRIVATE_EXPONENT_SIZE];
        getrandom::getrandom(&mut exponent_bytes)
            .map_err(|_| SecurityError::Backend("exponent generation"))?;
        let exponent = BigUint::from_bytes_be(&exponent_bytes);

        let modulus = prime(group);
        let public = BigUint::from(group.generator).modpow(&exponent, &modulus);

        self.group = Some(group);
        self.private_exponent = Some(exponent);

        Ok(PublicKey::new(encode_element(&public, group.size)))
    }

    pub fn compute_shared_secret(
        &mut self,
        peer_public_key: &PublicKey,
    ) -> Result<(SharedSecret, SupplementalData), SecurityError> {
        let group = self.group.ok_or(SecurityError::NotReady("key exchange not set up"))?;
        let exponent = self
            .private_exponent
            .as_ref()
            .ok_or(SecurityError::NotReady("key exchange not set up"))?;

        if peer_public_key.len() != group.size {
            return Err(SecurityError::Malformed("public key size"));
        }

        let modulus = prime(group);
        let peer = BigUint::from_bytes_be(peer_public_key.as_slice());

        // Reject the degenerate subgroup elements 0, 1, and p − 1.
        let one = BigUint::from(1u32);
        if peer <= one || peer >= &modulus - &one {
            return Err(SecurityError::Backend("degenerate peer element"));
        }

        let shared = peer.modpow(exponent, &modulus);
        Ok((
            SharedSecret::new(encode_element(&shared, group.size)),
            SupplementalData::empty(),
        ))
    }
}

impl Default for FiniteFieldModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::ConfidentialityLevel;

    fn suite(agreement: &str) -> CipherSuite {
        CipherSuite::new(ConfidentialityLevel::Medium, agreement, "aes-256-ctr", "sha256").unwrap()
    }

    #[test]
    fn vendored_primes_decode_to_declared_width() {
        for group in &GROUPS {
            assert_eq!(prime(group).to_bytes_be().len(), group.size, "{}", group.name);
        }
    }

    #[test]
    fn supported_groups() {
        assert!(FiniteFieldModel::is_supported("ffdhe-2048"));
        assert!(FiniteFieldModel::is_supported("ffdhe-3072"));
        assert!(!FiniteFieldModel::is_supported("ffdhe-1024"));
    }

    #[test]
    fn exchange_agrees() {
        let mut alpha = FiniteFieldModel::new();
        let mut omega = FiniteFieldModel::new();
        let suite = suite("ffdhe-2048");

        let alpha_public = alpha.setup_key_exchange(&suite).unwrap();
        let omega_public = omega.setup_key_exchange(&suite).unwrap();
        assert_eq!(alpha_public.len(), 256);

        let (alpha_secret, _) = alpha.compute_shared_secret(&omega_public).unwrap();
        let (omega_secret, _) = omega.compute_shared_secret(&alpha_public).unwrap();
        assert_eq!(alpha_secret.as_slice(), omega_secret.as_slice());
        assert_eq!(alpha_secret.len(), 256);
    }

    #[test]
    fn degenerate_elements_are_rejected() {
        let mut model = FiniteFieldModel::new();
        model.setup_key_exchange(&suite("ffdhe-2048")).unwrap();

        let mut zero = vec![0u8; 256];
        assert!(model.compute_shared_secret(&PublicKey::new(zero.clone())).is_err());
        *zero.last_mut().unwrap() = 1;
        assert!(model.compute_shared_secret(&PublicKey::new(zero)).is_err());
    }

    #[test]
    fn wrong_width_is_rejected() {
        let mut model = FiniteFieldModel::new();
        model.setup_key_exchange(&suite("ffdhe-2048")).unwrap();
        assert!(model.compute_shared_secret(&PublicKey::new(vec![2u8; 128])).is_err());
    }

    #[test]
    fn compute_before_setup_is_not_ready() {
        let mut model = FiniteFieldModel::new();
        let result = model.compute_shared_secret(&PublicKey::new(vec![2u8; 256]));
        assert!(matches!(result, Err(SecurityError::NotReady(_))));
    }
}
