//! Hash-function registry: HMAC transcript signatures and the SHAKE-256
//! extendable-output function used for session-key derivation.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Sha3_256, Sha3_512, Shake256,
};

use crate::error::SecurityError;

/// Digest backing a cipher suite's HMAC signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
    Sha3_256,
    Sha3_512,
}

impl HashAlgorithm {
    /// Resolve a catalog name. Unknown names are a negotiation failure.
    pub fn from_name(name: &str) -> Result<Self, SecurityError> {
        match name {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            "sha3-256" => Ok(Self::Sha3_256),
            "sha3-512" => Ok(Self::Sha3_512),
            _ => Err(SecurityError::UnknownAlgorithm(name.to_string())),
        }
    }

    /// Digest output size; doubles as the HMAC signature size and the
    /// signature-key size.
    pub fn output_size(&self) -> usize {
        match self {
            Self::Sha256 | Self::Sha3_256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 | Self::Sha3_512 => 64,
        }
    }

    /// HMAC over `message` with `key`, using this digest.
    pub fn hmac(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>, SecurityError> {
        macro_rules! tag {
            ($digest:ty) => {{
                let mut mac = Hmac::<$digest>::new_from_slice(key)
                    .map_err(|_| SecurityError::Backend("hmac key rejected"))?;
                Mac::update(&mut mac, message);
                Ok(mac.finalize().into_bytes().to_vec())
            }};
        }

        match self {
            Self::Sha256 => tag!(Sha256),
            Self::Sha384 => tag!(Sha384),
            Self::Sha512 => tag!(Sha512),
            Self::Sha3_256 => tag!(Sha3_256),
            Self::Sha3_512 => tag!(Sha3_512),
        }
    }
}

/// Expand `input` into `size` uniform bytes with the SHAKE-256 XOF.
pub fn shake256_expand(input: &[u8], size: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(input);
    let mut reader = hasher.finalize_xof();
    let mut output = vec![0u8; size];
    reader.read(&mut output);
    output
}
