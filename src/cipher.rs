//! Record cipher registry.
//!
//! Each suite cipher seals a plaintext into `(body, tag)` and opens the
//! reverse. IV handling and the `body ‖ iv ‖ tag` record layout belong to
//! the cipher package; this module only runs the primitives.

use aes::{Aes128, Aes256};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use ctr::cipher::block_padding::Pkcs7;
use ctr::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use getrandom::getrandom;

use crate::error::SecurityError;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AEAD authentication tag size shared by every authenticated suite cipher.
pub const AEAD_TAG_SIZE: usize = 16;

/// Symmetric cipher backing a cipher suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes128Ctr,
    Aes256Ctr,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Resolve a catalog name. Unknown names are a negotiation failure.
    pub fn from_name(name: &str) -> Result<Self, SecurityError> {
        match name {
            "aes-128-ctr" => Ok(Self::Aes128Ctr),
            "aes-256-ctr" => Ok(Self::Aes256Ctr),
            "aes-128-cbc" => Ok(Self::Aes128Cbc),
            "aes-256-cbc" => Ok(Self::Aes256Cbc),
            "aes-128-gcm" => Ok(Self::Aes128Gcm),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "chacha20-poly1305" => Ok(Self::ChaCha20Poly1305),
            _ => Err(SecurityError::UnknownAlgorithm(name.to_string())),
        }
    }

    pub fn key_size(&self) -> usize {
        match self {
            Self::Aes128Ctr | Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes256Ctr | Self::Aes256Cbc | Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    pub fn iv_size(&self) -> usize {
        match self {
            Self::Aes128Ctr | Self::Aes256Ctr | Self::Aes128Cbc | Self::Aes256Cbc => 16,
            Self::Aes128Gcm | Self::Aes256Gcm | Self::ChaCha20Poly1305 => 12,
        }
    }

    /// Cipher block size as reported by the backend: 16 for the padding
    /// modes, 1 for stream and AEAD modes.
    pub fn block_size(&self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes256Cbc => 16,
            _ => 1,
        }
    }

    /// Whether the mode pads its input to a whole block (CBC/ECB family).
    pub fn pads_input(&self) -> bool {
        matches!(self, Self::Aes128Cbc | Self::Aes256Cbc)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Aes128Gcm | Self::Aes256Gcm | Self::ChaCha20Poly1305)
    }

    pub fn tag_size(&self) -> usize {
        if self.is_authenticated() {
            AEAD_TAG_SIZE
        } else {
            0
        }
    }

    /// Encrypt `plaintext`, returning the ciphertext body and, for AEAD
    /// modes, the authentication tag (empty otherwise).
    pub fn seal(
        &self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), SecurityError> {
        match self {
            Self::Aes128Ctr => {
                let mut cipher = Aes128Ctr::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::Backend("cipher key or iv length"))?;
                let mut body = plaintext.to_vec();
                cipher.apply_keystream(&mut body);
                Ok((body, Vec::new()))
            }
            Self::Aes256Ctr => {
                let mut cipher = Aes256Ctr::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::Backend("cipher key or iv length"))?;
                let mut body = plaintext.to_vec();
                cipher.apply_keystream(&mut body);
                Ok((body, Vec::new()))
            }
            Self::Aes128Cbc => {
                let cipher = Aes128CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::Backend("cipher key or iv length"))?;
                Ok((cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext), Vec::new()))
            }
            Self::Aes256Cbc => {
                let cipher = Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::Backend("cipher key or iv length"))?;
                Ok((cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext), Vec::new()))
            }
            Self::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(key)
                    .map_err(|_| SecurityError::Backend("cipher key length"))?;
                let sealed = cipher
                    .encrypt(aes_gcm::Nonce::from_slice(iv), plaintext)
                    .map_err(|_| SecurityError::Backend("aead seal"))?;
                Ok(split_tag(sealed))
            }
            Self::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|_| SecurityError::Backend("cipher key length"))?;
                let sealed = cipher
                    .encrypt(aes_gcm::Nonce::from_slice(iv), plaintext)
                    .map_err(|_| SecurityError::Backend("aead seal"))?;
                Ok(split_tag(sealed))
            }
            Self::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| SecurityError::Backend("cipher key length"))?;
                let sealed = cipher
                    .encrypt(chacha20poly1305::Nonce::from_slice(iv), plaintext)
                    .map_err(|_| SecurityError::Backend("aead seal"))?;
                Ok(split_tag(sealed))
            }
        }
    }

    /// Decrypt a ciphertext body. `tag` must hold the authentication tag for
    /// AEAD modes and be empty otherwise. Every failure is uniform.
    pub fn open(
        &self,
        key: &[u8],
        iv: &[u8],
        body: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>, SecurityError> {
        match self {
            Self::Aes128Ctr => {
                let mut cipher = Aes128Ctr::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                let mut plaintext = body.to_vec();
                cipher.apply_keystream(&mut plaintext);
                Ok(plaintext)
            }
            Self::Aes256Ctr => {
                let mut cipher = Aes256Ctr::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                let mut plaintext = body.to_vec();
                cipher.apply_keystream(&mut plaintext);
                Ok(plaintext)
            }
            Self::Aes128Cbc => {
                let cipher = Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(body)
                    .map_err(|_| SecurityError::DecryptionFailed)
            }
            Self::Aes256Cbc => {
                let cipher = Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(body)
                    .map_err(|_| SecurityError::DecryptionFailed)
            }
            Self::Aes128Gcm => {
                let cipher = Aes128Gcm::new_from_slice(key)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                cipher
                    .decrypt(aes_gcm::Nonce::from_slice(iv), join_tag(body, tag).as_slice())
                    .map_err(|_| SecurityError::DecryptionFailed)
            }
            Self::Aes256Gcm => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                cipher
                    .decrypt(aes_gcm::Nonce::from_slice(iv), join_tag(body, tag).as_slice())
                    .map_err(|_| SecurityError::DecryptionFailed)
            }
            Self::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new_from_slice(key)
                    .map_err(|_| SecurityError::DecryptionFailed)?;
                cipher
                    .decrypt(
                        chacha20poly1305::Nonce::from_slice(iv),
                        join_tag(body, tag).as_slice(),
                    )
                    .map_err(|_| SecurityError::DecryptionFailed)
            }
        }
    }
}

/// Generate a random initialization vector of the requested width.
pub fn random_iv(size: usize) -> Result<Vec<u8>, SecurityError> {
    let mut iv = vec![0u8; size];
    getrandom(&mut iv).map_err(|_| SecurityError::Backend("iv generation"))?;
    Ok(iv)
}

// The AEAD crates append the tag to the ciphertext; the record layout keeps
// it separate so the IV can sit between them.
fn split_tag(mut sealed: Vec<u8>) -> (Vec<u8>, Vec<u8>) {
    let tag = sealed.split_off(sealed.len().saturating_sub(AEAD_TAG_SIZE));
    (sealed, tag)
}

fn join_tag(body: &[u8], tag: &[u8]) -> Vec<u8> {
    let mut joined = Vec::with_capacity(body.len() + tag.len());
    joined.extend_from_slice(body);
    joined.extend_from_slice(tag);
    joined
}
