//! Secret-bearing byte containers.
//!
//! `SecureBuffer` is the backing store for everything that must not outlive
//! its owner in readable memory: it zeroizes on drop and on `erase`. The
//! wrappers around it are distinct nominal types so a salt cannot be passed
//! where a shared secret is expected.
//!
//! `EncryptionKey` and `SignatureKey` do not own bytes at all. They are
//! cordons: an (offset, length) pair naming a range of a live
//! `PrincipalKey`, resolved through the keystore that owns both.

use zeroize::{Zeroize, ZeroizeOnDrop};

// ---------------------------------------------------------------------------
// SecureBuffer
// ---------------------------------------------------------------------------

/// Owned byte buffer that is zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureBuffer(Vec<u8>);

impl SecureBuffer {
    pub fn new(size: usize) -> Self {
        Self(vec![0u8; size])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// View of the `size` bytes starting at `offset`. None when out of range.
    pub fn cordon(&self, offset: usize, size: usize) -> Option<&[u8]> {
        self.0.get(offset..offset.checked_add(size)?)
    }

    pub fn append(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zeroize the contents and drop them.
    pub fn erase(&mut self) {
        self.0.zeroize();
        self.0.clear();
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret bytes.
        write!(f, "SecureBuffer({} bytes)", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// Copyable secret wrappers
// ---------------------------------------------------------------------------

macro_rules! copyable_secret {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name(SecureBuffer);

        impl $name {
            pub fn new(data: Vec<u8>) -> Self {
                Self(SecureBuffer::from_vec(data))
            }

            pub fn empty() -> Self {
                Self(SecureBuffer::from_vec(Vec::new()))
            }

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn erase(&mut self) {
                self.0.erase();
            }
        }
    };
}

copyable_secret! {
    /// A key-agreement public key, ours or the peer's.
    PublicKey
}

copyable_secret! {
    /// Session salt. Starts as one 32-byte random half and grows to the
    /// concatenation of both participants' halves.
    Salt
}

copyable_secret! {
    /// Model-specific key-exchange payload; for KEMs, the encapsulated
    /// ciphertext carried from initiator to acceptor.
    SupplementalData
}

impl Salt {
    /// `peer ‖ self`.
    pub fn prepend(&mut self, peer: &Salt) {
        let mut combined = SecureBuffer::from_vec(peer.as_slice().to_vec());
        combined.append(self.0.as_slice());
        self.0.erase();
        self.0 = combined;
    }

    /// `self ‖ peer`.
    pub fn append(&mut self, peer: &Salt) {
        self.0.append(peer.as_slice());
    }
}

// ---------------------------------------------------------------------------
// Move-only secret wrappers
// ---------------------------------------------------------------------------

macro_rules! move_only_secret {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, PartialEq, Eq)]
        pub struct $name(SecureBuffer);

        impl $name {
            pub fn new(data: Vec<u8>) -> Self {
                Self(SecureBuffer::from_vec(data))
            }

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn erase(&mut self) {
                self.0.erase();
            }
        }
    };
}

move_only_secret! {
    /// Raw key-agreement output. Consumed by session-key derivation.
    SharedSecret
}

move_only_secret! {
    /// The monolithic derived secret partitioned into key cordons.
    PrincipalKey
}

impl PrincipalKey {
    pub fn from_buffer(data: SecureBuffer) -> Self {
        Self(data)
    }

    pub fn cordon(&self, offset: usize, size: usize) -> Option<&[u8]> {
        self.0.cordon(offset, size)
    }
}

// ---------------------------------------------------------------------------
// Key cordons
// ---------------------------------------------------------------------------

/// Named range of a `PrincipalKey` used as a cipher content key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptionKey {
    offset: usize,
    size: usize,
}

/// Named range of a `PrincipalKey` used as an HMAC signature key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureKey {
    offset: usize,
    size: usize,
}

macro_rules! cordon_impl {
    ($name:ident) => {
        impl $name {
            pub fn new(offset: usize, size: usize) -> Self {
                Self { offset, size }
            }

            pub fn offset(&self) -> usize {
                self.offset
            }

            pub fn size(&self) -> usize {
                self.size
            }

            /// Resolve the cordon against the principal key it names.
            pub fn resolve<'a>(&self, principal: &'a PrincipalKey) -> Option<&'a [u8]> {
                principal.cordon(self.offset, self.size)
            }

            /// Forget the indices. The bytes themselves belong to the
            /// principal key and are erased with it.
            pub fn erase(&mut self) {
                self.offset = 0;
                self.size = 0;
            }
        }
    };
}

cordon_impl!(EncryptionKey);
cordon_impl!(SignatureKey);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erase_zeroizes_and_clears() {
        let mut buffer = SecureBuffer::from_vec(vec![0xAB; 64]);
        buffer.erase();
        assert!(buffer.is_empty());
    }

    #[test]
    fn cordon_bounds_are_checked() {
        let buffer = SecureBuffer::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(buffer.cordon(1, 2), Some(&[2u8, 3u8][..]));
        assert_eq!(buffer.cordon(3, 2), None);
        assert_eq!(buffer.cordon(usize::MAX, 1), None);
    }

    #[test]
    fn salt_prepend_orders_peer_first() {
        let mut salt = Salt::new(vec![0xBB; 4]);
        salt.prepend(&Salt::new(vec![0xAA; 4]));
        assert_eq!(salt.as_slice(), &[0xAA, 0xAA, 0xAA, 0xAA, 0xBB, 0xBB, 0xBB, 0xBB]);
    }

    #[test]
    fn salt_append_orders_peer_last() {
        let mut salt = Salt::new(vec![0xAA; 4]);
        salt.append(&Salt::new(vec![0xBB; 4]));
        assert_eq!(salt.as_slice(), &[0xAA, 0xAA, 0xAA, 0xAA, 0xBB, 0xBB, 0xBB, 0xBB]);
    }

    #[test]
    fn cordon_resolves_against_principal() {
        let principal = PrincipalKey::new((0u8..32).collect());
        let key = EncryptionKey::new(4, 8);
        assert_eq!(key.resolve(&principal), Some(&[4, 5, 6, 7, 8, 9, 10, 11][..]));
    }

    #[test]
    fn erased_cordon_is_empty() {
        let principal = PrincipalKey::new(vec![7; 16]);
        let mut key = SignatureKey::new(0, 16);
        key.erase();
        assert_eq!(key.resolve(&principal), Some(&[][..]));
        assert_eq!(key.size(), 0);
    }
}
