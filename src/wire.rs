//! Handshake frame packing and parsing.
//!
//! Multi-byte integers are little-endian. Strings and blobs are length
//! prefixed with the width noted at each call site. Parsing is bounds
//! checked everywhere; a frame larger than the computed maximum for its
//! stage is rejected before any field is read.

use crate::error::SecurityError;

// ---------------------------------------------------------------------------
// Protocol limits
// ---------------------------------------------------------------------------

/// Longest algorithm name accepted on the wire.
pub const MAX_ALGORITHM_NAME_SIZE: usize = 64;

/// Most algorithms accepted per category (agreements, ciphers, hashes).
pub const MAX_ALGORITHMS_PER_CATEGORY: usize = 16;

/// Largest acceptable public key (bounds KEM public keys).
pub const MAX_PUBLIC_KEY_SIZE: usize = 65_536;

/// Largest acceptable salt: two concatenated 32-byte halves.
pub const MAX_SALT_SIZE: usize = 64;

/// Upper bound of one packed algorithm list:
/// `u16 count ‖ u16 total ‖ count × (u16 len ‖ name)`.
pub const MAX_ALGORITHM_LIST_SIZE: usize =
    2 + 2 + MAX_ALGORITHMS_PER_CATEGORY * (2 + MAX_ALGORITHM_NAME_SIZE);

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

pub fn put_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

/// `u16 len ‖ bytes`. Callers guarantee `bytes.len()` fits a u16.
pub fn put_chunk_u16(buffer: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u16::MAX as usize);
    put_u16(buffer, bytes.len() as u16);
    buffer.extend_from_slice(bytes);
}

/// `u32 len ‖ bytes`.
pub fn put_chunk_u32(buffer: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    put_u32(buffer, bytes.len() as u32);
    buffer.extend_from_slice(bytes);
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Cursor over a received frame.
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take_u16(&mut self) -> Result<u16, SecurityError> {
        let bytes = self.take_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn take_u32(&mut self) -> Result<u32, SecurityError> {
        let bytes = self.take_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn take_bytes(&mut self, size: usize) -> Result<&'a [u8], SecurityError> {
        let end = self
            .position
            .checked_add(size)
            .filter(|&end| end <= self.data.len())
            .ok_or(SecurityError::Malformed("frame truncated"))?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// `u16 len ‖ bytes`, with `len` bounded by `limit`.
    pub fn take_chunk_u16(&mut self, limit: usize) -> Result<&'a [u8], SecurityError> {
        let size = self.take_u16()? as usize;
        if size > limit {
            return Err(SecurityError::Malformed("length field exceeds limit"));
        }
        self.take_bytes(size)
    }

    /// A length-prefixed UTF-8 algorithm name, non-empty and bounded.
    pub fn take_name(&mut self) -> Result<&'a str, SecurityError> {
        let bytes = self.take_chunk_u16(MAX_ALGORITHM_NAME_SIZE)?;
        if bytes.is_empty() {
            return Err(SecurityError::Malformed("empty algorithm name"));
        }
        std::str::from_utf8(bytes).map_err(|_| SecurityError::Malformed("algorithm name encoding"))
    }

    /// One packed algorithm list:
    /// `u16 count ‖ u16 total_bytes ‖ count × (u16 len ‖ name)`.
    pub fn take_algorithm_list(&mut self) -> Result<Vec<&'a str>, SecurityError> {
        let count = self.take_u16()? as usize;
        if count > MAX_ALGORITHMS_PER_CATEGORY {
            return Err(SecurityError::Malformed("algorithm list count"));
        }

        let declared = self.take_u16()? as usize;
        if declared > MAX_ALGORITHMS_PER_CATEGORY * (2 + MAX_ALGORITHM_NAME_SIZE)
            || declared > self.remaining()
        {
            return Err(SecurityError::Malformed("algorithm list size"));
        }

        let mut names = Vec::with_capacity(count);
        let mut consumed = 0usize;
        for _ in 0..count {
            let name = self.take_name()?;
            consumed += 2 + name.len();
            names.push(name);
        }

        if consumed != declared {
            return Err(SecurityError::Malformed("algorithm list size mismatch"));
        }

        Ok(names)
    }
}

/// Pack one algorithm list in the proposal layout.
pub fn put_algorithm_list(buffer: &mut Vec<u8>, names: &[String]) {
    let total: usize = names.iter().map(|name| 2 + name.len()).sum();
    debug_assert!(names.len() <= MAX_ALGORITHMS_PER_CATEGORY);
    put_u16(buffer, names.len() as u16);
    put_u16(buffer, total as u16);
    for name in names {
        put_chunk_u16(buffer, name.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut buffer = Vec::new();
        put_u16(&mut buffer, 0x1234);
        put_u32(&mut buffer, 0xAABBCCDD);
        assert_eq!(buffer, [0x34, 0x12, 0xDD, 0xCC, 0xBB, 0xAA]);

        let mut reader = Reader::new(&buffer);
        assert_eq!(reader.take_u16().unwrap(), 0x1234);
        assert_eq!(reader.take_u32().unwrap(), 0xAABBCCDD);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn truncated_reads_fail() {
        let mut reader = Reader::new(&[0x01]);
        assert!(reader.take_u16().is_err());

        let mut reader = Reader::new(&[0x05, 0x00, 0xAA]);
        assert!(reader.take_chunk_u16(64).is_err());
    }

    #[test]
    fn oversized_chunk_is_rejected_before_reading() {
        let mut buffer = Vec::new();
        put_chunk_u16(&mut buffer, &[0xAA; 80]);
        let mut reader = Reader::new(&buffer);
        assert!(reader.take_chunk_u16(64).is_err());
    }

    #[test]
    fn algorithm_list_round_trip() {
        let names = vec!["ecdh-p-384".to_string(), "kem-kyber768".to_string()];
        let mut buffer = Vec::new();
        put_algorithm_list(&mut buffer, &names);

        let mut reader = Reader::new(&buffer);
        let parsed = reader.take_algorithm_list().unwrap();
        assert_eq!(parsed, ["ecdh-p-384", "kem-kyber768"]);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn algorithm_list_declared_size_must_match() {
        let mut buffer = Vec::new();
        put_u16(&mut buffer, 1);
        put_u16(&mut buffer, 99); // wrong total
        put_chunk_u16(&mut buffer, b"sha256");
        // Pad so the declared size is available to read.
        buffer.extend_from_slice(&[0u8; 99]);

        let mut reader = Reader::new(&buffer);
        assert!(reader.take_algorithm_list().is_err());
    }

    #[test]
    fn algorithm_list_count_is_bounded() {
        let mut buffer = Vec::new();
        put_u16(&mut buffer, (MAX_ALGORITHMS_PER_CATEGORY + 1) as u16);
        put_u16(&mut buffer, 0);
        let mut reader = Reader::new(&buffer);
        assert!(reader.take_algorithm_list().is_err());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut buffer = Vec::new();
        put_chunk_u16(&mut buffer, b"");
        let mut reader = Reader::new(&buffer);
        assert!(reader.take_name().is_err());
    }
}
