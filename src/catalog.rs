//! The supported-algorithms catalog.
//!
//! Provided by the configuration subsystem and shared immutably; each
//! synchronizer holds it by weak reference, so the catalog lives as long as
//! its longest holder. Levels iterate from low to high and each level's
//! lists keep their declared order — that order is what makes the
//! acceptor's suite selection deterministic.

use std::collections::BTreeMap;

use crate::suite::ConfidentialityLevel;
use crate::wire;

/// Algorithm lists declared for one confidentiality level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Algorithms {
    key_agreements: Vec<String>,
    ciphers: Vec<String>,
    hash_functions: Vec<String>,
}

impl Algorithms {
    pub fn new<S: Into<String>>(
        key_agreements: Vec<S>,
        ciphers: Vec<S>,
        hash_functions: Vec<S>,
    ) -> Self {
        Self {
            key_agreements: key_agreements.into_iter().map(Into::into).collect(),
            ciphers: ciphers.into_iter().map(Into::into).collect(),
            hash_functions: hash_functions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn key_agreements(&self) -> &[String] {
        &self.key_agreements
    }

    pub fn ciphers(&self) -> &[String] {
        &self.ciphers
    }

    pub fn hash_functions(&self) -> &[String] {
        &self.hash_functions
    }
}

/// One of the three negotiated suite categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmCategory {
    KeyAgreement,
    Cipher,
    HashFunction,
}

impl Algorithms {
    fn category(&self, category: AlgorithmCategory) -> &[String] {
        match category {
            AlgorithmCategory::KeyAgreement => &self.key_agreements,
            AlgorithmCategory::Cipher => &self.ciphers,
            AlgorithmCategory::HashFunction => &self.hash_functions,
        }
    }
}

/// Mapping of confidentiality level to declared algorithm lists.
#[derive(Clone, Debug, Default)]
pub struct SupportedAlgorithms {
    levels: BTreeMap<ConfidentialityLevel, Algorithms>,
}

impl SupportedAlgorithms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lists declared for `level`.
    pub fn insert(&mut self, level: ConfidentialityLevel, algorithms: Algorithms) {
        self.levels.insert(level, algorithms);
    }

    /// Levels from low to high, each with its declared lists.
    pub fn iter(&self) -> impl Iterator<Item = (ConfidentialityLevel, &Algorithms)> {
        self.levels.iter().map(|(level, algorithms)| (*level, algorithms))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The highest level at which `name` is declared for `category`. The
    /// user listing an algorithm at a higher tier means it may serve that
    /// tier, so the highest declaration wins.
    pub fn level_of(&self, category: AlgorithmCategory, name: &str) -> Option<ConfidentialityLevel> {
        let mut found = None;
        for (level, algorithms) in self.iter() {
            if algorithms.category(category).iter().any(|candidate| candidate == name) {
                found = Some(level);
            }
        }
        found
    }

    /// The first algorithm, scanning levels low to high and each list in
    /// declared order, that appears in the peer's offer. The peer's own
    /// ordering is irrelevant.
    pub fn first_match(
        &self,
        category: AlgorithmCategory,
        offered: &[&str],
    ) -> Option<(ConfidentialityLevel, &str)> {
        for (level, algorithms) in self.iter() {
            for candidate in algorithms.category(category) {
                if offered.iter().any(|name| name == candidate) {
                    return Some((level, candidate));
                }
            }
        }
        None
    }

    /// Pack the full catalog as a proposal frame: one
    /// `u16 count ‖ u16 total ‖ names…` list per category, categories
    /// aggregated across levels in low-to-high order.
    pub fn pack_proposal(&self) -> Vec<u8> {
        let mut key_agreements = Vec::new();
        let mut ciphers = Vec::new();
        let mut hash_functions = Vec::new();

        for (_, algorithms) in self.iter() {
            key_agreements.extend_from_slice(algorithms.key_agreements());
            ciphers.extend_from_slice(algorithms.ciphers());
            hash_functions.extend_from_slice(algorithms.hash_functions());
        }

        let mut buffer = Vec::new();
        wire::put_algorithm_list(&mut buffer, &key_agreements);
        wire::put_algorithm_list(&mut buffer, &ciphers);
        wire::put_algorithm_list(&mut buffer, &hash_functions);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SupportedAlgorithms {
        let mut catalog = SupportedAlgorithms::new();
        catalog.insert(
            ConfidentialityLevel::Medium,
            Algorithms::new(vec!["ecdh-p-256"], vec!["aes-128-ctr"], vec!["sha256"]),
        );
        catalog.insert(
            ConfidentialityLevel::High,
            Algorithms::new(
                vec!["kem-kyber768", "ecdh-p-384"],
                vec!["aes-256-gcm", "aes-256-ctr"],
                vec!["sha384", "sha512"],
            ),
        );
        catalog
    }

    #[test]
    fn iteration_is_low_to_high() {
        let levels: Vec<_> = catalog().iter().map(|(level, _)| level).collect();
        assert_eq!(levels, [ConfidentialityLevel::Medium, ConfidentialityLevel::High]);
    }

    #[test]
    fn level_lookup_prefers_highest_declaration() {
        let mut catalog = catalog();
        // Declare the same cipher at two levels; the higher one wins.
        catalog.insert(
            ConfidentialityLevel::Low,
            Algorithms::new(vec![], vec!["aes-256-ctr"], vec![]),
        );
        assert_eq!(
            catalog.level_of(AlgorithmCategory::Cipher, "aes-256-ctr"),
            Some(ConfidentialityLevel::High)
        );
        assert_eq!(catalog.level_of(AlgorithmCategory::Cipher, "des"), None);
    }

    #[test]
    fn first_match_follows_catalog_order() {
        let catalog = catalog();
        // Peer order must not matter: catalog lists kem-kyber768 first.
        let offered = ["ecdh-p-384", "kem-kyber768"];
        let (level, name) = catalog.first_match(AlgorithmCategory::KeyAgreement, &offered).unwrap();
        assert_eq!(level, ConfidentialityLevel::High);
        assert_eq!(name, "kem-kyber768");
    }

    #[test]
    fn first_match_scans_levels_low_to_high() {
        let catalog = catalog();
        let offered = ["aes-128-ctr", "aes-256-gcm"];
        let (level, name) = catalog.first_match(AlgorithmCategory::Cipher, &offered).unwrap();
        assert_eq!(level, ConfidentialityLevel::Medium);
        assert_eq!(name, "aes-128-ctr");
    }

    #[test]
    fn no_match_is_none() {
        assert!(catalog().first_match(AlgorithmCategory::HashFunction, &["md5"]).is_none());
    }

    #[test]
    fn proposal_packs_three_lists() {
        let buffer = catalog().pack_proposal();
        let mut reader = crate::wire::Reader::new(&buffer);
        let agreements = reader.take_algorithm_list().unwrap();
        let ciphers = reader.take_algorithm_list().unwrap();
        let hashes = reader.take_algorithm_list().unwrap();
        assert!(reader.is_exhausted());
        assert_eq!(agreements, ["ecdh-p-256", "kem-kyber768", "ecdh-p-384"]);
        assert_eq!(ciphers, ["aes-128-ctr", "aes-256-gcm", "aes-256-ctr"]);
        assert_eq!(hashes, ["sha256", "sha384", "sha512"]);
    }
}
