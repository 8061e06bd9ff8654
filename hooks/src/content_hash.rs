//! Content fingerprinting and deduplication
//!
//! Content is normalized (whitespace runs collapsed, trimmed) before hashing
//! with SHA-256. The table remembers the exact content last seen under each
//! digest, so a digest only counts as "seen" when the stored content is
//! identical to the presented content.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Digest function used to key the table
pub type DigestFn = fn(&str) -> String;

/// Result of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLookup {
    pub hash: String,
    pub is_new: bool,
}

/// Collapse whitespace runs to a single space and trim
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of the normalized content
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    hex::encode(hasher.finalize())
}

/// Deduplicating hash table
pub struct ContentHasher {
    hashes: DashMap<String, String>,
    digest: DigestFn,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::with_digest(hash_content)
    }

    /// Use a custom digest function
    pub fn with_digest(digest: DigestFn) -> Self {
        Self {
            hashes: DashMap::new(),
            digest,
        }
    }

    /// Hash `content` and record it.
    ///
    /// `is_new` is false only when the exact same content is already stored
    /// under the digest; otherwise the entry is (re)written.
    pub fn get_or_compute(&self, content: &str) -> HashLookup {
        let hash = (self.digest)(content);

        match self.hashes.entry(hash.clone()) {
            Entry::Occupied(entry) if entry.get() == content => HashLookup {
                hash,
                is_new: false,
            },
            Entry::Occupied(mut entry) => {
                entry.insert(content.to_string());
                HashLookup { hash, is_new: true }
            }
            Entry::Vacant(entry) => {
                entry.insert(content.to_string());
                HashLookup { hash, is_new: true }
            }
        }
    }

    /// Forget every stored hash
    pub fn clear(&self) {
        self.hashes.clear();
    }

    /// Number of stored hashes
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_content("  a \n\n  b\t c  "), "a b c");
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let hash = hash_content("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_whitespace_variants_share_hash() {
        assert_eq!(hash_content("a   b\n c"), hash_content("a b c"));
    }

    #[test]
    fn test_second_lookup_is_not_new() {
        let hasher = ContentHasher::new();
        let first = hasher.get_or_compute("rule: always run tests");
        let second = hasher.get_or_compute("rule: always run tests");

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.hash, second.hash);
        assert_eq!(hasher.len(), 1);
    }

    #[test]
    fn test_collision_with_different_content_is_new() {
        let hasher = ContentHasher::with_digest(|_| "collide".to_string());

        assert!(hasher.get_or_compute("first").is_new);
        let second = hasher.get_or_compute("second");
        assert!(second.is_new);
        assert_eq!(second.hash, "collide");

        // "second" replaced "first" under the shared digest
        assert!(!hasher.get_or_compute("second").is_new);
        assert!(hasher.get_or_compute("first").is_new);
    }

    #[test]
    fn test_normalized_equal_but_raw_different_is_new() {
        let hasher = ContentHasher::new();
        assert!(hasher.get_or_compute("a  b").is_new);
        assert!(hasher.get_or_compute("a b").is_new);
        assert_eq!(hasher.len(), 1);
    }

    #[test]
    fn test_clear() {
        let hasher = ContentHasher::new();
        hasher.get_or_compute("x");
        assert!(!hasher.is_empty());
        hasher.clear();
        assert!(hasher.is_empty());
        assert!(hasher.get_or_compute("x").is_new);
    }
}
