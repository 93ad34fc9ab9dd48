//! Minimal perfect hash over u64 minimizer keys.
//!
//! Thin wrapper around [`boomphf::Mphf`] that pins the key type, the gamma
//! parameter and the byte serialization used when the function is embedded
//! in a hashtable section. Treated as a black box by the rest of the crate:
//! build, lookup, to/from bytes.

use boomphf::Mphf;

use crate::error::Result;

/// Load factor passed to the BBHash construction
const GAMMA: f64 = 1.7;

/// A minimal perfect hash function over a fixed set of u64 keys, mapping
/// each member key to a distinct index in `0..keys.len()`.
pub struct MiniMphf {
    inner: Mphf<u64>,
}

impl MiniMphf {
    /// Builds the hash function over a set of distinct keys.
    #[must_use]
    pub fn build(keys: &[u64]) -> Self {
        Self {
            inner: Mphf::new(GAMMA, keys),
        }
    }

    /// Returns the index of `key`, or `None` for most keys outside the build
    /// set. False positives map arbitrary non-member keys into the range, as
    /// is inherent to minimal perfect hashing.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        self.inner.try_hash(&key)
    }

    /// Serializes the function for embedding in a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.inner)?)
    }

    /// Reconstructs a function previously serialized with [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: bincode::deserialize(bytes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_minimal_and_perfect() {
        let keys: Vec<u64> = (0..1000).map(|i| i * 7 + 13).collect();
        let mphf = MiniMphf::build(&keys);

        let mut seen = vec![false; keys.len()];
        for key in &keys {
            let idx = mphf.lookup(*key).unwrap() as usize;
            assert!(idx < keys.len());
            assert!(!seen[idx], "two keys hashed to index {idx}");
            seen[idx] = true;
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let keys = [0x01u64, 0x02, 0x03, 0xDEAD, 0xBEEF];
        let mphf = MiniMphf::build(&keys);

        let bytes = mphf.to_bytes().unwrap();
        let restored = MiniMphf::from_bytes(&bytes).unwrap();
        for key in &keys {
            assert_eq!(mphf.lookup(*key), restored.lookup(*key));
        }
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(MiniMphf::from_bytes(&[0xFF; 3]).is_err());
    }
}
