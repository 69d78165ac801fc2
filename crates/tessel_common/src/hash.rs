//! Fingerprints of trace streams.
//!
//! Two runs are compared by hashing what they traced rather than by keeping
//! both event lists around. Hashing uses XXH3-128.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// A 128-bit XXH3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Hashes a complete byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentHash(xxh3_128(data).to_le_bytes())
    }

    /// The raw digest, little-endian.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}

/// Streaming hasher for structured records.
///
/// Integers are fed little-endian and strings are length-prefixed, so
/// `("ab", "c")` and `("a", "bc")` hash differently.
pub struct ContentHasher {
    state: Xxh3,
    fed: u64,
}

impl ContentHasher {
    /// A hasher with the default seed.
    pub fn new() -> Self {
        ContentHasher {
            state: Xxh3::new(),
            fed: 0,
        }
    }

    /// Feeds raw bytes.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(data);
        self.fed += data.len() as u64;
        self
    }

    /// Feeds a `u32`.
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Feeds a `u64`.
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Feeds a length-prefixed string.
    pub fn str(&mut self, s: &str) -> &mut Self {
        self.u64(s.len() as u64).bytes(s.as_bytes())
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.fed
    }

    /// Whether nothing has been fed.
    pub fn is_empty(&self) -> bool {
        self.fed == 0
    }

    /// The digest of everything fed so far. The hasher stays usable.
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.state.digest128().to_le_bytes())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("fed", &self.fed)
            .finish_non_exhaustive()
    }
}
