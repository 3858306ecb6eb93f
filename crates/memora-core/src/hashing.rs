//! Hashing functions.

/// Trait for hash functions.
pub trait HashFunction: Send + Sync {
    /// Hash data and return raw bytes.
    fn hash(&self, data: &[u8]) -> Vec<u8>;

    /// Hash data and return hex string.
    fn hash_hex(&self, data: &[u8]) -> String {
        hex::encode(self.hash(data))
    }
}

/// Blake3 hasher - cryptographically secure, still fast.
pub struct Blake3Hasher;

impl Blake3Hasher {
    /// Create a new Blake3 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl HashFunction for Blake3Hasher {
    fn hash(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }
}

/// Short hex fingerprint of arbitrary bytes.
///
/// The first 8 bytes (16 hex chars) of the Blake3 digest. Used in logs and
/// diagnostics where printing a whole key would be noisy; never used as a
/// cache key itself.
#[must_use]
pub fn fingerprint(data: &[u8]) -> String {
    let hash = Blake3Hasher::new().hash(data);
    hex::encode(&hash[..8])
}
