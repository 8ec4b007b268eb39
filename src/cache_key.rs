// dridev/src/cache_key.rs
//
//! SHA-1 cache keys for the on-disk shader cache.

use sha1::{Digest, Sha1};

use std::fmt::{self, Display, Formatter};

/// A 160-bit cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheKey(pub [u8; 20]);

impl CacheKey {
    /// Hashes a sequence of byte slices into one key.
    ///
    /// Callers feed in whatever distinguishes a cache namespace: driver
    /// name, device identity, build timestamp.
    pub fn compute<'a, I>(parts: I) -> CacheKey
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = Sha1::new();
        for part in parts {
            hasher.update(part);
        }
        CacheKey(hasher.finalize().into())
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
