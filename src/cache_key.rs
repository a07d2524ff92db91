//! Cache key generation
//!
//! Keys are SHA-256 digests of the ordered query-shaping arguments, so every
//! key has the same length and no user input reaches the Redis key space.

use sha2::{Digest, Sha256};
use std::fmt;

/// ASCII unit separator placed between parts before hashing.
const PART_SEPARATOR: u8 = 0x1f;

/// Key part standing in for "no country filter".
pub const ALL_COUNTRIES: &str = "all";

/// Key part marking a rendered chart rather than a row-set.
pub const PLOT_MODE: &str = "plot";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes the ordered parts into a 64-character lowercase hex key.
pub fn derive_key<I, S>(parts: I) -> CacheKey
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (index, part) in parts.into_iter().enumerate() {
        if index > 0 {
            hasher.update([PART_SEPARATOR]);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    CacheKey(hex::encode(hasher.finalize()))
}

/// Key for a row-set: `[table, column?, country | "all"]`.
pub fn query_rows(table: &str, column: Option<&str>, country: Option<&str>) -> CacheKey {
    let mut parts = vec![table];
    parts.extend(column);
    parts.push(country.unwrap_or(ALL_COUNTRIES));
    derive_key(parts)
}

/// Key for a rendered chart: `[table, column, country | "all", "plot"]`.
pub fn query_plot(table: &str, column: &str, country: Option<&str>) -> CacheKey {
    derive_key([table, column, country.unwrap_or(ALL_COUNTRIES), PLOT_MODE])
}
