//! Centralized TTL constants for caching
//!
//! The base TTL comes from `REDIS_CACHE_TTL`; row-sets and charts can each be
//! overridden on their own.

use std::env;

// Default TTL constants (in seconds)
pub const TTL_DEFAULT: u64 = 300; // 5 minutes

/// Get TTL with environment variable override
pub fn ttl_with_env(env_key: &str, default_ttl: u64) -> u64 {
    env::var(env_key)
        .map(|val| val.parse::<u64>().unwrap_or(default_ttl))
        .unwrap_or(default_ttl)
}

/// Row-set TTL from `TTL_ROWS_SECONDS`, else the base TTL
pub fn get_rows_ttl(base_ttl: u64) -> u64 {
    ttl_with_env("TTL_ROWS_SECONDS", base_ttl)
}

/// Chart TTL from `TTL_CHARTS_SECONDS`, else the base TTL
pub fn get_charts_ttl(base_ttl: u64) -> u64 {
    ttl_with_env("TTL_CHARTS_SECONDS", base_ttl)
}
