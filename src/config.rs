//! Configuration Module
//!
//! Handles cache construction parameters and loading them from environment
//! variables.

use std::env;
use std::str::FromStr;

use crate::error::{CacheError, Result};

// == Environment Variables ==
pub const ENV_NAME: &str = "CACHE_NAME";
pub const ENV_TOTAL_COST_LIMIT: &str = "CACHE_TOTAL_COST_LIMIT";
pub const ENV_COUNT_LIMIT: &str = "CACHE_COUNT_LIMIT";
pub const ENV_CLEAR_ON_MEMORY_PRESSURE: &str = "CACHE_CLEAR_ON_MEMORY_PRESSURE";

/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Name used in log events
    pub name: String,
    /// Maximum sum of entry costs
    pub total_cost_limit: i64,
    /// Maximum number of entries
    pub count_limit: usize,
    /// Whether memory pressure signals empty the cache
    pub clear_on_memory_pressure: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Cache name (default: empty)
    /// - `CACHE_TOTAL_COST_LIMIT` - Total cost limit (default: unbounded)
    /// - `CACHE_COUNT_LIMIT` - Maximum entries (default: 1000)
    /// - `CACHE_CLEAR_ON_MEMORY_PRESSURE` - Clear on pressure (default: true)
    ///
    /// Unset variables fall back to their defaults. A variable that is set
    /// but cannot be parsed is an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            name: lookup(ENV_NAME).unwrap_or(defaults.name),
            total_cost_limit: parse_var(&lookup, ENV_TOTAL_COST_LIMIT, defaults.total_cost_limit)?,
            count_limit: parse_var(&lookup, ENV_COUNT_LIMIT, defaults.count_limit)?,
            clear_on_memory_pressure: match lookup(ENV_CLEAR_ON_MEMORY_PRESSURE) {
                Some(raw) => parse_bool(ENV_CLEAR_ON_MEMORY_PRESSURE, &raw)?,
                None => defaults.clear_on_memory_pressure,
            },
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            total_cost_limit: i64::MAX,
            count_limit: 1000,
            clear_on_memory_pressure: true,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(var, &raw)),
        None => Ok(default),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw)),
    }
}

fn invalid(var: &str, raw: &str) -> CacheError {
    CacheError::InvalidConfig {
        var: var.to_string(),
        value: raw.to_string(),
    }
}
