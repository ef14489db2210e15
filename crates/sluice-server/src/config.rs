// Server configuration
// Decision: invalid values fall back to defaults with a warning instead of
// refusing to start.

use std::str::FromStr;
use std::time::Duration;

use sluice_core::{BackoffPolicy, PoolConfig};

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_SIZE: usize = 64;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 50;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 2_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Process configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub workers: usize,
    pub queue_size: usize,
    pub backoff: BackoffPolicy,
    pub shutdown_timeout: Duration,
    /// Base seed for the workers' random sources; time-derived when unset.
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            backoff: BackoffPolicy::new(
                Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
                Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
            ),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same rules as `from_env`, over any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let addr = lookup("ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let workers = at_least_one(&lookup, "WORKERS", DEFAULT_WORKERS);
        let queue_size = at_least_one(&lookup, "QUEUE_SIZE", DEFAULT_QUEUE_SIZE);
        let base_ms = positive(&lookup, "BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS);
        let cap_ms = positive(&lookup, "BACKOFF_CAP_MS", DEFAULT_BACKOFF_CAP_MS);
        let shutdown_secs = parsed(
            &lookup,
            "SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        );
        let rng_seed = lookup("RNG_SEED").and_then(|raw| match raw.trim().parse() {
            Ok(seed) => Some(seed),
            Err(_) => {
                tracing::warn!(key = "RNG_SEED", value = %raw, "invalid value, using a time-derived seed");
                None
            }
        });

        Self {
            addr,
            workers,
            queue_size,
            backoff: BackoffPolicy::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(cap_ms),
            ),
            shutdown_timeout: Duration::from_secs(shutdown_secs),
            rng_seed,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            backoff: self.backoff,
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    if raw.trim().is_empty() {
        return default;
    }
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(key, value = %raw, %default, "invalid value, using default");
            default
        }
    }
}

/// Like `parsed`, but zero is raised to 1.
fn at_least_one(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    let v = parsed(lookup, key, default);
    if v == 0 {
        tracing::warn!(key, "value must be at least 1, using 1");
        return 1;
    }
    v
}

/// Like `parsed`, but zero also falls back to the default.
fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display + PartialEq + Default,
{
    let v = parsed(lookup, key, default);
    if v == T::default() {
        tracing::warn!(key, %default, "value must be at least 1, using default");
        return default;
    }
    v
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), ServerConfig::default());
    }

    #[test]
    fn reads_every_key() {
        let cfg = config(&[
            ("ADDR", "127.0.0.1:9000"),
            ("WORKERS", "8"),
            ("QUEUE_SIZE", "128"),
            ("BACKOFF_BASE_MS", "10"),
            ("BACKOFF_CAP_MS", "500"),
            ("SHUTDOWN_TIMEOUT_SECS", "3"),
            ("RNG_SEED", "42"),
        ]);
        assert_eq!(cfg.addr, "127.0.0.1:9000");
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.queue_size, 128);
        assert_eq!(cfg.backoff.base, Duration::from_millis(10));
        assert_eq!(cfg.backoff.cap, Duration::from_millis(500));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(3));
        assert_eq!(cfg.rng_seed, Some(42));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("WORKERS", "-2"),
            ("QUEUE_SIZE", "0"),
            ("BACKOFF_BASE_MS", "soon"),
            ("RNG_SEED", "abc"),
        ]);
        assert_eq!(cfg.workers, DEFAULT_WORKERS);
        assert_eq!(cfg.queue_size, 1);
        assert_eq!(cfg.backoff.base, Duration::from_millis(DEFAULT_BACKOFF_BASE_MS));
        assert_eq!(cfg.rng_seed, None);
    }

    #[test]
    fn zero_workers_and_queue_size_become_one() {
        let cfg = config(&[("WORKERS", "0"), ("QUEUE_SIZE", "0"), ("BACKOFF_CAP_MS", "0")]);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.queue_size, 1);
        // a zero backoff bound still falls back to its default
        assert_eq!(cfg.backoff.cap, Duration::from_millis(DEFAULT_BACKOFF_CAP_MS));
    }

    #[test]
    fn zero_shutdown_timeout_is_allowed() {
        let cfg = config(&[("SHUTDOWN_TIMEOUT_SECS", "0")]);
        assert_eq!(cfg.shutdown_timeout, Duration::ZERO);
    }
}
