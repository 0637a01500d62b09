//! Server configuration read from the environment.

use std::time::Duration;

use actors::{DeliveryPolicy, NeynarConfig, SweepConfig};
use db::StoreConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}={value}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    /// `None` selects the dry-run transport.
    pub neynar: Option<NeynarConfig>,
    pub bind_address: String,
    pub port: u16,
    pub policy: DeliveryPolicy,
    pub sweep: SweepConfig,
}

impl AppConfig {
    /// Build a config from environment variables.
    ///
    /// Store:
    /// - `REDIS_URL` (`redis://…`; unset or `memory://` keeps everything in memory)
    ///
    /// Transport:
    /// - `NEYNAR_API_KEY` (notifications are only logged when unset)
    /// - `NEYNAR_API_BASE` (default: `https://api.neynar.com/v2`)
    ///
    /// HTTP:
    /// - `API_BIND_ADDRESS` (default: `0.0.0.0`), `API_PORT` (default: `3000`)
    ///
    /// Delivery:
    /// - `BROADCAST_RATE_PER_SEC` (default: 4)
    /// - `BROADCAST_MAX_ATTEMPTS` (default: 3)
    /// - `BROADCAST_ATTEMPT_TIMEOUT_SECS` (default: 10)
    /// - `BROADCAST_RUN_BUDGET_SECS` (default: 300, `0` for no limit)
    /// - `BROADCAST_LEASE_SECS` (default: 300)
    /// - `BROADCAST_SWEEP_INTERVAL_SECS` (default: 60, `0` disables the sweep)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).and_then(non_empty);

        let store = match var("REDIS_URL") {
            Some(url) => StoreConfig::redis(url),
            None => StoreConfig::memory(),
        };

        let neynar = var("NEYNAR_API_KEY").map(|key| {
            let config = NeynarConfig::new(key);
            match var("NEYNAR_API_BASE") {
                Some(base) => config.with_base_url(base),
                None => config,
            }
        });

        let bind_address = var("API_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse(&var, "API_PORT", 3000u16)?;

        let rate: f64 = parse(&var, "BROADCAST_RATE_PER_SEC", 4.0)?;
        let max_attempts = parse(&var, "BROADCAST_MAX_ATTEMPTS", 3u32)?;
        let attempt_timeout = parse(&var, "BROADCAST_ATTEMPT_TIMEOUT_SECS", 10u64)?;
        let run_budget = parse(&var, "BROADCAST_RUN_BUDGET_SECS", 300u64)?;
        let lease = parse(&var, "BROADCAST_LEASE_SECS", 300u64)?;
        let sweep_interval = parse(&var, "BROADCAST_SWEEP_INTERVAL_SECS", 60u64)?;

        let policy = DeliveryPolicy::default()
            .with_rate_per_sec(rate)
            .with_max_attempts(max_attempts)
            .with_attempt_timeout(Duration::from_secs(attempt_timeout))
            .with_run_budget((run_budget > 0).then(|| Duration::from_secs(run_budget)));

        let sweep = SweepConfig::default()
            .with_lease(Duration::from_secs(lease))
            .with_interval(Duration::from_secs(sweep_interval));

        Ok(Self {
            store,
            neynar,
            bind_address,
            port,
            policy,
            sweep,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_need_no_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.store.endpoint, "memory://");
        assert!(config.neynar.is_none());
        assert_eq!(config.listen_addr(), "0.0.0.0:3000");
        assert_eq!(config.policy.max_attempts, 3);
        assert_eq!(config.policy.base_delay, Duration::from_millis(250));
        assert_eq!(config.policy.run_budget, Some(Duration::from_secs(300)));
        assert_eq!(config.sweep, SweepConfig::default());
    }

    #[test]
    fn reads_every_setting() {
        let config = config(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("NEYNAR_API_KEY", "key"),
            ("NEYNAR_API_BASE", "http://localhost:9999"),
            ("API_PORT", "8080"),
            ("BROADCAST_RATE_PER_SEC", "10"),
            ("BROADCAST_MAX_ATTEMPTS", "5"),
            ("BROADCAST_RUN_BUDGET_SECS", "0"),
            ("BROADCAST_SWEEP_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.store.endpoint, "redis://cache:6379");
        let neynar = config.neynar.unwrap();
        assert_eq!(neynar.api_key, "key");
        assert_eq!(neynar.base_url, "http://localhost:9999");
        assert_eq!(config.port, 8080);
        assert_eq!(config.policy.base_delay, Duration::from_millis(100));
        assert_eq!(config.policy.max_attempts, 5);
        assert_eq!(config.policy.run_budget, None);
        assert!(config.sweep.interval.is_zero());
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config(&[("REDIS_URL", "  "), ("NEYNAR_API_KEY", "")]).unwrap();
        assert_eq!(config.store.endpoint, "memory://");
        assert!(config.neynar.is_none());
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let err = config(&[("API_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("API_PORT=eighty"));
    }
}
