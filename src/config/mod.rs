//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Whether the optimized geometry backend may be used
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelerationMode {
    /// Probe the optimized backend at startup and use it if it passes
    Auto,
    /// Always use the reference implementation
    Off,
}

impl FromStr for AccelerationMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "on" => Ok(Self::Auto),
            "off" | "reference" => Ok(Self::Off),
            _ => Err(()),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Time between cleanup sweeps
    pub cleanup_interval: Duration,
    /// Players idle for longer than this are swept
    pub stale_after: Duration,

    pub acceleration: AccelerationMode,

    /// Inbound messages per second allowed per connection
    pub input_rate_limit: u32,
    /// Outbound queue capacity per connection
    pub outbound_queue: usize,

    /// Allowed client origins for CORS; empty allows any
    pub client_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            log_level: "info".to_string(),
            cleanup_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(10),
            acceleration: AccelerationMode::Auto,
            input_rate_limit: 120,
            outbound_queue: 256,
            client_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(value) => positive::<u64>(key, &value).map(Duration::from_secs),
                None => Ok(default),
            }
        };

        let acceleration = match lookup("GEOMETRY_ACCELERATION") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid("GEOMETRY_ACCELERATION"))?,
            None => defaults.acceleration,
        };

        let input_rate_limit = match lookup("INPUT_RATE_LIMIT") {
            Some(value) => positive("INPUT_RATE_LIMIT", &value)?,
            None => defaults.input_rate_limit,
        };

        let outbound_queue = match lookup("OUTBOUND_QUEUE") {
            Some(value) => positive("OUTBOUND_QUEUE", &value)?,
            None => defaults.outbound_queue,
        };

        let client_origins = lookup("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval)?,
            stale_after: secs("STALE_PLAYER_SECS", defaults.stale_after)?,
            acceleration,
            input_rate_limit,
            outbound_queue,
            client_origins,
        })
    }
}

fn positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::Invalid(key)),
    }
}

/// Configuration errors
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.cleanup_interval, Duration::from_secs(30));
        assert_eq!(config.stale_after, Duration::from_secs(10));
        assert_eq!(config.acceleration, AccelerationMode::Auto);
        assert!(config.client_origins.is_empty());
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1")]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("SERVER_ADDR", "127.0.0.1:7000"),
            ("CLEANUP_INTERVAL_SECS", "5"),
            ("STALE_PLAYER_SECS", "2"),
            ("GEOMETRY_ACCELERATION", "off"),
            ("INPUT_RATE_LIMIT", "30"),
            ("OUTBOUND_QUEUE", "16"),
            ("CLIENT_ORIGIN", "http://a.test, http://b.test,"),
        ])
        .unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.cleanup_interval, Duration::from_secs(5));
        assert_eq!(config.stale_after, Duration::from_secs(2));
        assert_eq!(config.acceleration, AccelerationMode::Off);
        assert_eq!(config.input_rate_limit, 30);
        assert_eq!(config.outbound_queue, 16);
        assert_eq!(config.client_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            load(&[("CLEANUP_INTERVAL_SECS", "0")]).unwrap_err(),
            ConfigError::Invalid("CLEANUP_INTERVAL_SECS")
        );
        assert_eq!(
            load(&[("OUTBOUND_QUEUE", "lots")]).unwrap_err(),
            ConfigError::Invalid("OUTBOUND_QUEUE")
        );
        assert_eq!(
            load(&[("GEOMETRY_ACCELERATION", "turbo")]).unwrap_err(),
            ConfigError::Invalid("GEOMETRY_ACCELERATION")
        );
        assert_eq!(load(&[("PORT", "http")]).unwrap_err(), ConfigError::InvalidAddress);
    }
}
