//! Relay configuration loaded from environment variables.
//!
//! Every setting has a default so the relay starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use peerdrop_shared::constants::DEFAULT_HTTP_PORT;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// A room expires this long after its last write.
    /// Env: `ROOM_TTL_SECS`
    /// Default: one hour
    pub room_ttl: Duration,

    /// Largest accepted PUT body. Session descriptions are a few KiB.
    /// Env: `MAX_BODY_BYTES`
    /// Default: 64 KiB
    pub max_body_bytes: usize,

    /// Upper bound on live rooms.
    /// Env: `MAX_ROOMS`
    /// Default: `100000`
    pub max_rooms: usize,

    /// Sustained requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    pub rate_limit_per_sec: f64,

    /// Burst allowance per client IP.
    /// Env: `RATE_LIMIT_BURST`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            room_ttl: Duration::from_secs(3600),
            max_body_bytes: 64 * 1024,
            max_rooms: 100_000,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_with(&lookup, "HTTP_ADDR", &mut config.http_addr);
        override_with(&lookup, "MAX_BODY_BYTES", &mut config.max_body_bytes);
        override_with(&lookup, "MAX_ROOMS", &mut config.max_rooms);
        override_with(&lookup, "RATE_LIMIT_PER_SEC", &mut config.rate_limit_per_sec);
        override_with(&lookup, "RATE_LIMIT_BURST", &mut config.rate_limit_burst);

        let mut ttl_secs = config.room_ttl.as_secs();
        override_with(&lookup, "ROOM_TTL_SECS", &mut ttl_secs);
        config.room_ttl = Duration::from_secs(ttl_secs);

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, field: &mut T) {
    let Some(value) = lookup(key) else {
        return;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => *field = parsed,
        Err(_) => tracing::warn!(key, value = %value, "Invalid value, using default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.room_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_body_bytes, 65_536);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("ROOM_TTL_SECS", "60"),
            ("MAX_ROOMS", "5"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.room_ttl, Duration::from_secs(60));
        assert_eq!(config.max_rooms, 5);
    }

    #[test]
    fn test_invalid_value_keeps_default() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "not an addr"),
            ("RATE_LIMIT_BURST", "lots"),
        ]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.rate_limit_burst, 30.0);
    }
}
