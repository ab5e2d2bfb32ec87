//! Client settings from the environment. Command-line flags win over these.

use std::str::FromStr;

use peerdrop_session::WebRtcConfig;
use peerdrop_shared::constants::CHUNK_SIZE;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Env: `PEERDROP_RELAY_URL`
    pub relay_url: String,
    /// Env: `PEERDROP_STUN_URLS`, comma separated
    pub stun_urls: Vec<String>,
    /// Env: `PEERDROP_CHUNK_SIZE`
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            stun_urls: WebRtcConfig::default().ice_servers,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PEERDROP_RELAY_URL").filter(|u| !u.trim().is_empty()) {
            config.relay_url = url.trim().to_string();
        }

        if let Some(urls) = lookup("PEERDROP_STUN_URLS") {
            config.stun_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(value) = lookup("PEERDROP_CHUNK_SIZE") {
            match usize::from_str(value.trim()) {
                Ok(size) if size > 0 => config.chunk_size = size,
                _ => tracing::warn!(value = %value, "Invalid PEERDROP_CHUNK_SIZE, using default"),
            }
        }

        config
    }

    pub fn webrtc(&self) -> WebRtcConfig {
        WebRtcConfig {
            ice_servers: self.stun_urls.clone(),
        }
    }
}
