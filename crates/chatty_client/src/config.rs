//! Client configuration, read from the environment with sane defaults.

use std::time::Duration;

use chatty_crypto::kdf::MIN_PBKDF2_ITERATIONS;
use reqwest::Url;

use crate::error::ClientError;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_SECS: u64 = 3;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the relay's REST API; the push channel lives at `/ws`.
    pub server_url: String,
    /// Fixed delay between push channel reconnect attempts.
    pub reconnect_delay: Duration,
    /// PBKDF2 iterations for the identity envelope. Must match every other
    /// client that opens the same envelope.
    pub kdf_iterations: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_SECS),
            kdf_iterations: MIN_PBKDF2_ITERATIONS,
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// `CHATTY_SERVER_URL`, `CHATTY_RECONNECT_SECS`, `CHATTY_KDF_ITERATIONS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset or unparsable values fall back
    /// to the defaults; iterations below the floor are raised to it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let server_url = lookup("CHATTY_SERVER_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.server_url);
        let reconnect_delay = lookup("CHATTY_RECONNECT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.reconnect_delay);
        let kdf_iterations = lookup("CHATTY_KDF_ITERATIONS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(defaults.kdf_iterations)
            .max(MIN_PBKDF2_ITERATIONS);

        Self {
            server_url,
            reconnect_delay,
            kdf_iterations,
        }
    }

    pub fn base_url(&self) -> Result<Url, ClientError> {
        Url::parse(&self.server_url)
            .map_err(|e| ClientError::Transport(format!("invalid server url {}: {e}", self.server_url)))
    }

    /// Push channel URL: same host, `ws`/`wss` scheme, path `/ws`.
    pub fn push_url(&self) -> Result<Url, ClientError> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Transport(format!("cannot derive push url from {}", self.server_url)))?;
        url.set_path("/ws");
        url.set_query(None);
        Ok(url)
    }
}
