use crate::error::Result;
use reqwest::blocking::{Client, ClientBuilder};
use std::time::Duration;

/// Production API root
pub const DEFAULT_API_ROOT: &str = "https://api.flair.co";

/// Create the HTTP client shared by every component of a session,
/// with connection pooling and a bounded per-request timeout
pub fn create_http_client(config: &Config) -> Result<Client> {
    let client = ClientBuilder::new()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .build()?;
    Ok(client)
}

/// Configuration for a Flair API session
#[derive(Debug, Clone)]
pub struct Config {
    /// Scheme and host every path is joined against
    pub api_root: String,
    /// Overall timeout for a single request
    pub timeout: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// A cached token is renewed once it is this close to expiry
    pub token_expiry_margin: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_root: DEFAULT_API_ROOT.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            token_expiry_margin: Duration::from_secs(60),
            pool_max_idle_per_host: 8,
        }
    }
}

impl Config {
    /// Create a new configuration for the given API root
    pub fn new(api_root: impl Into<String>) -> Self {
        Config {
            api_root: api_root.into(),
            ..Config::default()
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long before expiry a cached token is renewed
    pub fn with_token_expiry_margin(mut self, margin: Duration) -> Self {
        self.token_expiry_margin = margin;
        self
    }

    /// Set how many idle connections are kept per host
    pub fn with_pool_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }
}
