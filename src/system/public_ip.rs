//! Public address discovery
//!
//! A failed lookup is a degraded condition, not an error: callers always get
//! an address back, falling back to the loopback hostname.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

/// Plain-text service that echoes the caller's public IP
pub const PUBLIC_IP_URL: &str = "https://api.ipify.org";

/// Fallback when the public address cannot be determined
pub const LOOPBACK_HOST: &str = "localhost";

/// Upper bound on the discovery request
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Externally reachable address of this host
    async fn public_address(&self) -> String;
}

/// Resolves the public address over HTTP
#[derive(Clone)]
pub struct PublicIpResolver {
    client: Client,
    url: String,
    timeout: Duration,
}

impl PublicIpResolver {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            url: PUBLIC_IP_URL.to_string(),
            timeout: LOOKUP_TIMEOUT,
        }
    }

    /// Query a different discovery endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn lookup(&self) -> Result<String, reqwest::Error> {
        let body = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

impl Default for PublicIpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for PublicIpResolver {
    async fn public_address(&self) -> String {
        match self.lookup().await {
            Ok(addr) if !addr.is_empty() => addr,
            Ok(_) => {
                warn!("Public IP service returned an empty body. Using {}.", LOOPBACK_HOST);
                LOOPBACK_HOST.to_string()
            }
            Err(e) => {
                warn!("Could not determine public IP ({}). Using {}.", e, LOOPBACK_HOST);
                LOOPBACK_HOST.to_string()
            }
        }
    }
}
