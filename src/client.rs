//! Client facade: environment-driven configuration, shared orchestrator,
//! and the payout builder entry point

use crate::builder::PayoutBuilder;
use crate::orchestrator::Orchestrator;
use crate::transport::{SecureHttpClient, Transport, TransportConfig};
use crate::types::{EnvMode, Receipt};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Client configuration. Explicit values win; anything unset falls back
/// to the corresponding environment variable at construction time.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Base URL (`VISA_BASE_URL`)
    pub base_url: Option<String>,
    /// Client certificate path (`VISA_CERT_PATH`)
    pub cert_path: Option<PathBuf>,
    /// Client key path (`VISA_KEY_PATH`)
    pub key_path: Option<PathBuf>,
    /// CA bundle path (`VISA_CA_PATH`)
    pub ca_path: Option<PathBuf>,
    /// Endpoint registry file (`VISA_ENDPOINTS_FILE`)
    pub endpoints_file: Option<PathBuf>,
    /// Environment posture (`SDK_ENV`)
    pub env_mode: Option<EnvMode>,
    /// Remote cache URL (`REDIS_URL`); enables shared stores when the
    /// `redis` feature is on
    pub redis_url: Option<String>,
    /// Default originator id (`VISA_ORIGINATOR_ID`)
    pub originator_id: Option<String>,
    /// API credentials (`VISA_USER_ID`, `VISA_PASSWORD`, `VISA_API_KEY`,
    /// `VISA_SHARED_SECRET`)
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub shared_secret: Option<String>,
}

impl ClientConfig {
    /// Start from an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every unset field from the environment
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("VISA_BASE_URL"),
            cert_path: env_path("VISA_CERT_PATH"),
            key_path: env_path("VISA_KEY_PATH"),
            ca_path: env_path("VISA_CA_PATH"),
            endpoints_file: env_path("VISA_ENDPOINTS_FILE"),
            env_mode: Some(EnvMode::from_env()),
            redis_url: env_string("REDIS_URL"),
            originator_id: env_string("VISA_ORIGINATOR_ID"),
            user_id: env_string("VISA_USER_ID"),
            password: env_string("VISA_PASSWORD"),
            api_key: env_string("VISA_API_KEY"),
            shared_secret: env_string("VISA_SHARED_SECRET"),
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the mutual-TLS identity paths
    pub fn with_client_identity(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    /// Set the CA bundle path
    pub fn with_ca_bundle(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    /// Set the environment posture
    pub fn with_env_mode(mut self, mode: EnvMode) -> Self {
        self.env_mode = Some(mode);
        self
    }

    /// Set the default originator id
    pub fn with_originator_id(mut self, originator_id: impl Into<String>) -> Self {
        self.originator_id = Some(originator_id.into());
        self
    }

    /// Set the remote cache URL
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_path(name: &str) -> Option<PathBuf> {
    env_string(name).map(PathBuf::from)
}

/// SDK client owning the secure transport and the orchestrator.
///
/// Stores passed in by the caller are borrowed; `close` only releases
/// connections the client itself opened.
pub struct VisaDirectClient {
    transport: Arc<SecureHttpClient>,
    orchestrator: Arc<Orchestrator>,
    originator_id: Option<String>,
    #[cfg(feature = "redis")]
    redis: Option<redis::aio::ConnectionManager>,
}

impl VisaDirectClient {
    /// Build a client from the environment
    pub async fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()).await
    }

    /// Build a client from explicit configuration
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let mut transport_config = TransportConfig::new();
        if let Some(base_url) = &config.base_url {
            transport_config = transport_config.with_base_url(base_url);
        }
        if let (Some(cert), Some(key)) = (&config.cert_path, &config.key_path) {
            transport_config = transport_config.with_client_identity(cert, key);
        }
        if let Some(ca) = &config.ca_path {
            transport_config = transport_config.with_ca_bundle(ca);
        }
        if let Some(endpoints) = &config.endpoints_file {
            transport_config = transport_config.with_endpoints_file(endpoints);
        }
        if let Some(mode) = config.env_mode {
            transport_config = transport_config.with_env_mode(mode);
        }
        let transport = Arc::new(SecureHttpClient::new(transport_config)?);

        #[allow(unused_mut)]
        let mut orchestrator =
            Orchestrator::new(Arc::clone(&transport) as Arc<dyn Transport>);

        #[cfg(feature = "redis")]
        let redis = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())
                    .map_err(|e| crate::VisaDirectError::store(format!("invalid redis URL: {e}")))?;
                let manager = client.get_connection_manager().await.map_err(|e| {
                    crate::VisaDirectError::store(format!("redis connection failed: {e}"))
                })?;
                orchestrator = orchestrator
                    .with_idempotency_store(Arc::new(
                        crate::storage::RedisIdempotencyStore::new(manager.clone()),
                    ))
                    .with_receipt_store(Arc::new(crate::storage::RedisReceiptStore::new(
                        manager.clone(),
                    )));
                Some(manager)
            }
            None => None,
        };
        #[cfg(not(feature = "redis"))]
        {
            if config.redis_url.is_some() {
                tracing::warn!(
                    "REDIS_URL set but the redis feature is disabled, using in-memory stores"
                );
            }
        }

        Ok(Self {
            transport,
            orchestrator: Arc::new(orchestrator),
            originator_id: config.originator_id,
            #[cfg(feature = "redis")]
            redis,
        })
    }

    /// Start assembling a payout; the configured originator is pre-filled
    pub fn payouts(&self) -> PayoutBuilder {
        let builder = PayoutBuilder::new(Arc::clone(&self.orchestrator));
        match &self.originator_id {
            Some(originator_id) => builder.for_originator(originator_id.clone()),
            None => builder,
        }
    }

    /// Look up the status of a previously dispatched payout
    pub async fn payout_status(&self, payout_id: &str) -> Result<Receipt> {
        let response = self
            .transport
            .get(&format!("/visapayouts/v3/payouts/{payout_id}"))
            .await?;
        Ok(Receipt(response.body))
    }

    /// The shared orchestrator, for callers constructing requests directly
    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// The underlying secure transport
    pub fn transport(&self) -> Arc<SecureHttpClient> {
        Arc::clone(&self.transport)
    }

    /// Release client-owned connections. Caller-provided stores are
    /// borrowed and remain untouched.
    pub fn close(self) {
        #[cfg(feature = "redis")]
        drop(self.redis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_construction_with_explicit_config() {
        let client = VisaDirectClient::new(
            ClientConfig::new()
                .with_base_url("https://sandbox.api.visa.test")
                .with_env_mode(EnvMode::Dev)
                .with_originator_id("fi-001"),
        )
        .await
        .unwrap();
        assert_eq!(client.transport().env_mode(), EnvMode::Dev);
        client.close();
    }

    #[test]
    fn test_config_explicit_values_win() {
        let config = ClientConfig::from_env().with_base_url("https://explicit.example");
        assert_eq!(config.base_url.as_deref(), Some("https://explicit.example"));
    }
}
