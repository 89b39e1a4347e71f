//! Secure transport: mutual-TLS HTTPS with selective message-level
//! encryption driven by the endpoint registry

use crate::endpoints::EndpointRegistry;
use crate::jwe;
use crate::jwks::KeySetCache;
use crate::types::EnvMode;
use crate::{Result, VisaDirectError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Parsed response from a transport call
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Decrypted/parsed body; a JSON value, or a string for non-JSON bodies
    pub body: Value,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
}

/// Seam between the orchestrator/services and the HTTP layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body to a logical path, enveloping it when the
    /// registry requires message-level encryption
    async fn post(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
    ) -> Result<TransportResponse>;

    /// GET a logical path
    async fn get(&self, path: &str) -> Result<TransportResponse>;
}

/// Configuration for [`SecureHttpClient`]
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base URL; falls back to `VISA_BASE_URL`, then the registry document
    pub base_url: Option<String>,
    /// Client certificate (PEM) for mutual TLS
    pub cert_path: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS
    pub key_path: Option<PathBuf>,
    /// CA bundle (PEM) used to verify the server
    pub ca_path: Option<PathBuf>,
    /// Endpoint registry file; falls back to `VISA_ENDPOINTS_FILE`, then
    /// the embedded default
    pub endpoints_file: Option<PathBuf>,
    /// Environment posture; falls back to `SDK_ENV`
    pub env_mode: Option<EnvMode>,
    /// Per-call timeout; unbounded when unset
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the mutual-TLS client certificate and key paths
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

    /// Set the endpoint registry file
    pub fn with_endpoints_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.endpoints_file = Some(path.into());
        self
    }

    /// Set the environment posture explicitly
    pub fn with_env_mode(mut self, mode: EnvMode) -> Self {
        self.env_mode = Some(mode);
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTPS client that enforces the registry's envelope requirements.
///
/// The environment posture is latched at construction: in production an
/// empty key set fails any envelope-required call closed; in dev the body
/// is sent as plain JSON and the passthrough is logged.
pub struct SecureHttpClient {
    http: reqwest::Client,
    base_url: String,
    registry: EndpointRegistry,
    jwks: KeySetCache,
    mode: EnvMode,
}

impl SecureHttpClient {
    /// Build a client from configuration
    pub fn new(config: TransportConfig) -> Result<Self> {
        let registry = EndpointRegistry::load(config.endpoints_file.as_deref())?;
        let base_url = config
            .base_url
            .or_else(|| std::env::var("VISA_BASE_URL").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| registry.base_urls.visa.clone());
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| VisaDirectError::config(format!("invalid base URL {base_url}: {e}")))?;
        let mode = config.env_mode.unwrap_or_else(EnvMode::from_env);

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) {
            let mut identity_pem = std::fs::read(key_path)?;
            identity_pem.extend_from_slice(&std::fs::read(cert_path)?);
            let identity = reqwest::Identity::from_pem(&identity_pem)
                .map_err(|e| VisaDirectError::config(format!("invalid client identity: {e}")))?;
            builder = builder.identity(identity);
        }
        if let Some(ca_path) = &config.ca_path {
            let bundle = std::fs::read(ca_path)?;
            let certificates = reqwest::Certificate::from_pem_bundle(&bundle)
                .map_err(|e| VisaDirectError::config(format!("invalid CA bundle: {e}")))?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
        let http = builder
            .build()
            .map_err(|e| VisaDirectError::config(format!("cannot build HTTP client: {e}")))?;

        let jwks = KeySetCache::new(http.clone(), &registry.jwks, mode);
        Ok(Self {
            http,
            base_url,
            registry,
            jwks,
            mode,
        })
    }

    /// The endpoint registry backing this client
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// The latched environment posture
    pub fn env_mode(&self) -> EnvMode {
        self.mode
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
        enveloped: bool,
    ) -> Result<TransportResponse> {
        let response = response.error_for_status()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let text = response.text().await?;
        let body = if enveloped {
            self.open_envelope(&text).await?
        } else {
            parse_maybe_json(&text)
        };
        Ok(TransportResponse {
            body,
            status,
            headers,
        })
    }

    /// Decrypt an enveloped response body. A `kid` missing from the cached
    /// key set triggers exactly one forced refresh before the retry; the
    /// refreshed set is stored before the retry reads it.
    async fn open_envelope(&self, text: &str) -> Result<Value> {
        // simulator/dev collaborators may answer in plain JSON
        if text.trim_start().starts_with('{') {
            return Ok(serde_json::from_str(text)?);
        }
        let keys = self.jwks.get().await?;
        match jwe::decrypt(text, &keys) {
            Ok(value) => Ok(value),
            Err(VisaDirectError::KeyIdUnknown { kid }) => {
                tracing::debug!(kid = %kid, "response kid missing from key set, refreshing");
                let keys = self.jwks.refresh().await?;
                jwe::decrypt(text, &keys)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Transport for SecureHttpClient {
    async fn post(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
    ) -> Result<TransportResponse> {
        let requires_mle = self.registry.requires_mle(path);
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.post(&url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let mut enveloped = false;
        if requires_mle {
            let keys = self.jwks.get().await?;
            match keys.first() {
                Some(key) => {
                    let envelope = jwe::encrypt(&body, key)?;
                    tracing::debug!(path, kid = %envelope.kid, "request body sealed");
                    request = request
                        .header("content-type", "application/jose")
                        .header("x-jwe-kid", &envelope.kid)
                        .body(envelope.token);
                    enveloped = true;
                }
                None => {
                    if self.mode.is_production() {
                        return Err(VisaDirectError::key_set_unavailable(
                            "no keys available for message-level encryption",
                        ));
                    }
                    tracing::warn!(path, "empty key set, dev plaintext passthrough");
                    request = request.json(&body);
                }
            }
        } else {
            request = request.json(&body);
        }

        let response = request.send().await?;
        self.read_response(response, enveloped).await
    }

    async fn get(&self, path: &str) -> Result<TransportResponse> {
        let requires_mle = self.registry.requires_mle(path);
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;
        self.read_response(response, requires_mle).await
    }
}

fn parse_maybe_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
