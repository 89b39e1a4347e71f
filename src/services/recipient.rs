//! Recipient credential services: alias resolution, card validation,
//! payout-eligibility inquiry, and generic payout validation

use crate::storage::{Cache, InMemoryCache};
use crate::telemetry::redact;
use crate::transport::Transport;
use crate::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const LOOKUP_TTL: Duration = Duration::from_secs(60);

/// Cached recipient lookups over the secure transport.
///
/// Every lookup is read-through cached; once an entry passes half of its
/// TTL the next hit also triggers a fire-and-forget background refresh
/// that never blocks the caller and swallows its own errors.
pub struct RecipientService {
    http: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
}

impl RecipientService {
    /// Create a service with a process-local cache
    pub fn new(http: Arc<dyn Transport>) -> Self {
        Self::with_cache(http, Arc::new(InMemoryCache::new()))
    }

    /// Create a service over a caller-provided cache
    pub fn with_cache(http: Arc<dyn Transport>, cache: Arc<dyn Cache>) -> Self {
        Self { http, cache }
    }

    /// Resolve an alias to a payment credential
    pub async fn resolve_alias(&self, alias: &str, alias_type: &str) -> Result<Value> {
        let key = format!("alias:{alias_type}:{alias}");
        self.cached_post(
            key,
            "/visaaliasdirectory/v1/resolve",
            json!({ "alias": alias, "aliasType": alias_type }),
        )
        .await
    }

    /// Card validation (PAV) on a tokenized PAN
    pub async fn pav(&self, pan_token: &str) -> Result<Value> {
        tracing::debug!(pan = %redact(Some(pan_token)), "card validation lookup");
        let key = format!("pav:{pan_token}");
        self.cached_post(key, "/pav/v1/card/validation", json!({ "panToken": pan_token }))
            .await
    }

    /// Funds-transfer attributes inquiry (FTAI) on a tokenized PAN
    pub async fn ftai(&self, pan_token: &str) -> Result<Value> {
        let key = format!("ftai:{pan_token}");
        self.cached_post(
            key,
            "/paai/v1/fundstransfer/attributes/inquiry",
            json!({ "panToken": pan_token }),
        )
        .await
    }

    /// Generic payout validation, cached by a digest of the payload
    pub async fn validate(&self, payload: Value) -> Result<Value> {
        let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(payload.to_string().as_bytes()));
        let key = format!("validate:{digest}");
        self.cached_post(key, "/visapayouts/v3/payouts/validate", payload)
            .await
    }

    async fn cached_post(&self, key: String, path: &'static str, payload: Value) -> Result<Value> {
        let (cached, should_revalidate) = self.cache.get_with_revalidate(&key).await?;
        if let Some(value) = cached {
            if should_revalidate {
                self.spawn_revalidate(key, path, payload);
            }
            return Ok(value);
        }
        let response = self.http.post(path, payload, &[]).await?;
        self.cache.set(&key, response.body.clone(), LOOKUP_TTL).await?;
        Ok(response.body)
    }

    fn spawn_revalidate(&self, key: String, path: &'static str, payload: Value) {
        let http = Arc::clone(&self.http);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            match http.post(path, payload, &[]).await {
                Ok(response) => {
                    let _ = cache.set(&key, response.body, LOOKUP_TTL).await;
                }
                Err(err) => {
                    tracing::debug!(error = %err, key, "background revalidation failed");
                }
            }
        });
    }
}
