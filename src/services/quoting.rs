//! FX quote locking

use crate::storage::{Cache, InMemoryCache};
use crate::transport::Transport;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Locked quotes stay cached for five minutes
const QUOTE_TTL: Duration = Duration::from_secs(300);

/// A locked FX quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxQuote {
    /// Opaque quote identifier carried in the dispatched payout body
    pub quote_id: String,
    /// Expiry instant; must be strictly in the future at dispatch time
    pub expires_at: DateTime<Utc>,
}

/// Locks FX quotes over the secure transport, cached per currency pair
/// and amount with best-effort background revalidation
pub struct QuotingService {
    http: Arc<dyn Transport>,
    cache: Arc<dyn Cache>,
}

impl QuotingService {
    /// Create a service with a process-local cache
    pub fn new(http: Arc<dyn Transport>) -> Self {
        Self::with_cache(http, Arc::new(InMemoryCache::new()))
    }

    /// Create a service over a caller-provided cache
    pub fn with_cache(http: Arc<dyn Transport>, cache: Arc<dyn Cache>) -> Self {
        Self { http, cache }
    }

    /// Lock a quote for the currency pair and amount
    pub async fn lock(
        &self,
        src_currency: &str,
        dst_currency: &str,
        amount_minor: u64,
    ) -> Result<FxQuote> {
        let key = format!("quote:{src_currency}:{dst_currency}:{amount_minor}");
        let (cached, should_revalidate) = self.cache.get_with_revalidate(&key).await?;
        if let Some(value) = cached {
            if should_revalidate {
                self.spawn_revalidate(key, src_currency, dst_currency, amount_minor);
            }
            return Ok(serde_json::from_value(value)?);
        }
        let body = self
            .http
            .post(
                "/forexrates/v1/lock",
                lock_body(src_currency, dst_currency, amount_minor),
                &[],
            )
            .await?
            .body;
        self.cache.set(&key, body.clone(), QUOTE_TTL).await?;
        Ok(serde_json::from_value(body)?)
    }

    fn spawn_revalidate(
        &self,
        key: String,
        src_currency: &str,
        dst_currency: &str,
        amount_minor: u64,
    ) {
        let http = Arc::clone(&self.http);
        let cache = Arc::clone(&self.cache);
        let payload = lock_body(src_currency, dst_currency, amount_minor);
        tokio::spawn(async move {
            match http.post("/forexrates/v1/lock", payload, &[]).await {
                Ok(response) => {
                    let _ = cache.set(&key, response.body, QUOTE_TTL).await;
                }
                Err(err) => {
                    tracing::debug!(error = %err, key, "quote revalidation failed");
                }
            }
        });
    }
}

fn lock_body(src_currency: &str, dst_currency: &str, amount_minor: u64) -> serde_json::Value {
    json!({
        "src": src_currency,
        "dst": dst_currency,
        "amount": { "minor": amount_minor },
    })
}
