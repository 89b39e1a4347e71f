//! TTL-cached key-set fetches for message-level encryption

use crate::endpoints::JwksConfig;
use crate::jwe::KeySet;
use crate::types::EnvMode;
use crate::{Result, VisaDirectError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Hard cap on a single key-set fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

struct CachedKeys {
    keys: KeySet,
    expires_at: Instant,
}

/// Caches the key set served by the configured JWKS URL.
///
/// Fetch failures fail closed in production; in dev they yield an empty
/// set that is cached for the full TTL to bound retry storms.
pub struct KeySetCache {
    http: reqwest::Client,
    url: Option<String>,
    ttl: Duration,
    mode: EnvMode,
    state: Mutex<Option<CachedKeys>>,
}

impl KeySetCache {
    /// Create a cache over a shared HTTP client
    pub fn new(http: reqwest::Client, config: &JwksConfig, mode: EnvMode) -> Self {
        Self {
            http,
            url: config.url().map(String::from),
            ttl: Duration::from_secs(config.cache_ttl_seconds),
            mode,
            state: Mutex::new(None),
        }
    }

    /// The current key set, fetching when the cached copy is absent or expired
    pub async fn get(&self) -> Result<KeySet> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.keys.clone());
            }
        }
        self.fill(&mut state).await
    }

    /// Invalidate and synchronously re-fetch; the new set is visible to
    /// every caller sharing this cache before this method returns
    pub async fn refresh(&self) -> Result<KeySet> {
        let mut state = self.state.lock().await;
        *state = None;
        self.fill(&mut state).await
    }

    async fn fill(&self, state: &mut Option<CachedKeys>) -> Result<KeySet> {
        let keys = match &self.url {
            None => KeySet::default(),
            Some(url) => match self.fetch(url).await {
                Ok(keys) => keys,
                Err(err) => {
                    if self.mode.is_production() {
                        return Err(VisaDirectError::key_set_unavailable(format!(
                            "unable to fetch key set: {err}"
                        )));
                    }
                    tracing::warn!(error = %err, "key set fetch failed, caching empty set");
                    KeySet::default()
                }
            },
        };
        *state = Some(CachedKeys {
            keys: keys.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        Ok(keys)
    }

    async fn fetch(&self, url: &str) -> Result<KeySet> {
        let response = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<KeySet>().await?)
    }
}
