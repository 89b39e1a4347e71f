//! TTL key-value cache with a stale-while-revalidate signal

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL cache contract.
///
/// `get_with_revalidate` returns the cached value together with a flag
/// that turns true once the entry has consumed more than half of its TTL;
/// callers use it to trigger a best-effort background refresh.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get an unexpired value
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value for `ttl`
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Get an unexpired value plus its revalidation signal
    async fn get_with_revalidate(&self, key: &str) -> Result<(Option<Value>, bool)>;
}

struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
}

/// Process-local cache; expired entries are dropped on read
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.entries.lock().unwrap().insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get_with_revalidate(&self, key: &str) -> Result<(Option<Value>, bool)> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                let ttl = entry.expires_at - entry.created_at;
                let age = now - entry.created_at;
                Ok((Some(entry.value.clone()), age > ttl / 2))
            }
            Some(_) => {
                entries.remove(key);
                Ok((None, false))
            }
            None => Ok((None, false)),
        }
    }
}

/// Remote key-value cache. Entries carry their creation time so the
/// revalidation signal survives the round trip.
#[cfg(feature = "redis")]
pub struct RedisCache {
    connection: redis::aio::ConnectionManager,
    prefix: String,
}

#[cfg(feature = "redis")]
impl RedisCache {
    /// Create a cache over an established connection
    pub fn new(connection: redis::aio::ConnectionManager) -> Self {
        Self {
            connection,
            prefix: "cache:".to_string(),
        }
    }

    /// Override the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn wire_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_with_revalidate(key).await?.0)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let envelope = serde_json::json!({
            "payload": value,
            "createdAt": chrono::Utc::now().timestamp(),
            "ttlSeconds": ttl.as_secs(),
        });
        let mut connection = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(self.wire_key(key))
            .arg(envelope.to_string())
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("redis SET failed: {e}")))?;
        Ok(())
    }

    async fn get_with_revalidate(&self, key: &str) -> Result<(Option<Value>, bool)> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.wire_key(key))
            .query_async(&mut connection)
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("redis GET failed: {e}")))?;
        let Some(raw) = raw else {
            return Ok((None, false));
        };
        let envelope: Value = serde_json::from_str(&raw)?;
        let created_at = envelope["createdAt"].as_i64().unwrap_or_default();
        let ttl = envelope["ttlSeconds"].as_i64().unwrap_or_default();
        let age = chrono::Utc::now().timestamp() - created_at;
        let should_revalidate = ttl > 0 && age > ttl / 2;
        Ok((Some(envelope["payload"].clone()), should_revalidate))
    }
}

/// Remote table cache keyed on a `cacheKey` attribute; expired items are
/// filtered on read rather than relying on the table's TTL sweeper
#[cfg(feature = "dynamodb")]
pub struct DynamoCache {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

#[cfg(feature = "dynamodb")]
impl DynamoCache {
    /// Create a cache over a table
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<(Value, i64, i64)>> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("cacheKey", AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("dynamodb get_item failed: {e}")))?;
        let Some(item) = output.item else {
            return Ok(None);
        };
        let expires_at = item
            .get("ttl")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or_default();
        let created_at = item
            .get("createdAt")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or_default();
        let payload = match item.get("payload").and_then(|v| v.as_s().ok()) {
            Some(raw) => serde_json::from_str(raw)?,
            None => return Ok(None),
        };
        Ok(Some((payload, created_at, expires_at)))
    }
}

#[cfg(feature = "dynamodb")]
#[async_trait]
impl Cache for DynamoCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.fetch(key).await? {
            Some((payload, _, expires_at)) if expires_at > chrono::Utc::now().timestamp() => {
                Ok(Some(payload))
            }
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let now = chrono::Utc::now().timestamp();
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("cacheKey", AttributeValue::S(key.to_string()))
            .item("payload", AttributeValue::S(value.to_string()))
            .item("ttl", AttributeValue::N((now + ttl.as_secs() as i64).to_string()))
            .item("createdAt", AttributeValue::N(now.to_string()))
            .send()
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("dynamodb put_item failed: {e}")))?;
        Ok(())
    }

    async fn get_with_revalidate(&self, key: &str) -> Result<(Option<Value>, bool)> {
        let now = chrono::Utc::now().timestamp();
        match self.fetch(key).await? {
            Some((payload, created_at, expires_at)) if expires_at > now => {
                let ttl = expires_at - created_at;
                let age = now - created_at;
                Ok((Some(payload), ttl > 0 && age > ttl / 2))
            }
            _ => Ok((None, false)),
        }
    }
}
