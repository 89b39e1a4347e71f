//! Keyed result store backing at-most-once payout execution

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result store keyed by idempotency key.
///
/// A stored result is terminal for its TTL window: the first successful
/// `put` wins, and later writes under the same key leave the stored value
/// untouched.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Get the stored result, filtering expired entries
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a result for `ttl`; a no-op when an unexpired result exists
    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;
}

/// Process-local store with check-and-set under a mutex
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > Instant::now() {
                // existing result is authoritative
                return Ok(());
            }
        }
        entries.insert(key.to_string(), (value.clone(), Instant::now() + ttl));
        Ok(())
    }
}

/// Remote key-value store; `SET NX EX` keeps the first stored result
/// authoritative across processes
#[cfg(feature = "redis")]
pub struct RedisIdempotencyStore {
    connection: redis::aio::ConnectionManager,
    prefix: String,
}

#[cfg(feature = "redis")]
impl RedisIdempotencyStore {
    /// Create a store over an established connection
    pub fn new(connection: redis::aio::ConnectionManager) -> Self {
        Self {
            connection,
            prefix: "idem:".to_string(),
        }
    }

    /// Override the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{}{}", self.prefix, key))
            .query_async(&mut connection)
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("redis GET failed: {e}")))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let mut connection = self.connection.clone();
        let _: Option<String> = redis::cmd("SET")
            .arg(format!("{}{}", self.prefix, key))
            .arg(value.to_string())
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("redis SET failed: {e}")))?;
        Ok(())
    }
}

/// Remote table store keyed on an `idk` attribute; the conditional insert
/// leaves a concurrent writer's value in place
#[cfg(feature = "dynamodb")]
pub struct DynamoIdempotencyStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

#[cfg(feature = "dynamodb")]
impl DynamoIdempotencyStore {
    /// Create a store over a table
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }
}

#[cfg(feature = "dynamodb")]
#[async_trait]
impl IdempotencyStore for DynamoIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("idk", AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("dynamodb get_item failed: {e}")))?;
        let Some(item) = output.item else {
            return Ok(None);
        };
        let expires_at = item
            .get("ttl")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse::<i64>().ok());
        if let Some(expires_at) = expires_at {
            if expires_at < chrono::Utc::now().timestamp() {
                return Ok(None);
            }
        }
        match item.get("payload").and_then(|v| v.as_s().ok()) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item("idk", AttributeValue::S(key.to_string()))
            .item("payload", AttributeValue::S(value.to_string()))
            .item("ttl", AttributeValue::N(expires_at.to_string()))
            .condition_expression("attribute_not_exists(idk)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    // a concurrent writer won; its value is authoritative
                    Ok(())
                } else {
                    Err(crate::VisaDirectError::store(format!(
                        "dynamodb put_item failed: {service_error}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_put_round_trip() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.get("k1").await.unwrap(), None);
        store
            .put("k1", &json!({"payoutId": "p-1"}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("k1").await.unwrap(),
            Some(json!({"payoutId": "p-1"}))
        );
    }

    #[tokio::test]
    async fn test_first_put_wins() {
        let store = InMemoryIdempotencyStore::new();
        store
            .put("k1", &json!({"payoutId": "first"}), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put("k1", &json!({"payoutId": "second"}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("k1").await.unwrap(),
            Some(json!({"payoutId": "first"}))
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaceable() {
        let store = InMemoryIdempotencyStore::new();
        store
            .put("k1", &json!("old"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k1").await.unwrap(), None);
        store
            .put("k1", &json!("new"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k1").await.unwrap(), Some(json!("new")));
    }
}
