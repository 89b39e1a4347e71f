//! One-shot consumer of funding receipts

use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Default retention for consumed receipts in remote backends
#[cfg(any(feature = "redis", feature = "dynamodb"))]
const DEFAULT_RETENTION_SECONDS: u64 = 86_400;

/// One-shot token store.
///
/// `consume_once` is linearizable: across every orchestrator sharing the
/// store, exactly one call per `(namespace, id)` returns `true`.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Consume the receipt; `true` on first presentation, `false` after
    async fn consume_once(&self, namespace: &str, receipt_id: &str) -> Result<bool>;
}

/// Process-local store; insertion into the set is the consume
#[derive(Default)]
pub struct InMemoryReceiptStore {
    used: Mutex<HashSet<String>>,
}

impl InMemoryReceiptStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn consume_once(&self, namespace: &str, receipt_id: &str) -> Result<bool> {
        let key = format!("{namespace}:{receipt_id}");
        Ok(self.used.lock().unwrap().insert(key))
    }
}

/// Remote key-value store; atomic `SET NX EX` is the consume
#[cfg(feature = "redis")]
pub struct RedisReceiptStore {
    connection: redis::aio::ConnectionManager,
    prefix: String,
    retention_seconds: u64,
}

#[cfg(feature = "redis")]
impl RedisReceiptStore {
    /// Create a store over an established connection
    pub fn new(connection: redis::aio::ConnectionManager) -> Self {
        Self {
            connection,
            prefix: "receipt:".to_string(),
            retention_seconds: DEFAULT_RETENTION_SECONDS,
        }
    }

    /// Override how long consumed receipts are retained
    pub fn with_retention_seconds(mut self, seconds: u64) -> Self {
        self.retention_seconds = seconds;
        self
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl ReceiptStore for RedisReceiptStore {
    async fn consume_once(&self, namespace: &str, receipt_id: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(format!("{}{namespace}:{receipt_id}", self.prefix))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.retention_seconds.max(1))
            .query_async(&mut connection)
            .await
            .map_err(|e| crate::VisaDirectError::store(format!("redis SET failed: {e}")))?;
        Ok(set.is_some())
    }
}

/// Remote table store; the conditional insert on `receiptId` is the consume
#[cfg(feature = "dynamodb")]
pub struct DynamoReceiptStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    retention_seconds: u64,
}

#[cfg(feature = "dynamodb")]
impl DynamoReceiptStore {
    /// Create a store over a table
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            retention_seconds: DEFAULT_RETENTION_SECONDS,
        }
    }

    /// Override how long consumed receipts are retained
    pub fn with_retention_seconds(mut self, seconds: u64) -> Self {
        self.retention_seconds = seconds;
        self
    }
}

#[cfg(feature = "dynamodb")]
#[async_trait]
impl ReceiptStore for DynamoReceiptStore {
    async fn consume_once(&self, namespace: &str, receipt_id: &str) -> Result<bool> {
        use aws_sdk_dynamodb::types::AttributeValue;
        let expires_at = chrono::Utc::now().timestamp() + self.retention_seconds as i64;
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .item(
                "receiptId",
                AttributeValue::S(format!("{namespace}#{receipt_id}")),
            )
            .item("ttl", AttributeValue::N(expires_at.to_string()))
            .condition_expression("attribute_not_exists(receiptId)")
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    Ok(false)
                } else {
                    Err(crate::VisaDirectError::store(format!(
                        "dynamodb put_item failed: {service_error}"
                    )))
                }
            }
        }
    }
}
