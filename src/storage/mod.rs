//! Pluggable stores: TTL caches, idempotency results, one-shot receipts.
//!
//! Every store has an in-memory backend that is safe for concurrent use,
//! plus remote key-value (feature `redis`) and remote table (feature
//! `dynamodb`) backends with identical contracts.

pub mod cache;
pub mod idempotency;
pub mod receipts;

pub use cache::{Cache, InMemoryCache};
pub use idempotency::{IdempotencyStore, InMemoryIdempotencyStore};
pub use receipts::{InMemoryReceiptStore, ReceiptStore};

#[cfg(feature = "redis")]
pub use cache::RedisCache;
#[cfg(feature = "redis")]
pub use idempotency::RedisIdempotencyStore;
#[cfg(feature = "redis")]
pub use receipts::RedisReceiptStore;

#[cfg(feature = "dynamodb")]
pub use cache::DynamoCache;
#[cfg(feature = "dynamodb")]
pub use idempotency::DynamoIdempotencyStore;
#[cfg(feature = "dynamodb")]
pub use receipts::DynamoReceiptStore;
