//! # visa-direct-sdk — payout orchestration for push payments
//!
//! Client SDK driving a push-payments network (cards, bank accounts,
//! wallets) on behalf of an originating financial institution. Given a
//! funding source, a destination, an amount and an idempotency key, the
//! SDK executes exactly one payout — honoring cross-border FX and
//! corridor policies — and surfaces a stable receipt or a typed failure.
//!
//! ```no_run
//! use visa_direct_sdk::{ClientConfig, VisaDirectClient};
//!
//! # async fn run() -> visa_direct_sdk::Result<()> {
//! let client = VisaDirectClient::new(ClientConfig::from_env()).await?;
//! let receipt = client
//!     .payouts()
//!     .for_originator("fi-001")
//!     .with_funding_internal(true, "conf-123")
//!     .to_card_direct("tok_pan_411111******1111")
//!     .for_amount("USD", 101)
//!     .with_idempotency_key("k1")
//!     .execute()
//!     .await?;
//! println!("payout {:?} -> {:?}", receipt.payout_id(), receipt.status());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod jwe;
pub mod jwks;
pub mod orchestrator;
pub mod policy;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use builder::PayoutBuilder;
pub use client::{ClientConfig, VisaDirectClient};
pub use error::{Result, VisaDirectError};
pub use orchestrator::Orchestrator;
pub use transport::{SecureHttpClient, Transport, TransportConfig, TransportResponse};
pub use types::*;

/// Current version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
