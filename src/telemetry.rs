//! Tracing setup and redaction helpers.
//!
//! The SDK instruments itself with `tracing` spans and events; without a
//! subscriber installed they are noops, so library users pay nothing
//! until they opt in (either via [`init`] or their own subscriber).

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are noops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Mask a value for span attributes and log lines. Values that already
/// carry masking (contain `*`, like tokenized PANs) pass through.
pub fn redact(value: Option<&str>) -> String {
    match value {
        Some(v) if v.contains('*') => v.to_string(),
        _ => "[redacted]".to_string(),
    }
}
