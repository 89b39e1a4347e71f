//! Compensation events for failed post-commit steps

use crate::types::Funding;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Structured compensation event.
///
/// `event`, `saga_id`, `reason` and `timestamp` are required; `funding`
/// and `metadata` are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationEvent {
    pub event: String,
    pub saga_id: String,
    pub reason: String,
    /// RFC 3339 UTC timestamp with a `Z` suffix
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding: Option<Funding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CompensationEvent {
    /// Event emitted when a payout fails after its funding was committed
    pub fn payout_failed(
        saga_id: impl Into<String>,
        funding: Funding,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event: "payout_failed_requires_compensation".to_string(),
            saga_id: saga_id.into(),
            reason: reason.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            funding: Some(funding),
            metadata: Some(json!({ "message": message.into() })),
        }
    }

    /// True when every required field is populated
    pub fn is_complete(&self) -> bool {
        !self.event.is_empty()
            && !self.saga_id.is_empty()
            && !self.reason.is_empty()
            && !self.timestamp.is_empty()
    }
}

/// Sink for compensation events.
///
/// `emit` must return immediately and never propagate errors; emission is
/// best-effort and must not mask the failure that produced the event.
pub trait CompensationEmitter: Send + Sync {
    /// Emit an event without blocking the caller
    fn emit(&self, event: CompensationEvent);
}

/// Default sink: one structured log line per event
#[derive(Debug, Default, Clone)]
pub struct LogEmitter;

impl LogEmitter {
    /// Create the default emitter
    pub fn new() -> Self {
        Self
    }
}

impl CompensationEmitter for LogEmitter {
    fn emit(&self, event: CompensationEvent) {
        tracing::warn!(
            event = %event.event,
            saga_id = %event.saga_id,
            reason = %event.reason,
            timestamp = %event.timestamp,
            "compensation event"
        );
    }
}

/// Wrapper that drops events missing required fields before they reach
/// the inner sink
pub struct ValidatingEmitter<E> {
    inner: E,
}

impl<E: CompensationEmitter> ValidatingEmitter<E> {
    /// Wrap an emitter with schema validation
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: CompensationEmitter> CompensationEmitter for ValidatingEmitter<E> {
    fn emit(&self, event: CompensationEvent) {
        if !event.is_complete() {
            tracing::error!(saga_id = %event.saga_id, "rejected incomplete compensation event");
            return;
        }
        self.inner.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CollectingEmitter {
        events: Arc<Mutex<Vec<CompensationEvent>>>,
    }

    impl CompensationEmitter for CollectingEmitter {
        fn emit(&self, event: CompensationEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn sample_funding() -> Funding {
        Funding::Aft {
            receipt_id: "r-1".to_string(),
            status: "approved".to_string(),
        }
    }

    #[test]
    fn test_payout_failed_event_shape() {
        let event = CompensationEvent::payout_failed("k1", sample_funding(), "http_error", "boom");
        assert_eq!(event.event, "payout_failed_requires_compensation");
        assert_eq!(event.saga_id, "k1");
        assert!(event.timestamp.ends_with('Z'));
        assert_eq!(event.metadata.as_ref().unwrap()["message"], "boom");
        assert!(event.is_complete());
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let event = CompensationEvent::payout_failed("k1", sample_funding(), "http_error", "boom");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["sagaId"], "k1");
        assert!(value.get("saga_id").is_none());
    }

    #[test]
    fn test_validating_emitter_rejects_incomplete_events() {
        let collector = CollectingEmitter::default();
        let emitter = ValidatingEmitter::new(collector.clone());

        let mut incomplete =
            CompensationEvent::payout_failed("k1", sample_funding(), "http_error", "boom");
        incomplete.reason = String::new();
        emitter.emit(incomplete);
        assert!(collector.events.lock().unwrap().is_empty());

        emitter.emit(CompensationEvent::payout_failed(
            "k2",
            sample_funding(),
            "http_error",
            "boom",
        ));
        assert_eq!(collector.events.lock().unwrap().len(), 1);
    }
}
