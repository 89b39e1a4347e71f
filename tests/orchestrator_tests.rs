//! Orchestrator behavior against an in-process transport: guards,
//! idempotency, receipt burning, and the preflight pipeline

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use visa_direct_sdk::events::{CompensationEmitter, CompensationEvent};
use visa_direct_sdk::orchestrator::Orchestrator;
use visa_direct_sdk::policy::CorridorPolicy;
use visa_direct_sdk::services::{ComplianceScreen, ScreeningResult};
use visa_direct_sdk::storage::{InMemoryIdempotencyStore, InMemoryReceiptStore};
use visa_direct_sdk::transport::{Transport, TransportResponse};
use visa_direct_sdk::types::*;
use visa_direct_sdk::{Result, VisaDirectError};

const DISPATCH_PATHS: [&str; 3] = [
    "/visadirect/fundstransfer/v1/pushfunds",
    "/accountpayouts/v1/payout",
    "/walletpayouts/v1/payout",
];

/// Records every call and answers the way the payout network would
#[derive(Default)]
struct FakeNetwork {
    calls: Mutex<Vec<(String, Value, Vec<(String, String)>)>>,
    payout_counter: AtomicUsize,
    quote_expires_at: Mutex<Option<String>>,
    oct_eligible: Mutex<bool>,
    fail_dispatch: Mutex<bool>,
}

impl FakeNetwork {
    fn new() -> Arc<Self> {
        let network = Self {
            oct_eligible: Mutex::new(true),
            ..Self::default()
        };
        Arc::new(network)
    }

    fn dispatch_calls(&self) -> Vec<(String, Value, Vec<(String, String)>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _, _)| DISPATCH_PATHS.contains(&path.as_str()))
            .cloned()
            .collect()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn set_quote_expiry(&self, expires_at: &str) {
        *self.quote_expires_at.lock().unwrap() = Some(expires_at.to_string());
    }

    fn set_oct_eligible(&self, eligible: bool) {
        *self.oct_eligible.lock().unwrap() = eligible;
    }

    fn set_fail_dispatch(&self, fail: bool) {
        *self.fail_dispatch.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Transport for FakeNetwork {
    async fn post(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
    ) -> Result<TransportResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone(), headers.to_vec()));

        let response = match path {
            "/visaaliasdirectory/v1/resolve" => json!({
                "alias": body["alias"],
                "aliasType": body["aliasType"],
                "credentialType": "CARD",
                "panToken": "tok_pan_774411******9001",
            }),
            "/pav/v1/card/validation" => json!({ "cardStatus": "GOOD" }),
            "/paai/v1/fundstransfer/attributes/inquiry" => {
                let eligible = *self.oct_eligible.lock().unwrap();
                json!({ "octEligible": eligible, "reasonCodes": [] })
            }
            "/forexrates/v1/lock" => {
                let expires_at = self
                    .quote_expires_at
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| {
                        (Utc::now() + ChronoDuration::minutes(5)).to_rfc3339()
                    });
                json!({ "quoteId": "Q-1", "expiresAt": expires_at })
            }
            path if DISPATCH_PATHS.contains(&path) => {
                if *self.fail_dispatch.lock().unwrap() {
                    return Err(VisaDirectError::store("simulated network outage"));
                }
                let n = self.payout_counter.fetch_add(1, Ordering::SeqCst) + 1;
                json!({ "payoutId": format!("payout-{n}"), "status": "executed" })
            }
            other => return Err(VisaDirectError::invalid_request(format!("unexpected path {other}"))),
        };
        Ok(TransportResponse {
            body: response,
            status: 200,
            headers: HashMap::new(),
        })
    }

    async fn get(&self, _path: &str) -> Result<TransportResponse> {
        Err(VisaDirectError::invalid_request("GET not scripted"))
    }
}

#[derive(Clone, Default)]
struct CollectingEmitter {
    events: Arc<Mutex<Vec<CompensationEvent>>>,
}

impl CompensationEmitter for CollectingEmitter {
    fn emit(&self, event: CompensationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct DenyAll;

#[async_trait]
impl ComplianceScreen for DenyAll {
    async fn screen(&self, payload: &Value) -> Result<ScreeningResult> {
        Ok(ScreeningResult {
            approved: false,
            payload: payload.clone(),
        })
    }
}

fn card_request(idempotency_key: &str, funding: Funding) -> PayoutRequest {
    PayoutRequest {
        originator_id: "fi-001".to_string(),
        idempotency_key: idempotency_key.to_string(),
        funding,
        destination: Destination::Card {
            pan_token: "tok_pan_411111******1111".to_string(),
        },
        amount: Amount::new("USD", 101),
        preflight: Preflight::default(),
    }
}

fn internal_funding() -> Funding {
    Funding::Internal {
        debit_confirmed: true,
        confirmation_ref: "conf-123".to_string(),
    }
}

#[tokio::test]
async fn test_internal_funding_dispatches_once_and_stores_the_receipt() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let receipt = orchestrator
        .payout(card_request("k1", internal_funding()))
        .await
        .unwrap();
    assert_eq!(receipt.payout_id(), Some("payout-1"));
    assert_eq!(receipt.status(), Some("executed"));

    let dispatches = network.dispatch_calls();
    assert_eq!(dispatches.len(), 1);
    let (path, body, headers) = &dispatches[0];
    assert_eq!(path, "/visadirect/fundstransfer/v1/pushfunds");
    assert_eq!(body["originatorId"], "fi-001");
    assert_eq!(body["destination"]["type"], "CARD");
    assert!(body.get("fxQuoteId").is_none());
    assert!(headers
        .iter()
        .any(|(name, value)| name == "x-idempotency-key" && value == "k1"));
}

#[tokio::test]
async fn test_repeated_key_returns_stored_receipt_without_dispatch() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let first = orchestrator
        .payout(card_request("k1", internal_funding()))
        .await
        .unwrap();
    let second = orchestrator
        .payout(card_request("k1", internal_funding()))
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(network.dispatch_calls().len(), 1);
}

#[tokio::test]
async fn test_idempotency_key_is_authoritative_over_request_content() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let first = orchestrator
        .payout(card_request("k1", internal_funding()))
        .await
        .unwrap();

    let mut different = card_request("k1", internal_funding());
    different.amount = Amount::new("USD", 999);
    let second = orchestrator.payout(different).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(network.dispatch_calls().len(), 1);
}

#[tokio::test]
async fn test_concurrent_same_key_payouts_return_byte_equal_receipts() {
    let network = FakeNetwork::new();
    let orchestrator = Arc::new(Orchestrator::new(network.clone() as Arc<dyn Transport>));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(tokio::spawn(async move {
            orchestrator
                .payout(card_request("k-race", internal_funding()))
                .await
                .unwrap()
        }));
    }
    let mut receipts = Vec::new();
    for handle in handles {
        receipts.push(handle.await.unwrap());
    }
    let first = &receipts[0];
    assert!(receipts.iter().all(|receipt| receipt == first));
}

#[tokio::test]
async fn test_unconfirmed_ledger_fails_without_network_or_compensation() {
    let network = FakeNetwork::new();
    let emitter = CollectingEmitter::default();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>)
        .with_emitter(Arc::new(emitter.clone()));

    let err = orchestrator
        .payout(card_request(
            "k2",
            Funding::Internal {
                debit_confirmed: false,
                confirmation_ref: String::new(),
            },
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "ledger_not_confirmed");
    assert_eq!(network.total_calls(), 0);
    assert!(emitter.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cross_border_without_fx_lock_requires_a_quote() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let mut request = card_request("k3", internal_funding());
    request.amount = Amount::new("GBP", 2500);
    request.preflight.corridor = Some(CorridorParams {
        source_country: "GB".to_string(),
        target_country: "PH".to_string(),
        source_currency: Some("GBP".to_string()),
        target_currency: Some("PHP".to_string()),
    });

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "quote_required");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_expired_quote_is_rejected_before_dispatch() {
    let network = FakeNetwork::new();
    network.set_quote_expiry("2020-01-01T00:00:00Z");
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let mut request = card_request("k4", internal_funding());
    request.amount = Amount::new("GBP", 2500);
    request.preflight.fx_lock = Some(FxLockParams {
        src_currency: "GBP".to_string(),
        dst_currency: "PHP".to_string(),
        amount_minor: 2500,
    });

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "quote_expired");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_fx_quote_id_travels_in_the_dispatched_body() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let mut request = card_request("k5", internal_funding());
    request.amount = Amount::new("GBP", 2500);
    request.preflight.fx_lock = Some(FxLockParams {
        src_currency: "GBP".to_string(),
        dst_currency: "PHP".to_string(),
        amount_minor: 2500,
    });

    orchestrator.payout(request).await.unwrap();
    let dispatches = network.dispatch_calls();
    assert_eq!(dispatches[0].1["fxQuoteId"], "Q-1");
}

#[tokio::test]
async fn test_shared_receipt_store_blocks_reuse_across_orchestrators() {
    let network = FakeNetwork::new();
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let receipts = Arc::new(InMemoryReceiptStore::new());

    let orchestrator_a = Orchestrator::new(network.clone() as Arc<dyn Transport>)
        .with_idempotency_store(idempotency.clone())
        .with_receipt_store(receipts.clone());
    let orchestrator_b = Orchestrator::new(network.clone() as Arc<dyn Transport>)
        .with_idempotency_store(idempotency)
        .with_receipt_store(receipts);

    let aft = Funding::Aft {
        receipt_id: "r-1".to_string(),
        status: "approved".to_string(),
    };

    orchestrator_a
        .payout(card_request("k2", aft.clone()))
        .await
        .unwrap();
    let err = orchestrator_b
        .payout(card_request("k3", aft))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "receipt_reused");
    assert_eq!(network.dispatch_calls().len(), 1);
}

#[tokio::test]
async fn test_declined_aft_receipt_is_burned_on_presentation() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let declined = Funding::Aft {
        receipt_id: "r-2".to_string(),
        status: "declined".to_string(),
    };
    let err = orchestrator
        .payout(card_request("k6", declined))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "aft_declined");

    // the declined presentation consumed the receipt; a retry with a
    // corrected status must not succeed
    let retried = Funding::Aft {
        receipt_id: "r-2".to_string(),
        status: "approved".to_string(),
    };
    let err = orchestrator
        .payout(card_request("k7", retried))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "receipt_reused");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_pis_funding_requires_executed_status() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let err = orchestrator
        .payout(card_request(
            "k8",
            Funding::Pis {
                payment_id: "p-1".to_string(),
                status: "pending".to_string(),
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "pis_failed");
}

#[tokio::test]
async fn test_alias_destination_is_rewritten_to_card_before_dispatch() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let mut request = card_request("k9", internal_funding());
    request.destination = Destination::Alias {
        alias: "user@example.com".to_string(),
        alias_type: "EMAIL".to_string(),
    };

    orchestrator.payout(request).await.unwrap();

    let dispatches = network.dispatch_calls();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].0, "/visadirect/fundstransfer/v1/pushfunds");
    assert_eq!(dispatches[0].1["destination"]["type"], "CARD");
    assert_eq!(
        dispatches[0].1["destination"]["panToken"],
        "tok_pan_774411******9001"
    );

    let paths: Vec<String> = network
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(path, _, _)| path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/visaaliasdirectory/v1/resolve",
            "/pav/v1/card/validation",
            "/paai/v1/fundstransfer/attributes/inquiry",
            "/visadirect/fundstransfer/v1/pushfunds",
        ]
    );
}

#[tokio::test]
async fn test_ineligible_credential_blocks_the_payout() {
    let network = FakeNetwork::new();
    network.set_oct_eligible(false);
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>);

    let mut request = card_request("k10", internal_funding());
    request.destination = Destination::Alias {
        alias: "user@example.com".to_string(),
        alias_type: "EMAIL".to_string(),
    };

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "destination_not_allowed");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_compliance_denial_stops_the_pipeline() {
    let network = FakeNetwork::new();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>)
        .with_compliance(Arc::new(DenyAll));

    let mut request = card_request("k11", internal_funding());
    request.preflight.compliance_payload = Some(json!({"name": "A. Customer"}));

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "compliance_denied");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_corridor_rails_gate_rejects_disallowed_destination() {
    let network = FakeNetwork::new();
    let policy = CorridorPolicy::from_json(
        r#"{
            "version": "1.0.0",
            "corridors": [{
                "sourceCountry": "US",
                "targetCountry": "US",
                "rules": { "rails": { "allowedDestinations": ["card"] } }
            }]
        }"#,
    )
    .unwrap();
    let orchestrator =
        Orchestrator::new(network.clone() as Arc<dyn Transport>).with_policy(Arc::new(policy));

    let mut request = card_request("k12", internal_funding());
    request.destination = Destination::Wallet {
        wallet_id: "w-1".to_string(),
    };
    request.preflight.corridor = Some(CorridorParams {
        source_country: "US".to_string(),
        target_country: "US".to_string(),
        source_currency: None,
        target_currency: Some("USD".to_string()),
    });

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "destination_not_allowed");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_corridor_lock_requirement_rejects_unquoted_dispatch() {
    let network = FakeNetwork::new();
    let policy = CorridorPolicy::from_json(
        r#"{
            "version": "1.0.0",
            "corridors": [{
                "sourceCountry": "US",
                "targetCountry": "US",
                "rules": { "fx": { "lockRequired": true } }
            }]
        }"#,
    )
    .unwrap();
    let orchestrator =
        Orchestrator::new(network.clone() as Arc<dyn Transport>).with_policy(Arc::new(policy));

    let mut request = card_request("k13", internal_funding());
    request.preflight.corridor = Some(CorridorParams {
        source_country: "US".to_string(),
        target_country: "US".to_string(),
        source_currency: None,
        target_currency: Some("USD".to_string()),
    });

    let err = orchestrator.payout(request).await.unwrap_err();
    assert_eq!(err.kind(), "quote_required");
    assert_eq!(network.dispatch_calls().len(), 0);
}

#[tokio::test]
async fn test_dispatch_failure_emits_compensation_and_leaves_no_cached_result() {
    let network = FakeNetwork::new();
    network.set_fail_dispatch(true);
    let emitter = CollectingEmitter::default();
    let orchestrator = Orchestrator::new(network.clone() as Arc<dyn Transport>)
        .with_emitter(Arc::new(emitter.clone()));

    let err = orchestrator
        .payout(card_request("k14", internal_funding()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "store_error");

    let events = emitter.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "payout_failed_requires_compensation");
    assert_eq!(events[0].saga_id, "k14");
    assert!(events[0].timestamp.ends_with('Z'));
    assert!(events[0].funding.is_some());
    drop(events);

    // no result was stored, so a retry re-runs the full pipeline
    network.set_fail_dispatch(false);
    let receipt = orchestrator
        .payout(card_request("k14", internal_funding()))
        .await
        .unwrap();
    assert_eq!(receipt.status(), Some("executed"));
    assert_eq!(network.dispatch_calls().len(), 2);
}
