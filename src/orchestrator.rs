//! Request-level payout orchestration: idempotency, funding guards, the
//! preflight pipeline, dispatch, and compensation emission

use crate::events::{CompensationEmitter, CompensationEvent, LogEmitter};
use crate::policy::{self, CorridorPolicy, CorridorRules};
use crate::services::{ComplianceScreen, ComplianceService, QuotingService, RecipientService};
use crate::storage::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryReceiptStore, ReceiptStore,
};
use crate::transport::Transport;
use crate::types::{
    CorridorParams, Destination, DestinationCategory, Funding, PayoutRequest, Receipt,
};
use crate::{Result, VisaDirectError};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Stored results are terminal for one hour
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(3600);

/// The originator's home currency; payouts in any other currency are
/// cross-border and need a locked quote
const HOME_CURRENCY: &str = "USD";

/// Executes payouts with at-most-once semantics per idempotency key.
///
/// Safe for concurrent calls sharing one instance; the only mutable state
/// lives behind the stores and the memoized corridor policy.
pub struct Orchestrator {
    http: Arc<dyn Transport>,
    idempotency: Arc<dyn IdempotencyStore>,
    receipts: Arc<dyn ReceiptStore>,
    events: Arc<dyn CompensationEmitter>,
    recipient: RecipientService,
    quoting: QuotingService,
    compliance: Arc<dyn ComplianceScreen>,
    policy: Option<Arc<CorridorPolicy>>,
}

impl Orchestrator {
    /// Create an orchestrator with in-memory stores and default services
    pub fn new(http: Arc<dyn Transport>) -> Self {
        Self {
            recipient: RecipientService::new(Arc::clone(&http)),
            quoting: QuotingService::new(Arc::clone(&http)),
            http,
            idempotency: Arc::new(InMemoryIdempotencyStore::new()),
            receipts: Arc::new(InMemoryReceiptStore::new()),
            events: Arc::new(LogEmitter::new()),
            compliance: Arc::new(ComplianceService::new()),
            policy: None,
        }
    }

    /// Use a shared idempotency store
    pub fn with_idempotency_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency = store;
        self
    }

    /// Use a shared receipt store
    pub fn with_receipt_store(mut self, store: Arc<dyn ReceiptStore>) -> Self {
        self.receipts = store;
        self
    }

    /// Use a custom compensation emitter
    pub fn with_emitter(mut self, emitter: Arc<dyn CompensationEmitter>) -> Self {
        self.events = emitter;
        self
    }

    /// Use a custom recipient service
    pub fn with_recipient_service(mut self, service: RecipientService) -> Self {
        self.recipient = service;
        self
    }

    /// Use a custom quoting service
    pub fn with_quoting_service(mut self, service: QuotingService) -> Self {
        self.quoting = service;
        self
    }

    /// Use a custom compliance screen
    pub fn with_compliance(mut self, compliance: Arc<dyn ComplianceScreen>) -> Self {
        self.compliance = compliance;
        self
    }

    /// Use an explicit corridor policy instead of the process default
    pub fn with_policy(mut self, policy: Arc<CorridorPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Execute a payout.
    ///
    /// Order of operations: idempotency lookup, funding guard, preflight
    /// (alias, compliance, FX, corridor), dispatch, idempotent store.
    /// Failures of the dispatch step emit a compensation event before the
    /// error propagates; guard and policy failures never do.
    #[tracing::instrument(
        name = "orchestrator.payout",
        skip_all,
        fields(
            idempotency_key = %req.idempotency_key,
            currency = %req.amount.currency,
            fx_lock_hint = req.preflight.fx_lock.is_some(),
        )
    )]
    pub async fn payout(&self, req: PayoutRequest) -> Result<Receipt> {
        if let Some(cached) = self.idempotency.get(&req.idempotency_key).await? {
            tracing::debug!("idempotency hit");
            return Ok(Receipt(cached));
        }

        self.enforce_funding_guards(&req).await?;
        let (destination, fx_quote_id) = self.run_preflight(&req).await?;

        let path = match destination.category() {
            Some(DestinationCategory::Card) => "/visadirect/fundstransfer/v1/pushfunds",
            Some(DestinationCategory::Account) => "/accountpayouts/v1/payout",
            Some(DestinationCategory::Wallet) => "/walletpayouts/v1/payout",
            None => {
                return Err(VisaDirectError::invalid_request(
                    "destination is unresolved at dispatch",
                ))
            }
        };

        let mut body = json!({
            "originatorId": &req.originator_id,
            "funding": &req.funding,
            "destination": &destination,
            "amount": &req.amount,
        });
        if let Some(quote_id) = &fx_quote_id {
            body["fxQuoteId"] = Value::String(quote_id.clone());
        }
        let headers = [(
            "x-idempotency-key".to_string(),
            req.idempotency_key.clone(),
        )];

        match self.dispatch(path, body, &headers, &req.idempotency_key).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                tracing::debug!(reason = err.kind(), "compensation emitted");
                self.events.emit(CompensationEvent::payout_failed(
                    req.idempotency_key.clone(),
                    req.funding.clone(),
                    err.kind(),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Resolve corridor rules against the configured or process policy
    pub fn corridor_rules(&self, corridor: &CorridorParams) -> Result<&CorridorRules> {
        let policy = match &self.policy {
            Some(policy) => policy.as_ref(),
            None => policy::default_policy(),
        };
        policy.get_rules(
            &corridor.source_country,
            &corridor.target_country,
            corridor.source_currency.as_deref(),
            corridor.target_currency.as_deref(),
        )
    }

    async fn dispatch(
        &self,
        path: &str,
        body: Value,
        headers: &[(String, String)],
        idempotency_key: &str,
    ) -> Result<Receipt> {
        let response = self.http.post(path, body, headers).await?;
        self.idempotency
            .put(idempotency_key, &response.body, IDEMPOTENCY_TTL)
            .await?;
        // the stored result is authoritative: a racing call that lost the
        // first-write still returns the winner's receipt
        let stored = self.idempotency.get(idempotency_key).await?;
        Ok(Receipt(stored.unwrap_or(response.body)))
    }

    async fn enforce_funding_guards(&self, req: &PayoutRequest) -> Result<()> {
        match &req.funding {
            Funding::Internal {
                debit_confirmed,
                confirmation_ref,
            } => {
                if !debit_confirmed || confirmation_ref.is_empty() {
                    return Err(VisaDirectError::ledger_not_confirmed(
                        "internal ledger debit not confirmed",
                    ));
                }
            }
            // The receipt is burned before the status check so a declined
            // presentation cannot be retried with a different outcome.
            Funding::Aft { receipt_id, status } => {
                if !self.receipts.consume_once("AFT", receipt_id).await? {
                    return Err(VisaDirectError::receipt_reused(format!(
                        "AFT receipt {receipt_id} already used"
                    )));
                }
                if status != "approved" {
                    return Err(VisaDirectError::aft_declined("AFT not approved"));
                }
            }
            Funding::Pis { payment_id, status } => {
                if !self.receipts.consume_once("PIS", payment_id).await? {
                    return Err(VisaDirectError::receipt_reused(format!(
                        "PIS payment {payment_id} already used"
                    )));
                }
                if status != "executed" {
                    return Err(VisaDirectError::pis_failed("PIS not executed"));
                }
            }
        }
        Ok(())
    }

    /// Runs alias resolution, compliance, FX lock and the corridor gate in
    /// that order. Alias runs first so downstream gates see the resolved
    /// credential category; FX runs before corridor so the gate can
    /// observe whether a lock exists.
    async fn run_preflight(&self, req: &PayoutRequest) -> Result<(Destination, Option<String>)> {
        let mut destination = req.destination.clone();

        if let Destination::Alias { alias, alias_type } = &req.destination {
            destination = self.resolve_alias_destination(alias, alias_type).await?;
        }

        if let Some(payload) = &req.preflight.compliance_payload {
            let result = self.compliance.screen(payload).await?;
            if !result.approved {
                return Err(VisaDirectError::compliance_denied(
                    "compliance screening failed",
                ));
            }
        }

        let mut fx_quote_id = None;
        if let Some(params) = &req.preflight.fx_lock {
            let amount_minor = if params.amount_minor > 0 {
                params.amount_minor
            } else {
                req.amount.minor
            };
            let quote = self
                .quoting
                .lock(&params.src_currency, &params.dst_currency, amount_minor)
                .await?;
            if quote.expires_at <= Utc::now() {
                return Err(VisaDirectError::quote_expired(format!(
                    "quote {} expired at {}",
                    quote.quote_id, quote.expires_at
                )));
            }
            fx_quote_id = Some(quote.quote_id);
        } else if req.amount.currency != HOME_CURRENCY {
            return Err(VisaDirectError::quote_required(
                "quote required for cross-border payout",
            ));
        }

        if let Some(corridor) = &req.preflight.corridor {
            let rules = self.corridor_rules(corridor)?;
            if let Some(rails) = &rules.rails {
                if !rails.allowed_destinations.is_empty() {
                    let category = destination.category().ok_or_else(|| {
                        VisaDirectError::invalid_request("destination is unresolved at corridor gate")
                    })?;
                    if !rails.allowed_destinations.contains(&category) {
                        return Err(VisaDirectError::destination_not_allowed(format!(
                            "destination {category} not permitted for corridor {}->{}",
                            corridor.source_country, corridor.target_country
                        )));
                    }
                }
            }
            let lock_required = rules.fx.as_ref().map(|fx| fx.lock_required).unwrap_or(false);
            if lock_required && fx_quote_id.is_none() {
                return Err(VisaDirectError::quote_required(
                    "FX quote required by corridor policy",
                ));
            }
        }

        Ok((destination, fx_quote_id))
    }

    async fn resolve_alias_destination(&self, alias: &str, alias_type: &str) -> Result<Destination> {
        let resolved = self.recipient.resolve_alias(alias, alias_type).await?;
        let pan_token = resolved
            .get("panToken")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VisaDirectError::invalid_request("alias resolution returned no credential")
            })?
            .to_string();
        self.recipient.pav(&pan_token).await?;
        let attributes = self.recipient.ftai(&pan_token).await?;
        if attributes.get("octEligible").and_then(Value::as_bool) == Some(false) {
            return Err(VisaDirectError::destination_not_allowed(
                "resolved credential is not eligible for original credit",
            ));
        }
        Ok(Destination::Card { pan_token })
    }
}
