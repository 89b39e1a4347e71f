//! Fluent payout assembly.
//!
//! Setters are order-independent; the only observable ordering
//! requirement is that `execute` comes last. `execute` runs a local
//! corridor policy check so misconfigured payouts fail before any
//! network call.

use crate::orchestrator::Orchestrator;
use crate::types::{
    AccountRef, Amount, BankAccount, CorridorParams, Destination, DestinationCategory, Funding,
    FxLockParams, PayoutRequest, Preflight, Receipt,
};
use crate::{Result, VisaDirectError};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Accumulates a payout request and submits it to the orchestrator
pub struct PayoutBuilder {
    orchestrator: Arc<Orchestrator>,
    originator_id: Option<String>,
    funding: Option<Funding>,
    destination: Option<Destination>,
    amount: Option<Amount>,
    idempotency_key: Option<String>,
    compliance_payload: Option<Value>,
    fx_lock: Option<FxLockParams>,
    corridor: Option<CorridorParams>,
}

impl PayoutBuilder {
    /// Create a builder bound to an orchestrator
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            originator_id: None,
            funding: None,
            destination: None,
            amount: None,
            idempotency_key: None,
            compliance_payload: None,
            fx_lock: None,
            corridor: None,
        }
    }

    /// Set the originating institution
    pub fn for_originator(mut self, originator_id: impl Into<String>) -> Self {
        self.originator_id = Some(originator_id.into());
        self
    }

    /// Fund from the originator's internal ledger
    pub fn with_funding_internal(
        mut self,
        debit_confirmed: bool,
        confirmation_ref: impl Into<String>,
    ) -> Self {
        self.funding = Some(Funding::Internal {
            debit_confirmed,
            confirmation_ref: confirmation_ref.into(),
        });
        self
    }

    /// Fund from a card pull (AFT receipt)
    pub fn with_funding_from_card(
        mut self,
        receipt_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        self.funding = Some(Funding::Aft {
            receipt_id: receipt_id.into(),
            status: status.into(),
        });
        self
    }

    /// Fund from an external payment initiation (PIS)
    pub fn with_funding_from_external(
        mut self,
        payment_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        self.funding = Some(Funding::Pis {
            payment_id: payment_id.into(),
            status: status.into(),
        });
        self
    }

    /// Pay out to a tokenized card
    pub fn to_card_direct(mut self, pan_token: impl Into<String>) -> Self {
        self.destination = Some(Destination::Card {
            pan_token: pan_token.into(),
        });
        self
    }

    /// Pay out to a card behind an alias; resolution happens in preflight
    pub fn to_card_via_alias(
        mut self,
        alias: impl Into<String>,
        alias_type: impl Into<String>,
    ) -> Self {
        self.destination = Some(Destination::Alias {
            alias: alias.into(),
            alias_type: alias_type.into(),
        });
        self
    }

    /// Pay out to a registered account
    pub fn to_account(mut self, account_id: impl Into<String>) -> Self {
        self.destination = Some(Destination::Account {
            account: AccountRef::Id {
                account_id: account_id.into(),
            },
        });
        self
    }

    /// Pay out to an account given inline bank details
    pub fn to_account_direct(mut self, details: BankAccount) -> Self {
        self.destination = Some(Destination::Account {
            account: AccountRef::Details(details),
        });
        self
    }

    /// Pay out to a wallet
    pub fn to_wallet(mut self, wallet_id: impl Into<String>) -> Self {
        self.destination = Some(Destination::Wallet {
            wallet_id: wallet_id.into(),
        });
        self
    }

    /// Set the payout amount
    pub fn for_amount(mut self, currency: impl Into<String>, minor: u64) -> Self {
        self.amount = Some(Amount::new(currency, minor));
        self
    }

    /// Set the idempotency key; synthesized when absent
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Attach a compliance screening payload
    pub fn with_compliance_payload(mut self, payload: Value) -> Self {
        self.compliance_payload = Some(payload);
        self
    }

    /// Request an FX quote lock for the currency pair; the locked amount
    /// follows the payout amount at execute time
    pub fn with_quote_lock(
        mut self,
        src_currency: impl Into<String>,
        dst_currency: impl Into<String>,
    ) -> Self {
        self.fx_lock = Some(FxLockParams {
            src_currency: src_currency.into(),
            dst_currency: dst_currency.into(),
            amount_minor: 0,
        });
        self
    }

    /// Enforce corridor policy for the country pair; missing currencies
    /// are filled from the quote lock and the payout amount at execute time
    pub fn with_corridor(
        mut self,
        source_country: impl Into<String>,
        target_country: impl Into<String>,
    ) -> Self {
        self.corridor = Some(CorridorParams {
            source_country: source_country.into(),
            target_country: target_country.into(),
            source_currency: None,
            target_currency: None,
        });
        self
    }

    /// Validate, fail fast on policy, and submit to the orchestrator
    pub async fn execute(self) -> Result<Receipt> {
        let Self {
            orchestrator,
            originator_id,
            funding,
            destination,
            amount,
            idempotency_key,
            compliance_payload,
            mut fx_lock,
            mut corridor,
        } = self;

        let originator_id = originator_id
            .ok_or_else(|| VisaDirectError::invalid_request("originator is required"))?;
        let funding =
            funding.ok_or_else(|| VisaDirectError::invalid_request("funding is required"))?;
        let destination = destination
            .ok_or_else(|| VisaDirectError::invalid_request("destination is required"))?;
        let amount = amount.ok_or_else(|| VisaDirectError::invalid_request("amount is required"))?;

        if let Some(params) = fx_lock.as_mut() {
            params.amount_minor = amount.minor;
        }

        if let Some(params) = corridor.as_mut() {
            if params.source_currency.is_none() {
                params.source_currency = fx_lock.as_ref().map(|lock| lock.src_currency.clone());
            }
            if params.target_currency.is_none() {
                params.target_currency = Some(amount.currency.clone());
            }
        }

        // mirror the preflight order: the FX requirement is checked before
        // the corridor gate, so both entry points surface the same error
        if amount.currency != "USD" && fx_lock.is_none() {
            return Err(VisaDirectError::quote_required(
                "quote required for cross-border payout",
            ));
        }
        if let Some(params) = &corridor {
            check_corridor(&orchestrator, params, &destination, fx_lock.is_some())?;
        }

        let idempotency_key =
            idempotency_key.unwrap_or_else(|| format!("sdk-{}", Uuid::new_v4()));

        let request = PayoutRequest {
            originator_id,
            idempotency_key,
            funding,
            destination,
            amount,
            preflight: Preflight {
                compliance_payload,
                fx_lock,
                corridor,
            },
        };
        orchestrator.payout(request).await
    }
}

/// Local mirror of the orchestrator's corridor gate; catches policy
/// violations before any network call
fn check_corridor(
    orchestrator: &Orchestrator,
    corridor: &CorridorParams,
    destination: &Destination,
    has_quote_lock: bool,
) -> Result<()> {
    let rules = orchestrator.corridor_rules(corridor)?;
    if let Some(rails) = &rules.rails {
        if !rails.allowed_destinations.is_empty() {
            // aliases resolve to card credentials in preflight
            let category = destination.category().unwrap_or(DestinationCategory::Card);
            if !rails.allowed_destinations.contains(&category) {
                return Err(VisaDirectError::destination_not_allowed(format!(
                    "destination {category} not permitted for corridor {}->{}",
                    corridor.source_country, corridor.target_country
                )));
            }
        }
    }
    let lock_required = rules.fx.as_ref().map(|fx| fx.lock_required).unwrap_or(false);
    if lock_required && !has_quote_lock {
        return Err(VisaDirectError::quote_required(
            "FX quote required by corridor policy",
        ));
    }
    Ok(())
}
