//! Core request and receipt types for payout orchestration

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SDK environment posture, latched at construction time.
/// Production fails closed when trust material cannot be obtained; any
/// other mode degrades explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvMode {
    Production,
    #[default]
    Dev,
}

impl EnvMode {
    /// Read the mode from `SDK_ENV`; anything but `production` is dev
    pub fn from_env() -> Self {
        match std::env::var("SDK_ENV") {
            Ok(value) if value == "production" => EnvMode::Production,
            _ => EnvMode::Dev,
        }
    }

    /// True in the fail-closed posture
    pub fn is_production(&self) -> bool {
        matches!(self, EnvMode::Production)
    }
}

/// Monetary amount: ISO-4217 currency code plus integer minor units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// ISO-4217 currency code (e.g. "USD", "GBP")
    pub currency: String,
    /// Amount in minor units (cents, pence, ...)
    pub minor: u64,
}

impl Amount {
    /// Create a new amount
    pub fn new(currency: impl Into<String>, minor: u64) -> Self {
        Self {
            currency: currency.into(),
            minor,
        }
    }
}

/// Funding source for a payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Funding {
    /// Debit already settled on the originator's internal ledger
    #[serde(rename = "INTERNAL", rename_all = "camelCase")]
    Internal {
        debit_confirmed: bool,
        confirmation_ref: String,
    },
    /// Account funding transaction (pull from card); carries a single-use receipt
    #[serde(rename = "AFT", rename_all = "camelCase")]
    Aft { receipt_id: String, status: String },
    /// Payment-initiation funding; carries a single-use payment id
    #[serde(rename = "PIS", rename_all = "camelCase")]
    Pis { payment_id: String, status: String },
}

/// Bank account details for account payouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub account_number: String,
    pub routing_number: String,
    pub account_type: String,
    pub country_code: String,
    pub currency: String,
}

/// Account reference: either a stored account id or inline bank details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    /// Previously registered account
    Id {
        #[serde(rename = "accountId")]
        account_id: String,
    },
    /// Inline account details
    Details(BankAccount),
}

/// Payout destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Destination {
    /// Tokenized card credential
    #[serde(rename = "CARD", rename_all = "camelCase")]
    Card { pan_token: String },
    /// Bank account
    #[serde(rename = "ACCOUNT")]
    Account {
        #[serde(flatten)]
        account: AccountRef,
    },
    /// Wallet
    #[serde(rename = "WALLET", rename_all = "camelCase")]
    Wallet { wallet_id: String },
    /// Alias to be resolved during preflight; never reaches dispatch
    #[serde(rename = "ALIAS", rename_all = "camelCase")]
    Alias { alias: String, alias_type: String },
}

impl Destination {
    /// Rail category of the destination, if it maps to one.
    /// `ALIAS` has no category until preflight rewrites it to `CARD`.
    pub fn category(&self) -> Option<DestinationCategory> {
        match self {
            Destination::Card { .. } => Some(DestinationCategory::Card),
            Destination::Account { .. } => Some(DestinationCategory::Account),
            Destination::Wallet { .. } => Some(DestinationCategory::Wallet),
            Destination::Alias { .. } => None,
        }
    }
}

/// Rail category used by corridor policy gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationCategory {
    Card,
    Account,
    Wallet,
}

impl DestinationCategory {
    /// Lowercase identifier as used in policy documents
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationCategory::Card => "card",
            DestinationCategory::Account => "account",
            DestinationCategory::Wallet => "wallet",
        }
    }
}

impl std::fmt::Display for DestinationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FX quote lock parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxLockParams {
    pub src_currency: String,
    pub dst_currency: String,
    pub amount_minor: u64,
}

/// Corridor identification for policy resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorridorParams {
    pub source_country: String,
    pub target_country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_currency: Option<String>,
}

/// Optional preflight steps to run before dispatch.
///
/// Alias resolution needs no entry here: it runs exactly when the
/// request's destination is [`Destination::Alias`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preflight {
    /// Payload forwarded to compliance screening
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_payload: Option<Value>,
    /// Lock an FX quote and carry its id in the dispatched body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx_lock: Option<FxLockParams>,
    /// Enforce corridor policy rules before dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corridor: Option<CorridorParams>,
}

impl Preflight {
    /// True when no preflight step is configured
    pub fn is_empty(&self) -> bool {
        self.compliance_payload.is_none() && self.fx_lock.is_none() && self.corridor.is_none()
    }
}

/// A payout request; immutable once handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub originator_id: String,
    pub idempotency_key: String,
    pub funding: Funding,
    pub destination: Destination,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Preflight::is_empty")]
    pub preflight: Preflight,
}

/// Payout receipt returned by the network.
///
/// The SDK treats the body as opaque and only observes `payoutId` and
/// `status`; callers get the whole object back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(pub Value);

impl Receipt {
    /// Network-assigned payout identifier, when present
    pub fn payout_id(&self) -> Option<&str> {
        self.0.get("payoutId").and_then(Value::as_str)
    }

    /// Payout status, when present
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    /// The raw receipt body
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the receipt, returning the raw body
    pub fn into_value(self) -> Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_funding_wire_format() {
        let funding = Funding::Internal {
            debit_confirmed: true,
            confirmation_ref: "conf-123".to_string(),
        };
        let value = serde_json::to_value(&funding).unwrap();
        assert_eq!(
            value,
            json!({"type": "INTERNAL", "debitConfirmed": true, "confirmationRef": "conf-123"})
        );

        let aft: Funding =
            serde_json::from_value(json!({"type": "AFT", "receiptId": "r-1", "status": "approved"}))
                .unwrap();
        assert_eq!(
            aft,
            Funding::Aft {
                receipt_id: "r-1".to_string(),
                status: "approved".to_string()
            }
        );
    }

    #[test]
    fn test_destination_wire_format() {
        let card = Destination::Card {
            pan_token: "tok_pan_411111******1111".to_string(),
        };
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(
            value,
            json!({"type": "CARD", "panToken": "tok_pan_411111******1111"})
        );

        let alias: Destination = serde_json::from_value(
            json!({"type": "ALIAS", "alias": "user@example.com", "aliasType": "EMAIL"}),
        )
        .unwrap();
        assert_eq!(alias.category(), None);
    }

    #[test]
    fn test_account_ref_accepts_id_and_details() {
        let by_id: Destination =
            serde_json::from_value(json!({"type": "ACCOUNT", "accountId": "acct-9"})).unwrap();
        assert_eq!(by_id.category(), Some(DestinationCategory::Account));

        let inline: Destination = serde_json::from_value(json!({
            "type": "ACCOUNT",
            "accountNumber": "1234567890",
            "routingNumber": "021000021",
            "accountType": "CHECKING",
            "countryCode": "PH",
            "currency": "PHP"
        }))
        .unwrap();
        let round = serde_json::to_value(&inline).unwrap();
        assert_eq!(round["accountNumber"], "1234567890");
        assert_eq!(round["type"], "ACCOUNT");
    }

    #[test]
    fn test_unknown_funding_variant_is_rejected() {
        let result: std::result::Result<Funding, _> =
            serde_json::from_value(json!({"type": "CASH", "note": "?"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_preflight_is_empty() {
        assert!(Preflight::default().is_empty());
        let preflight = Preflight {
            fx_lock: Some(FxLockParams {
                src_currency: "GBP".to_string(),
                dst_currency: "PHP".to_string(),
                amount_minor: 2500,
            }),
            ..Preflight::default()
        };
        assert!(!preflight.is_empty());
    }

    #[test]
    fn test_receipt_accessors() {
        let receipt = Receipt(json!({"payoutId": "p-1", "status": "executed", "extra": 1}));
        assert_eq!(receipt.payout_id(), Some("p-1"));
        assert_eq!(receipt.status(), Some("executed"));
        assert_eq!(receipt.as_value()["extra"], 1);
    }
}
