//! Error types for the Visa Direct SDK

use thiserror::Error;

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, VisaDirectError>;

/// Main error type for SDK operations
#[derive(Error, Debug)]
pub enum VisaDirectError {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal ledger debit was not confirmed before payout
    #[error("Ledger not confirmed: {message}")]
    LedgerNotConfirmed { message: String },

    /// AFT funding receipt was not approved
    #[error("AFT declined: {message}")]
    AftDeclined { message: String },

    /// PIS payment was not executed
    #[error("PIS failed: {message}")]
    PisFailed { message: String },

    /// Funding receipt was already consumed
    #[error("Receipt reused: {message}")]
    ReceiptReused { message: String },

    /// FX quote is required before dispatch
    #[error("Quote required: {message}")]
    QuoteRequired { message: String },

    /// FX quote expired before dispatch
    #[error("Quote expired: {message}")]
    QuoteExpired { message: String },

    /// Destination category is not permitted by corridor policy
    #[error("Destination not allowed: {message}")]
    DestinationNotAllowed { message: String },

    /// No corridor policy matches the requested corridor
    #[error("Policy not found: {message}")]
    PolicyNotFound { message: String },

    /// Envelope response referenced a key id absent from the key set
    #[error("Unknown envelope key id: {kid}")]
    KeyIdUnknown { kid: String },

    /// Envelope could not be decrypted
    #[error("Envelope decrypt failure: {message}")]
    EnvelopeDecrypt { message: String },

    /// Envelope encryption was required but no key set is available
    #[error("Key set unavailable: {message}")]
    KeySetUnavailable { message: String },

    /// Request is structurally invalid or incomplete
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Compliance screening denied the payout
    #[error("Compliance denied: {message}")]
    ComplianceDenied { message: String },

    /// Remote store backend failure
    #[error("Store error: {message}")]
    Store { message: String },

    /// Cryptographic operation failure outside envelope decryption
    #[error("Cryptographic error: {message}")]
    Crypto { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl VisaDirectError {
    /// Create a ledger-not-confirmed error
    pub fn ledger_not_confirmed(message: impl Into<String>) -> Self {
        Self::LedgerNotConfirmed {
            message: message.into(),
        }
    }

    /// Create an AFT-declined error
    pub fn aft_declined(message: impl Into<String>) -> Self {
        Self::AftDeclined {
            message: message.into(),
        }
    }

    /// Create a PIS-failed error
    pub fn pis_failed(message: impl Into<String>) -> Self {
        Self::PisFailed {
            message: message.into(),
        }
    }

    /// Create a receipt-reused error
    pub fn receipt_reused(message: impl Into<String>) -> Self {
        Self::ReceiptReused {
            message: message.into(),
        }
    }

    /// Create a quote-required error
    pub fn quote_required(message: impl Into<String>) -> Self {
        Self::QuoteRequired {
            message: message.into(),
        }
    }

    /// Create a quote-expired error
    pub fn quote_expired(message: impl Into<String>) -> Self {
        Self::QuoteExpired {
            message: message.into(),
        }
    }

    /// Create a destination-not-allowed error
    pub fn destination_not_allowed(message: impl Into<String>) -> Self {
        Self::DestinationNotAllowed {
            message: message.into(),
        }
    }

    /// Create a policy-not-found error
    pub fn policy_not_found(message: impl Into<String>) -> Self {
        Self::PolicyNotFound {
            message: message.into(),
        }
    }

    /// Create an unknown-key-id error
    pub fn key_id_unknown(kid: impl Into<String>) -> Self {
        Self::KeyIdUnknown { kid: kid.into() }
    }

    /// Create an envelope-decrypt error
    pub fn envelope_decrypt(message: impl Into<String>) -> Self {
        Self::EnvelopeDecrypt {
            message: message.into(),
        }
    }

    /// Create a key-set-unavailable error
    pub fn key_set_unavailable(message: impl Into<String>) -> Self {
        Self::KeySetUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid-request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a compliance-denied error
    pub fn compliance_denied(message: impl Into<String>) -> Self {
        Self::ComplianceDenied {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a cryptographic error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Stable error kind string; part of the public contract, unlike messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json_error",
            Self::Http(_) => "http_error",
            Self::Io(_) => "io_error",
            Self::LedgerNotConfirmed { .. } => "ledger_not_confirmed",
            Self::AftDeclined { .. } => "aft_declined",
            Self::PisFailed { .. } => "pis_failed",
            Self::ReceiptReused { .. } => "receipt_reused",
            Self::QuoteRequired { .. } => "quote_required",
            Self::QuoteExpired { .. } => "quote_expired",
            Self::DestinationNotAllowed { .. } => "destination_not_allowed",
            Self::PolicyNotFound { .. } => "policy_not_found",
            Self::KeyIdUnknown { .. } => "key_id_unknown",
            Self::EnvelopeDecrypt { .. } => "envelope_decrypt_failure",
            Self::KeySetUnavailable { .. } => "key_set_unavailable",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ComplianceDenied { .. } => "compliance_denied",
            Self::Store { .. } => "store_error",
            Self::Crypto { .. } => "crypto_error",
            Self::Config { .. } => "configuration_error",
        }
    }

    /// Whether retrying the same request could change the outcome.
    /// Guard and policy errors are terminal; transport and key-rotation
    /// errors are not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Http(_) | Self::KeyIdUnknown { .. })
    }
}
