//! Corridor policy: a declarative document gating FX, rails, limits and
//! SLA per (source-country, target-country, currency-pair)

use crate::types::DestinationCategory;
use crate::{Result, VisaDirectError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Embedded fallback policy document
const DEFAULT_POLICY: &str = include_str!("../config/corridor-policy.default.json");

/// Relative path searched from the working directory upward
const POLICY_RELATIVE_PATH: &str = "policy/corridor-policy.json";

/// FX rules for a corridor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FxRules {
    /// When true, dispatch without a locked quote is forbidden
    pub lock_required: bool,
}

/// Rail rules for a corridor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RailRules {
    /// Permitted destination categories; empty means unrestricted
    pub allowed_destinations: Vec<DestinationCategory>,
}

/// Rules attached to a corridor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorridorRules {
    pub fx: Option<FxRules>,
    pub compliance: Option<Value>,
    pub rails: Option<RailRules>,
    pub limits: Option<Value>,
    pub sla: Option<Value>,
}

/// Currency pins restricting a corridor to a currency pair.
/// An absent pin is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyPins {
    pub source: Option<String>,
    pub target: Option<String>,
}

/// One corridor declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Corridor {
    pub source_country: String,
    pub target_country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currencies: Option<CurrencyPins>,
    #[serde(default)]
    pub rules: CorridorRules,
}

/// The corridor policy document.
///
/// Corridors are evaluated in declaration order and the first match wins,
/// so currency-pinned corridors must appear before their wildcard
/// fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorridorPolicy {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub corridors: Vec<Corridor>,
}

impl CorridorPolicy {
    /// Parse a policy document
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| VisaDirectError::config(format!("invalid corridor policy: {e}")))
    }

    /// Load a policy from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VisaDirectError::policy_not_found(format!(
                "corridor policy file not found at {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    /// The embedded default policy
    pub fn embedded() -> Result<Self> {
        Self::from_json(DEFAULT_POLICY)
    }

    /// Resolve the rules for a corridor.
    ///
    /// Countries must match exactly; a currency pin, when present, must
    /// equal the provided currency. The first matching corridor wins.
    pub fn get_rules(
        &self,
        source_country: &str,
        target_country: &str,
        source_currency: Option<&str>,
        target_currency: Option<&str>,
    ) -> Result<&CorridorRules> {
        for corridor in &self.corridors {
            if corridor.source_country != source_country
                || corridor.target_country != target_country
            {
                continue;
            }
            if let Some(pins) = &corridor.currencies {
                if let Some(pin) = &pins.source {
                    if Some(pin.as_str()) != source_currency {
                        continue;
                    }
                }
                if let Some(pin) = &pins.target {
                    if Some(pin.as_str()) != target_currency {
                        continue;
                    }
                }
            }
            return Ok(&corridor.rules);
        }
        Err(VisaDirectError::policy_not_found(format!(
            "no corridor policy for {source_country}->{target_country}"
        )))
    }
}

/// The process-wide policy, loaded once.
///
/// Resolution order: `VISA_CORRIDOR_POLICY_FILE`, then
/// `policy/corridor-policy.json` searched from the working directory
/// upward, then the embedded default. A configured file that fails to
/// load falls through to the embedded document with a warning.
pub fn default_policy() -> &'static CorridorPolicy {
    static POLICY: OnceLock<CorridorPolicy> = OnceLock::new();
    POLICY.get_or_init(|| match discover() {
        Ok(policy) => policy,
        Err(err) => {
            tracing::warn!(error = %err, "corridor policy load failed, using embedded default");
            CorridorPolicy::embedded().unwrap_or_default()
        }
    })
}

fn discover() -> Result<CorridorPolicy> {
    if let Ok(path) = std::env::var("VISA_CORRIDOR_POLICY_FILE") {
        if !path.is_empty() {
            return CorridorPolicy::from_file(Path::new(&path));
        }
    }
    if let Some(found) = search_upward() {
        return CorridorPolicy::from_file(&found);
    }
    CorridorPolicy::embedded()
}

fn search_upward() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(POLICY_RELATIVE_PATH))
        .find(|candidate| candidate.is_file())
}
