//! Endpoint registry: logical paths, their encryption requirements, and
//! the JWKS source used for message-level encryption

use crate::{Result, VisaDirectError};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

/// Embedded fallback registry, used when no registry file is configured
const DEFAULT_REGISTRY: &str = include_str!("../config/endpoints.default.json");

/// Base URLs for outbound calls
#[derive(Debug, Clone, Deserialize)]
pub struct BaseUrls {
    /// Network API base URL
    pub visa: String,
}

/// JWKS fetch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwksConfig {
    /// JWKS document URL; empty means no key source is configured
    #[serde(default)]
    pub url: String,
    /// Key-set cache TTL in seconds
    #[serde(default = "JwksConfig::default_ttl")]
    pub cache_ttl_seconds: u64,
}

impl JwksConfig {
    fn default_ttl() -> u64 {
        300
    }

    /// The JWKS URL, if one is configured
    pub fn url(&self) -> Option<&str> {
        if self.url.is_empty() {
            None
        } else {
            Some(&self.url)
        }
    }
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            cache_ttl_seconds: Self::default_ttl(),
        }
    }
}

/// A registered route and its envelope requirement
#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    /// Logical path; segments starting with `:` are wildcards
    pub path: String,
    /// Whether request/response bodies must travel in an encrypted envelope
    #[serde(rename = "requiresMLE", default)]
    pub requires_mle: bool,
}

/// Static mapping of logical paths to transport behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRegistry {
    pub base_urls: BaseUrls,
    #[serde(default)]
    pub jwks: JwksConfig,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl EndpointRegistry {
    /// Load the registry: an explicit file wins, then `VISA_ENDPOINTS_FILE`,
    /// then the embedded default document.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        if let Some(path) = file {
            return Self::from_file(path);
        }
        if let Ok(env_path) = std::env::var("VISA_ENDPOINTS_FILE") {
            if !env_path.is_empty() {
                return Self::from_file(Path::new(&env_path));
            }
        }
        Self::embedded()
    }

    /// Load the registry from a JSON file, applying environment substitution
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VisaDirectError::config(format!("cannot read endpoint registry {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// The embedded default registry
    pub fn embedded() -> Result<Self> {
        Self::from_json(DEFAULT_REGISTRY)
    }

    /// Parse a registry document, substituting `${VAR:-default}` references
    pub fn from_json(raw: &str) -> Result<Self> {
        let substituted = substitute_env(raw);
        serde_json::from_str(&substituted)
            .map_err(|e| VisaDirectError::config(format!("invalid endpoint registry: {e}")))
    }

    /// Whether the given path must use an encrypted envelope.
    /// Exact matches win; otherwise `:param` templates are tried.
    pub fn requires_mle(&self, path: &str) -> bool {
        for route in &self.routes {
            if route.path == path
                || (route.path.contains(':') && template_matches(&route.path, path))
            {
                return route.requires_mle;
            }
        }
        false
    }
}

/// Substitute `${VAR:-default}` references from the process environment
fn substitute_env(raw: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::-([^}]*))?\}").unwrap());
    pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
}

/// Segment-wise template match; `:name` segments match anything, literal
/// segments must be equal, and segment counts must agree
fn template_matches(template: &str, actual: &str) -> bool {
    let template_segments: Vec<&str> = template.split('/').collect();
    let actual_segments: Vec<&str> = actual.split('/').collect();
    if template_segments.len() != actual_segments.len() {
        return false;
    }
    template_segments
        .iter()
        .zip(&actual_segments)
        .all(|(t, a)| t.starts_with(':') || t == a)
}
