//! Compliance screening

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of a screening call
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningResult {
    /// Binary approve/deny decision
    pub approved: bool,
    /// The screened payload, echoed back for audit trails
    pub payload: Value,
}

/// Screening seam; the orchestrator only consults `approved`
#[async_trait]
pub trait ComplianceScreen: Send + Sync {
    /// Screen a payout payload
    async fn screen(&self, payload: &Value) -> Result<ScreeningResult>;
}

/// Default screening service.
///
/// The screening backend integration is pending; every payload is
/// approved and echoed back. Swap in a real implementation of
/// [`ComplianceScreen`] to enforce decisions.
#[derive(Debug, Default, Clone)]
pub struct ComplianceService;

impl ComplianceService {
    /// Create the default service
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComplianceScreen for ComplianceService {
    async fn screen(&self, payload: &Value) -> Result<ScreeningResult> {
        Ok(ScreeningResult {
            approved: true,
            payload: payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_service_approves_and_echoes() {
        let service = ComplianceService::new();
        let result = service.screen(&json!({"name": "A. Customer"})).await.unwrap();
        assert!(result.approved);
        assert_eq!(result.payload["name"], "A. Customer");
    }
}
