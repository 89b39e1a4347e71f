//! Preflight collaborators: recipient lookups, FX quoting, compliance

pub mod compliance;
pub mod quoting;
pub mod recipient;

pub use compliance::{ComplianceScreen, ComplianceService, ScreeningResult};
pub use quoting::{FxQuote, QuotingService};
pub use recipient::RecipientService;
