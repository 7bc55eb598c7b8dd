//! Error types for the Covenant domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Every failure crossing
//! a component boundary is one of these variants, so callers pattern-match
//! on kind without depending on message text.

use crate::agreement::AgreementId;
use thiserror::Error;

/// The top-level error type for all governance operations.
#[derive(Debug, Clone, Error)]
pub enum GovernanceError {
    // --- Creation-time failures (fix inputs and retry as a new call) ---
    #[error("invalid terms: {0}")]
    InvalidTerms(String),

    #[error("agreement is missing compulsory policy '{policy}'")]
    MissingCompulsoryPolicy { policy: String },

    #[error("consensus rejected: {approvals} of {needed} required approvals")]
    ConsensusRejected { approvals: usize, needed: usize },

    // --- Lookup / lifecycle failures ---
    #[error("agreement not found: {0}")]
    NotFound(AgreementId),

    #[error("agreement {id} is not valid: {reason}")]
    AgreementInvalid { id: AgreementId, reason: String },

    // --- Operation-time refusals ---
    #[error("policy '{policy}' violated: {reason}")]
    PolicyViolation { policy: String, reason: String },

    #[error("quota exceeded for metric '{metric}'")]
    QuotaExceeded { metric: String },

    #[error("invalid usage quantity for metric '{metric}'")]
    InvalidQuantity { metric: String },

    // --- Transient (callers may retry later; no backoff here) ---
    #[error("resources unavailable: {reason}")]
    ResourceUnavailable { reason: String },
}

impl GovernanceError {
    /// Stable machine-readable tag for each failure kind.
    ///
    /// The transport layer serializes this so callers can dispatch on it
    /// without parsing display strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTerms(_) => "invalid_terms",
            Self::MissingCompulsoryPolicy { .. } => "missing_compulsory_policy",
            Self::ConsensusRejected { .. } => "consensus_rejected",
            Self::NotFound(_) => "not_found",
            Self::AgreementInvalid { .. } => "agreement_invalid",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::ResourceUnavailable { .. } => "resource_unavailable",
        }
    }

    /// Whether retrying the same call later could succeed without the
    /// caller changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }
}

/// Result type alias using our error.
pub type Result<T> = std::result::Result<T, GovernanceError>;
