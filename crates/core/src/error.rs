//! Domain error model.

use thiserror::Error;

use crate::id::TenantId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (illegal transitions, authorization,
/// pricing, policy, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The requested action is illegal for the entity's current state.
    #[error("invalid state transition from {current} to {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// The acting principal lacks the role or ownership for the transition.
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    /// No price tier applies to the resolution context.
    #[error("no pricing available: {0}")]
    NoPricingAvailable(String),

    /// No active marketplace policy exists (operator must fix data).
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Optimistic-lock conflict; the caller should reload and retry.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Cross-tenant negotiation attempted without an active association.
    #[error("active association required between seller {seller} and buyer {buyer}")]
    AssociationRequired { seller: TenantId, buyer: TenantId },

    /// The effective marketplace policy forbids the operation.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn transition(current: impl Into<String>, requested: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            current: current.into(),
            requested: requested.into(),
        }
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::AuthorizationDenied(msg.into())
    }

    pub fn no_pricing(msg: impl Into<String>) -> Self {
        Self::NoPricingAvailable(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    pub fn concurrent_modification(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn association_required(seller: TenantId, buyer: TenantId) -> Self {
        Self::AssociationRequired { seller, buyer }
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// True for failures the caller is expected to retry (optimistic conflicts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_renders_both_states() {
        let err = DomainError::transition("SHIPPED", "CANCELLED");
        assert_eq!(
            err.to_string(),
            "invalid state transition from SHIPPED to CANCELLED"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_concurrent_modification_is_retryable() {
        assert!(DomainError::concurrent_modification("stale").is_retryable());
        assert!(!DomainError::configuration("no active config").is_retryable());
    }
}
