use serde::Serialize;
use thiserror::Error;

use tradedesk_core::DomainError;
use tradedesk_infra::DispatchError;
use tradedesk_infra::projections::ProjectionError;

/// Failure of a workflow operation.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Stored history could not be loaded or committed.
    #[error(transparent)]
    Dispatch(DispatchError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl From<DispatchError> for WorkflowError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => WorkflowError::Domain(err),
            other => WorkflowError::Dispatch(other),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Caller-facing classification of a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidStateTransition,
    AuthorizationDenied,
    NoPricingAvailable,
    ConfigurationError,
    ConcurrentModification,
    AssociationRequired,
    PolicyViolation,
    Validation,
    NotFound,
    Internal,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Domain(err) => match err {
                DomainError::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
                DomainError::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
                DomainError::NoPricingAvailable(_) => ErrorKind::NoPricingAvailable,
                DomainError::ConfigurationError(_) => ErrorKind::ConfigurationError,
                DomainError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
                DomainError::AssociationRequired { .. } => ErrorKind::AssociationRequired,
                DomainError::PolicyViolation(_) => ErrorKind::PolicyViolation,
                DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
                DomainError::NotFound => ErrorKind::NotFound,
                DomainError::InvariantViolation(_) => ErrorKind::Internal,
            },
            WorkflowError::Dispatch(_) | WorkflowError::Projection(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Domain(err) if err.is_retryable())
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            WorkflowError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradedesk_infra::event_store::EventStoreError;

    #[test]
    fn domain_errors_keep_their_kind_through_dispatch() {
        let err: WorkflowError = DispatchError::Domain(DomainError::transition("SHIPPED", "CANCELLED")).into();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert!(!err.is_retryable());
    }

    #[test]
    fn optimistic_lock_conflicts_are_retryable() {
        let err: WorkflowError = DispatchError::from(EventStoreError::Concurrency("stale".into())).into();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
        assert!(err.is_retryable());
    }

    #[test]
    fn infrastructure_failures_are_internal() {
        let err: WorkflowError = DispatchError::Deserialize("bad payload".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.as_domain().is_none());
    }
}
