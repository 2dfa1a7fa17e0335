use super::authorization::Operation;
use super::domain::{ActorId, ApplicationId, Role};
use super::repository::RepositoryError;
use super::scoring::ScoringError;

/// Typed failure for every review, lock, and due-diligence operation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("invalid score: {0}")]
    InvalidScore(#[from] ScoringError),
    #[error("{0} already holds a review slot on this application")]
    DuplicateReviewer(ActorId),
    #[error("the validator must be someone other than the primary reviewer")]
    SelfValidationForbidden,
    #[error("application {0} is locked")]
    ApplicationLocked(ApplicationId),
    #[error("application {0} is already locked")]
    AlreadyLocked(ApplicationId),
    #[error("due diligence for application {0} has already been claimed")]
    AlreadyClaimed(ApplicationId),
    #[error("{actor} is not the {assignment} for application {application_id}")]
    NotOwner {
        application_id: ApplicationId,
        actor: ActorId,
        assignment: &'static str,
    },
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("no due-diligence record exists for application {0}")]
    DueDiligenceNotFound(ApplicationId),
    #[error("role {role} is not permitted to {operation}")]
    NotEligible { role: Role, operation: Operation },
    #[error("cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },
    #[error("application {0} was modified concurrently; re-fetch and retry")]
    StaleRecord(ApplicationId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(action: &'static str, state: impl Into<String>) -> Self {
        Self::InvalidState {
            action,
            state: state.into(),
        }
    }

    /// Stable error kind surfaced to API callers.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "ValidationError",
            WorkflowError::InvalidScore(ScoringError::ScoreOutOfBounds { .. }) => {
                "ScoreOutOfBounds"
            }
            WorkflowError::InvalidScore(_) => "InvalidScore",
            WorkflowError::DuplicateReviewer(_) => "DuplicateReviewer",
            WorkflowError::SelfValidationForbidden => "SelfValidationForbidden",
            WorkflowError::ApplicationLocked(_) => "ApplicationLocked",
            WorkflowError::AlreadyLocked(_) => "AlreadyLocked",
            WorkflowError::AlreadyClaimed(_) => "AlreadyClaimed",
            WorkflowError::NotOwner { .. } => "NotOwner",
            WorkflowError::ApplicationNotFound(_) | WorkflowError::DueDiligenceNotFound(_) => {
                "NotFound"
            }
            WorkflowError::NotEligible { .. } => "NotEligible",
            WorkflowError::InvalidState { .. } => "InvalidState",
            WorkflowError::StaleRecord(_) => "StaleRecord",
            WorkflowError::Repository(_) => "RepositoryError",
        }
    }

    /// The offending input field, when the error is attributable to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            WorkflowError::Validation { field, .. } => Some(field),
            WorkflowError::InvalidScore(_) => Some("detailed_scores"),
            WorkflowError::DuplicateReviewer(_) => Some("actor_id"),
            WorkflowError::SelfValidationForbidden => Some("validator_id"),
            _ => None,
        }
    }
}
