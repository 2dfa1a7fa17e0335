//! Grant application evaluation: blind two-reviewer scoring, administrative locks, and the
//! due-diligence pipeline with validator hand-off and deadline reassignment.
//!
//! Every mutation follows the same shape: load the application aggregate, refuse if it is
//! locked, apply a pure transition, and commit with a version-conditional write.

pub mod authorization;
pub mod domain;
pub mod due_diligence;
pub mod error;
pub mod lock;
pub mod oversight;
pub mod repository;
pub mod review;
pub mod router;
pub mod scoring;
pub mod service;

#[cfg(test)]
mod tests;

pub use authorization::{is_eligible, Operation};
pub use domain::{
    round1dp, Actor, ActorId, Application, ApplicationId, ApplicationStatus, CriterionScore,
    Role, Track,
};
pub use due_diligence::{
    DdItem, DdStatus, DueDiligenceRecord, PrimaryAssessment, ValidatorAction,
};
pub use error::WorkflowError;
pub use lock::LockInfo;
pub use oversight::{score_disparity, EscalationReason, EscalationSignal};
pub use repository::{
    ApplicationRecord, ApplicationRepository, NotificationError, NotificationPublisher,
    RepositoryError, WorkflowNotice,
};
pub use review::{
    FinalReviewOutcome, ReviewAssignment, ReviewDecision, ReviewSlot, ReviewSlotView, ReviewSlots,
    ReviewStatusView, ReviewSubmission,
};
pub use router::grant_router;
pub use scoring::{
    Criterion, Rubric, RubricCategory, RubricConfig, RubricError, RubricImportError,
    RubricImporter, ScoreBreakdown, ScoringError,
};
pub use service::{
    Clock, DdPoolEntry, DueDiligenceView, GrantReviewService, ReviewPolicy, ReviewReceipt,
    SweepReport, SystemClock,
};
