//! Role eligibility. Slot occupancy is checked separately by each workflow; the two predicates
//! are composed at the service layer and never substitute for one another.

use std::fmt;

use serde::Serialize;

use super::domain::Role;
use super::review::ReviewSlot;

/// Every externally callable operation that is gated on the caller's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterApplication,
    SubmitReview(ReviewSlot),
    ViewReviewStatus,
    LockApplication,
    UnlockApplication,
    ClaimDueDiligence,
    ReleaseDueDiligence,
    SubmitPrimaryAssessment,
    SelectValidator,
    SubmitValidatorAction,
    ViewDueDiligence,
    OverrideDueDiligenceScore,
    RecommendDueDiligence,
    ViewOversight,
}

impl Operation {
    pub const fn label(self) -> &'static str {
        match self {
            Operation::RegisterApplication => "register applications",
            Operation::SubmitReview(ReviewSlot::Primary) => "submit a primary review",
            Operation::SubmitReview(ReviewSlot::Secondary) => "submit a senior review",
            Operation::ViewReviewStatus => "view review status",
            Operation::LockApplication => "lock applications",
            Operation::UnlockApplication => "unlock applications",
            Operation::ClaimDueDiligence => "claim due diligence",
            Operation::ReleaseDueDiligence => "release due diligence",
            Operation::SubmitPrimaryAssessment => "submit a due-diligence assessment",
            Operation::SelectValidator => "select a validator",
            Operation::SubmitValidatorAction => "act as validator",
            Operation::ViewDueDiligence => "view due diligence",
            Operation::OverrideDueDiligenceScore => "override due-diligence scores",
            Operation::RecommendDueDiligence => "recommend due diligence",
            Operation::ViewOversight => "view oversight signals",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const DUE_DILIGENCE_ROLES: &[Role] = &[
    Role::TechnicalReviewer,
    Role::Reviewer1,
    Role::Reviewer2,
    Role::Admin,
];

/// Whether `role` may invoke `operation` at all.
pub fn is_eligible(role: Role, operation: Operation) -> bool {
    match operation {
        Operation::RegisterApplication => matches!(role, Role::Applicant | Role::Admin),
        Operation::SubmitReview(ReviewSlot::Primary) => {
            matches!(role, Role::Reviewer1 | Role::Admin)
        }
        Operation::SubmitReview(ReviewSlot::Secondary) => {
            matches!(role, Role::Reviewer2 | Role::Admin)
        }
        Operation::ViewReviewStatus => role != Role::Applicant,
        Operation::LockApplication | Operation::UnlockApplication => role == Role::Admin,
        Operation::ClaimDueDiligence
        | Operation::ReleaseDueDiligence
        | Operation::SubmitPrimaryAssessment
        | Operation::SelectValidator
        | Operation::SubmitValidatorAction => DUE_DILIGENCE_ROLES.contains(&role),
        Operation::ViewDueDiligence => {
            DUE_DILIGENCE_ROLES.contains(&role) || role == Role::Oversight
        }
        Operation::OverrideDueDiligenceScore => role == Role::Admin,
        Operation::RecommendDueDiligence | Operation::ViewOversight => {
            matches!(role, Role::Oversight | Role::Admin)
        }
    }
}
