//! Blind double review: slot occupancy, final score averaging, and read-time redaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{round1dp, Actor, ActorId, ApplicationId, ApplicationStatus, CriterionScore};
use super::error::WorkflowError;
use super::repository::ApplicationRecord;
use super::scoring::{aggregate, ensure_complete, CategoryTotal, Rubric, ScoringError};

const MAX_REVIEW_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewSlot {
    #[serde(rename = "reviewer_1")]
    Primary,
    #[serde(rename = "reviewer_2")]
    Secondary,
}

impl ReviewSlot {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewSlot::Primary => "reviewer_1",
            ReviewSlot::Secondary => "reviewer_2",
        }
    }
}

/// A reviewer's committed assessment occupying one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAssignment {
    pub reviewer_id: ActorId,
    pub score: f64,
    pub notes: String,
    pub detailed_scores: Vec<CriterionScore>,
    pub categories: Vec<CategoryTotal>,
    pub reviewed_at: DateTime<Utc>,
    /// Only ever set on the secondary slot.
    pub overrode_reviewer1: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSlots {
    pub primary: Option<ReviewAssignment>,
    pub secondary: Option<ReviewAssignment>,
}

impl ReviewSlots {
    pub fn get(&self, slot: ReviewSlot) -> Option<&ReviewAssignment> {
        match slot {
            ReviewSlot::Primary => self.primary.as_ref(),
            ReviewSlot::Secondary => self.secondary.as_ref(),
        }
    }

    pub fn held_by(&self, actor: &ActorId) -> Option<ReviewSlot> {
        [ReviewSlot::Primary, ReviewSlot::Secondary]
            .into_iter()
            .find(|slot| {
                self.get(*slot)
                    .is_some_and(|assignment| &assignment.reviewer_id == actor)
            })
    }

    pub fn next_open(&self) -> Option<ReviewSlot> {
        match (&self.primary, &self.secondary) {
            (None, _) => Some(ReviewSlot::Primary),
            (Some(_), None) => Some(ReviewSlot::Secondary),
            (Some(_), Some(_)) => None,
        }
    }

    pub fn both_filled(&self) -> bool {
        self.primary.is_some() && self.secondary.is_some()
    }

    /// Detail is visible once both slots are filled, or to the slot's own author.
    pub fn visible_to(&self, slot: ReviewSlot, viewer: &ActorId) -> bool {
        self.both_filled()
            || self
                .get(slot)
                .is_some_and(|assignment| &assignment.reviewer_id == viewer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn from_score(score: f64, approval_threshold: f64) -> Self {
        if score >= approval_threshold {
            ReviewDecision::Approved
        } else {
            ReviewDecision::Rejected
        }
    }

    pub const fn status(self) -> ApplicationStatus {
        match self {
            ReviewDecision::Approved => ApplicationStatus::Approved,
            ReviewDecision::Rejected => ApplicationStatus::Rejected,
        }
    }
}

/// Committed outcome once both slots are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReviewOutcome {
    pub final_score: f64,
    pub decision: ReviewDecision,
    pub overrode_reviewer1: bool,
    pub decided_at: DateTime<Utc>,
}

impl FinalReviewOutcome {
    pub fn compute(
        primary_score: f64,
        secondary_score: f64,
        approval_threshold: f64,
        decided_at: DateTime<Utc>,
    ) -> Self {
        let final_score = round1dp((primary_score + secondary_score) / 2.0);
        let decision = ReviewDecision::from_score(final_score, approval_threshold);
        let primary_alone = ReviewDecision::from_score(primary_score, approval_threshold);

        Self {
            final_score,
            decision,
            overrode_reviewer1: decision != primary_alone,
            decided_at,
        }
    }
}

/// Reviewer input for `submit_review` and `revise_review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub detailed_scores: Vec<CriterionScore>,
    pub general_notes: String,
}

/// Scored, validated submission ready to occupy a slot.
pub(crate) struct ScoredReview {
    score: f64,
    notes: String,
    detailed_scores: Vec<CriterionScore>,
    categories: Vec<CategoryTotal>,
}

pub(crate) fn score_submission(
    rubric: &Rubric,
    submission: ReviewSubmission,
) -> Result<ScoredReview, WorkflowError> {
    let notes = submission.general_notes.trim();
    // Missing notes are a field error (`ValidationError` on `general_notes`).
    // `InvalidScore` stays reserved for criterion and total bounds.
    if notes.is_empty() {
        return Err(WorkflowError::validation(
            "general_notes",
            "general notes are required",
        ));
    }

    let breakdown = aggregate(rubric, &submission.detailed_scores)?;
    ensure_complete(rubric, &submission.detailed_scores)?;
    if breakdown.total > MAX_REVIEW_SCORE {
        return Err(ScoringError::TotalOutOfBounds {
            total: breakdown.total,
            min: 0.0,
            max: MAX_REVIEW_SCORE,
        }
        .into());
    }

    Ok(ScoredReview {
        score: breakdown.total,
        notes: notes.to_string(),
        detailed_scores: submission.detailed_scores,
        categories: breakdown.categories,
    })
}

/// The slot a new submission by `actor` would fill. Occupancy alone decides the branch.
pub fn applicable_slot(slots: &ReviewSlots, actor: &ActorId) -> Result<ReviewSlot, WorkflowError> {
    if slots.held_by(actor).is_some() {
        return Err(WorkflowError::DuplicateReviewer(actor.clone()));
    }
    slots
        .next_open()
        .ok_or_else(|| WorkflowError::invalid_state("submit a review", "both review slots are filled"))
}

/// Occupy `slot` and advance the application. Returns the outcome when the review completes.
pub(crate) fn fill_slot(
    record: &mut ApplicationRecord,
    slot: ReviewSlot,
    actor: &ActorId,
    review: ScoredReview,
    approval_threshold: f64,
    now: DateTime<Utc>,
) -> Result<Option<FinalReviewOutcome>, WorkflowError> {
    let assignment = ReviewAssignment {
        reviewer_id: actor.clone(),
        score: review.score,
        notes: review.notes,
        detailed_scores: review.detailed_scores,
        categories: review.categories,
        reviewed_at: now,
        overrode_reviewer1: false,
    };

    match slot {
        ReviewSlot::Primary => {
            if record.reviews.primary.is_some() {
                return Err(WorkflowError::invalid_state(
                    "fill the primary slot",
                    "it is already filled",
                ));
            }
            record.reviews.primary = Some(assignment);
            record.application.status = ApplicationStatus::PendingSeniorReview;
            Ok(None)
        }
        ReviewSlot::Secondary => {
            if record.reviews.primary.is_none() {
                return Err(WorkflowError::validation(
                    "slot",
                    "a senior review requires a completed primary review",
                ));
            }
            if record.reviews.secondary.is_some() {
                return Err(WorkflowError::invalid_state(
                    "fill the senior slot",
                    "it is already filled",
                ));
            }
            record.reviews.secondary = Some(assignment);
            finalize(record, approval_threshold, now).map(Some)
        }
    }
}

/// Replace the author's own assessment. A completed review is re-decided.
pub(crate) fn revise_slot(
    record: &mut ApplicationRecord,
    actor: &ActorId,
    review: ScoredReview,
    approval_threshold: f64,
    now: DateTime<Utc>,
) -> Result<(ReviewSlot, Option<FinalReviewOutcome>), WorkflowError> {
    let slot = record.reviews.held_by(actor).ok_or_else(|| WorkflowError::NotOwner {
        application_id: record.application.id,
        actor: actor.clone(),
        assignment: "author of a review",
    })?;

    let assignment = match slot {
        ReviewSlot::Primary => record.reviews.primary.as_mut(),
        ReviewSlot::Secondary => record.reviews.secondary.as_mut(),
    }
    .ok_or_else(|| WorkflowError::invalid_state("revise a review", "the slot is empty"))?;

    assignment.score = review.score;
    assignment.notes = review.notes;
    assignment.detailed_scores = review.detailed_scores;
    assignment.categories = review.categories;
    assignment.reviewed_at = now;

    if record.reviews.both_filled() {
        let outcome = finalize(record, approval_threshold, now)?;
        Ok((slot, Some(outcome)))
    } else {
        Ok((slot, None))
    }
}

fn finalize(
    record: &mut ApplicationRecord,
    approval_threshold: f64,
    now: DateTime<Utc>,
) -> Result<FinalReviewOutcome, WorkflowError> {
    let (primary, secondary) = match (&record.reviews.primary, &mut record.reviews.secondary) {
        (Some(primary), Some(secondary)) => (primary, secondary),
        _ => {
            return Err(WorkflowError::invalid_state(
                "compute a final score",
                "a review slot is empty",
            ))
        }
    };

    let outcome = FinalReviewOutcome::compute(
        primary.score,
        secondary.score,
        approval_threshold,
        now,
    );
    secondary.overrode_reviewer1 = outcome.overrode_reviewer1;
    record.application.status = outcome.decision.status();
    record.outcome = Some(outcome.clone());
    Ok(outcome)
}

/// One slot as seen by a particular viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSlotView {
    pub filled: bool,
    pub redacted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<CategoryTotal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrode_reviewer1: Option<bool>,
}

impl ReviewSlotView {
    fn empty() -> Self {
        Self {
            filled: false,
            redacted: false,
            reviewer_id: None,
            score: None,
            notes: None,
            categories: Vec::new(),
            reviewed_at: None,
            overrode_reviewer1: None,
        }
    }

    fn redacted() -> Self {
        Self {
            filled: true,
            redacted: true,
            ..Self::empty()
        }
    }

    fn full(slot: ReviewSlot, assignment: &ReviewAssignment) -> Self {
        Self {
            filled: true,
            redacted: false,
            reviewer_id: Some(assignment.reviewer_id.clone()),
            score: Some(assignment.score),
            notes: Some(assignment.notes.clone()),
            categories: assignment.categories.clone(),
            reviewed_at: Some(assignment.reviewed_at),
            overrode_reviewer1: (slot == ReviewSlot::Secondary)
                .then_some(assignment.overrode_reviewer1),
        }
    }
}

/// Review progress with blind-review redaction applied for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStatusView {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub reviewer1: ReviewSlotView,
    pub reviewer2: ReviewSlotView,
    pub both_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<ReviewDecision>,
    pub is_locked: bool,
    pub can_submit_review: bool,
}

pub(crate) fn slot_view(
    record: &ApplicationRecord,
    slot: ReviewSlot,
    viewer: &ActorId,
) -> ReviewSlotView {
    match record.reviews.get(slot) {
        None => ReviewSlotView::empty(),
        Some(assignment) if record.reviews.visible_to(slot, viewer) => {
            ReviewSlotView::full(slot, assignment)
        }
        Some(_) => ReviewSlotView::redacted(),
    }
}

pub(crate) fn status_view(
    record: &ApplicationRecord,
    viewer: &Actor,
    can_submit_review: bool,
) -> ReviewStatusView {
    let both_complete = record.reviews.both_filled();
    let outcome = record.outcome.as_ref().filter(|_| both_complete);

    ReviewStatusView {
        application_id: record.application.id,
        status: record.application.status,
        reviewer1: slot_view(record, ReviewSlot::Primary, &viewer.id),
        reviewer2: slot_view(record, ReviewSlot::Secondary, &viewer.id),
        both_complete,
        final_score: outcome.map(|outcome| outcome.final_score),
        decision: outcome.map(|outcome| outcome.decision),
        is_locked: record.is_locked(),
        can_submit_review,
    }
}

/// Per-criterion detail for `slot`, or an empty set when the viewer may not see it yet.
pub(crate) fn visible_detail(
    record: &ApplicationRecord,
    slot: ReviewSlot,
    viewer: &ActorId,
) -> Vec<CriterionScore> {
    match record.reviews.get(slot) {
        Some(assignment) if record.reviews.visible_to(slot, viewer) => {
            assignment.detailed_scores.clone()
        }
        _ => Vec::new(),
    }
}
