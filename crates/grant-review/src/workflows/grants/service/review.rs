use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::super::authorization::{is_eligible, Operation};
use super::super::domain::{Actor, ApplicationId, ApplicationStatus, CriterionScore};
use super::super::error::WorkflowError;
use super::super::lock::{self, LockInfo};
use super::super::oversight::score_disparity;
use super::super::repository::{
    ApplicationRecord, ApplicationRepository, NotificationPublisher, WorkflowNotice,
};
use super::super::review::{
    applicable_slot, fill_slot, revise_slot, score_submission, status_view, visible_detail,
    FinalReviewOutcome, ReviewSlot, ReviewStatusView, ReviewSubmission,
};
use super::{authorize, GrantReviewService};

/// What the submitting reviewer gets back. Only ever describes their own slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub application_id: ApplicationId,
    pub slot: ReviewSlot,
    pub score: f64,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<FinalReviewOutcome>,
}

impl<R, N> GrantReviewService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Fill the next open review slot. Occupancy picks the slot; the role must be eligible
    /// for that slot.
    pub fn submit_review(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        submission: ReviewSubmission,
    ) -> Result<ReviewReceipt, WorkflowError> {
        let mut record = self.load(application_id)?;
        lock::ensure_unlocked(&record)?;

        let slot = applicable_slot(&record.reviews, &actor.id)?;
        if !is_eligible(actor.role, Operation::SubmitReview(slot)) {
            if slot == ReviewSlot::Primary
                && is_eligible(actor.role, Operation::SubmitReview(ReviewSlot::Secondary))
            {
                return Err(WorkflowError::validation(
                    "slot",
                    "a senior review requires a completed primary review",
                ));
            }
            return Err(WorkflowError::NotEligible {
                role: actor.role,
                operation: Operation::SubmitReview(slot),
            });
        }

        let rubric = self.rubrics.for_track(record.application.track);
        let scored = score_submission(rubric, submission)?;
        let outcome = fill_slot(
            &mut record,
            slot,
            &actor.id,
            scored,
            self.policy.approval_threshold,
            self.now(),
        )?;

        let stored = self.commit(record)?;
        let receipt = receipt_for(&stored, slot, outcome);
        info!(
            %application_id,
            reviewer = %actor.id,
            slot = slot.label(),
            status = stored.application.status.label(),
            "review slot filled"
        );
        if let Some(outcome) = &receipt.outcome {
            self.notify_decision(&stored, outcome);
        }
        Ok(receipt)
    }

    /// Replace the caller's own review before the application is locked. The held slot picks
    /// the review; the caller's current role must still be eligible for that slot.
    pub fn revise_review(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        submission: ReviewSubmission,
    ) -> Result<ReviewReceipt, WorkflowError> {
        let mut record = self.load(application_id)?;
        lock::ensure_unlocked(&record)?;
        if let Some(held) = record.reviews.held_by(&actor.id) {
            authorize(actor, Operation::SubmitReview(held))?;
        }

        let rubric = self.rubrics.for_track(record.application.track);
        let scored = score_submission(rubric, submission)?;
        let (slot, outcome) = revise_slot(
            &mut record,
            &actor.id,
            scored,
            self.policy.approval_threshold,
            self.now(),
        )?;

        let stored = self.commit(record)?;
        info!(%application_id, reviewer = %actor.id, slot = slot.label(), "review revised");
        let receipt = receipt_for(&stored, slot, outcome);
        if let Some(outcome) = &receipt.outcome {
            self.notify_decision(&stored, outcome);
        }
        Ok(receipt)
    }

    pub fn get_review_status(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<ReviewStatusView, WorkflowError> {
        authorize(actor, Operation::ViewReviewStatus)?;
        let record = self.load(application_id)?;

        let can_submit_review = !record.is_locked()
            && applicable_slot(&record.reviews, &actor.id)
                .is_ok_and(|slot| is_eligible(actor.role, Operation::SubmitReview(slot)));

        let view = status_view(&record, actor, can_submit_review);
        if view.reviewer1.redacted || view.reviewer2.redacted {
            debug!(%application_id, viewer = %actor.id, "review detail redacted for viewer");
        }
        Ok(view)
    }

    /// Per-criterion scores for a slot; empty while the blind rule hides them from `actor`.
    pub fn get_detailed_scores(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        slot: ReviewSlot,
    ) -> Result<Vec<CriterionScore>, WorkflowError> {
        authorize(actor, Operation::ViewReviewStatus)?;
        let record = self.load(application_id)?;
        Ok(visible_detail(&record, slot, &actor.id))
    }

    /// `|r1 - r2|` once both reviews are in. Advisory only.
    pub fn calculate_score_disparity(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<f64>, WorkflowError> {
        let record = self.load(application_id)?;
        Ok(score_disparity(&record))
    }

    pub fn lock_application(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        reason: &str,
    ) -> Result<LockInfo, WorkflowError> {
        authorize(actor, Operation::LockApplication)?;
        let mut record = self.load(application_id)?;
        let info = lock::lock(&mut record, &actor.id, reason, self.now())?;
        self.commit(record)?;
        info!(%application_id, locked_by = %actor.id, reason = %info.reason, "application locked");
        Ok(info)
    }

    /// Administrative escape hatch; returns the lock that was cleared.
    pub fn unlock_application(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<LockInfo, WorkflowError> {
        authorize(actor, Operation::UnlockApplication)?;
        let mut record = self.load(application_id)?;
        let cleared = lock::unlock(&mut record)?;
        self.commit(record)?;
        info!(
            %application_id,
            unlocked_by = %actor.id,
            previously_locked_by = %cleared.locked_by,
            "application unlocked"
        );
        Ok(cleared)
    }

    fn notify_decision(&self, record: &ApplicationRecord, outcome: &FinalReviewOutcome) {
        let mut notice = WorkflowNotice::new("decision_reached", record.application.id)
            .with("decision", record.application.status.label())
            .with("final_score", format!("{:.1}", outcome.final_score));
        if let Some(disparity) = score_disparity(record)
            .filter(|disparity| *disparity > self.policy.disparity_threshold)
        {
            notice = notice.with("disparity_warning", format!("{disparity:.1}"));
        }
        self.notify(notice);
    }
}

fn receipt_for(
    record: &ApplicationRecord,
    slot: ReviewSlot,
    outcome: Option<FinalReviewOutcome>,
) -> ReviewReceipt {
    ReviewReceipt {
        application_id: record.application.id,
        slot,
        score: record
            .reviews
            .get(slot)
            .map(|assignment| assignment.score)
            .unwrap_or_default(),
        status: record.application.status,
        outcome,
    }
}
