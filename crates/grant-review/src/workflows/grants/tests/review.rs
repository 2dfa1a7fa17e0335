use super::common::*;
use crate::workflows::grants::domain::{Actor, ApplicationId, ApplicationStatus, Role, Track};
use crate::workflows::grants::error::WorkflowError;
use crate::workflows::grants::review::{ReviewDecision, ReviewSlot, ReviewSubmission};
use crate::workflows::grants::scoring::ScoringError;
use crate::workflows::grants::service::{GrantReviewService, ReviewPolicy};
use chrono::Duration;
use std::sync::Arc;

#[test]
fn averaged_score_on_the_threshold_is_approved() {
    let h = harness();
    let id = h.register();

    let first = h
        .service
        .submit_review(id, &reviewer1(), submission(80.0))
        .expect("primary review");
    assert_eq!(first.slot, ReviewSlot::Primary);
    assert_eq!(first.status, ApplicationStatus::PendingSeniorReview);
    assert!(first.outcome.is_none());

    let second = h
        .service
        .submit_review(id, &reviewer2(), submission(60.0))
        .expect("senior review");
    let outcome = second.outcome.expect("final outcome");
    assert_eq!(outcome.final_score, 70.0);
    assert_eq!(outcome.decision, ReviewDecision::Approved);
    assert!(!outcome.overrode_reviewer1);
    assert_eq!(second.status, ApplicationStatus::Approved);

    let stored = h.repository.stored(id);
    assert_eq!(stored.application.status, ApplicationStatus::Approved);
    assert_eq!(stored.outcome.map(|o| o.final_score), Some(70.0));
}

#[test]
fn half_point_below_threshold_is_rejected() {
    let h = harness();
    let id = h.reviewed(80.0, 59.0);

    let stored = h.repository.stored(id);
    let outcome = stored.outcome.expect("outcome cached");
    assert_eq!(outcome.final_score, 69.5);
    assert_eq!(outcome.decision, ReviewDecision::Rejected);
    assert_eq!(stored.application.status, ApplicationStatus::Rejected);
    // Reviewer 1 alone would have approved.
    assert!(outcome.overrode_reviewer1);
    assert!(stored.reviews.secondary.expect("senior slot").overrode_reviewer1);
}

#[test]
fn cached_final_score_matches_a_recomputation() {
    let h = harness();
    let id = h.reviewed(73.0, 88.0);

    let stored = h.repository.stored(id);
    let primary = stored.reviews.primary.as_ref().expect("primary").score;
    let secondary = stored.reviews.secondary.as_ref().expect("secondary").score;
    let cached = stored.outcome.expect("outcome");
    assert_eq!(cached.final_score, 80.5);
    assert_eq!(
        cached.final_score,
        crate::workflows::grants::domain::round1dp((primary + secondary) / 2.0)
    );
}

#[test]
fn decision_notice_carries_disparity_warning() {
    let h = harness();
    h.reviewed(90.0, 60.0);

    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].template, "decision_reached");
    assert_eq!(notices[0].details["decision"], "approved");
    assert_eq!(notices[0].details["final_score"], "75.0");
    assert_eq!(notices[0].details["disparity_warning"], "30.0");
}

#[test]
fn senior_reviewer_cannot_open_the_primary_slot() {
    let h = harness();
    let id = h.register();

    match h.service.submit_review(id, &reviewer2(), submission(75.0)) {
        Err(WorkflowError::Validation { field: "slot", .. }) => {}
        other => panic!("expected slot precondition failure, got {other:?}"),
    }
    assert!(h.repository.stored(id).reviews.primary.is_none());
}

#[test]
fn same_reviewer_cannot_fill_both_slots() {
    let h = harness();
    let id = h.register();
    let admin = admin();

    h.service
        .submit_review(id, &admin, submission(80.0))
        .expect("admin may fill the primary slot");

    match h.service.submit_review(id, &admin, submission(80.0)) {
        Err(WorkflowError::DuplicateReviewer(actor)) => assert_eq!(actor, admin.id),
        other => panic!("expected duplicate reviewer, got {other:?}"),
    }
}

#[test]
fn third_review_is_rejected_once_both_slots_fill() {
    let h = harness();
    let id = h.reviewed(80.0, 70.0);
    let extra = Actor::new("r2-other", Role::Reviewer2);

    assert!(matches!(
        h.service.submit_review(id, &extra, submission(70.0)),
        Err(WorkflowError::InvalidState { .. })
    ));
}

#[test]
fn applicants_cannot_submit_reviews() {
    let h = harness();
    let id = h.register();

    assert!(matches!(
        h.service.submit_review(id, &applicant(), submission(70.0)),
        Err(WorkflowError::NotEligible { role: Role::Applicant, .. })
    ));
}

#[test]
fn empty_notes_fail_validation() {
    let h = harness();
    let id = h.register();
    let blank = ReviewSubmission {
        detailed_scores: scores_totalling(Track::Foundation, 80.0),
        general_notes: "   ".to_string(),
    };

    let error = h
        .service
        .submit_review(id, &reviewer1(), blank)
        .expect_err("notes required");
    assert_eq!(error.kind(), "ValidationError");
    assert_eq!(error.field(), Some("general_notes"));
}

#[test]
fn out_of_range_criterion_scores_are_rejected() {
    let h = harness();
    let id = h.register();
    let mut sheet = submission(80.0);
    sheet.detailed_scores[0].score = 21.0;

    let error = h
        .service
        .submit_review(id, &reviewer1(), sheet)
        .expect_err("criterion max is 20");
    assert!(matches!(
        error,
        WorkflowError::InvalidScore(ScoringError::ScoreOutOfBounds { .. })
    ));
    assert_eq!(error.kind(), "ScoreOutOfBounds");
    assert_eq!(h.repository.stored(id).application.status, ApplicationStatus::Submitted);
}

#[test]
fn incomplete_sheets_and_foreign_criteria_are_rejected() {
    let h = harness();
    let id = h.register();

    let mut partial = submission(80.0);
    partial.detailed_scores.pop();
    assert!(matches!(
        h.service.submit_review(id, &reviewer1(), partial),
        Err(WorkflowError::InvalidScore(ScoringError::MissingCriterion(_)))
    ));

    let foreign = ReviewSubmission {
        detailed_scores: scores_totalling(Track::Acceleration, 80.0),
        general_notes: "Wrong rubric".to_string(),
    };
    assert!(matches!(
        h.service.submit_review(id, &reviewer1(), foreign),
        Err(WorkflowError::InvalidScore(ScoringError::UnknownCriterion { .. }))
    ));
}

#[test]
fn blind_review_redacts_primary_until_both_slots_fill() {
    let h = harness();
    let id = h.register();
    h.service
        .submit_review(id, &reviewer1(), submission(82.0))
        .expect("primary review");

    let bystander = Actor::new("r1-other", Role::Reviewer1);
    let view = h
        .service
        .get_review_status(id, &bystander)
        .expect("status view");
    assert!(view.reviewer1.filled);
    assert!(view.reviewer1.redacted);
    assert!(view.reviewer1.score.is_none());
    assert!(view.reviewer1.notes.is_none());
    assert!(!view.reviewer2.filled);
    assert!(!view.both_complete);

    let senior = h
        .service
        .get_review_status(id, &reviewer2())
        .expect("senior view");
    assert!(senior.reviewer1.redacted);
    assert!(senior.can_submit_review);
    assert!(h
        .service
        .get_detailed_scores(id, &reviewer2(), ReviewSlot::Primary)
        .expect("detail")
        .is_empty());

    let own = h
        .service
        .get_review_status(id, &reviewer1())
        .expect("author view");
    assert!(!own.reviewer1.redacted);
    assert_eq!(own.reviewer1.score, Some(82.0));
    assert!(!own.can_submit_review);
    assert_eq!(
        h.service
            .get_detailed_scores(id, &reviewer1(), ReviewSlot::Primary)
            .expect("own detail")
            .len(),
        5
    );
}

#[test]
fn full_detail_is_visible_after_both_reviews() {
    let h = harness();
    let id = h.reviewed(80.0, 60.0);

    let view = h
        .service
        .get_review_status(id, &oversight())
        .expect("status view");
    assert!(view.both_complete);
    assert_eq!(view.reviewer1.score, Some(80.0));
    assert_eq!(view.reviewer2.score, Some(60.0));
    assert_eq!(view.reviewer2.overrode_reviewer1, Some(false));
    assert_eq!(view.final_score, Some(70.0));
    assert_eq!(view.decision, Some(ReviewDecision::Approved));
    assert!(!view.can_submit_review);
}

#[test]
fn applicants_cannot_read_review_status() {
    let h = harness();
    let id = h.register();

    assert!(matches!(
        h.service.get_review_status(id, &applicant()),
        Err(WorkflowError::NotEligible { .. })
    ));
}

#[test]
fn revising_a_completed_review_recomputes_the_decision() {
    let h = harness();
    let id = h.reviewed(80.0, 59.0);
    h.clock.advance(Duration::hours(2));

    let receipt = h
        .service
        .revise_review(id, &reviewer2(), submission(61.0))
        .expect("revise senior review");
    assert_eq!(receipt.slot, ReviewSlot::Secondary);
    let outcome = receipt.outcome.expect("recomputed outcome");
    assert_eq!(outcome.final_score, 70.5);
    assert_eq!(outcome.decision, ReviewDecision::Approved);
    assert!(!outcome.overrode_reviewer1);
    assert_eq!(outcome.decided_at, start_time() + Duration::hours(2));
    assert_eq!(h.repository.stored(id).application.status, ApplicationStatus::Approved);
}

#[test]
fn only_slot_authors_may_revise() {
    let h = harness();
    let id = h.reviewed(80.0, 60.0);
    let stranger = Actor::new("r1-other", Role::Reviewer1);

    assert!(matches!(
        h.service.revise_review(id, &stranger, submission(60.0)),
        Err(WorkflowError::NotOwner { .. })
    ));
}

#[test]
fn revising_author_must_still_hold_an_eligible_role() {
    let h = harness();
    let id = h.reviewed(80.0, 60.0);
    let demoted = Actor::new(reviewer1().id.0, Role::Applicant);

    assert!(matches!(
        h.service.revise_review(id, &demoted, submission(90.0)),
        Err(WorkflowError::NotEligible {
            role: Role::Applicant,
            ..
        })
    ));
    assert_eq!(h.repository.stored(id).reviews.primary.map(|r| r.score), Some(80.0));
}

#[test]
fn concurrent_writer_surfaces_as_stale_record() {
    let repository = Arc::new(InterleavedRepository::default());
    let service = GrantReviewService::new(
        repository.clone(),
        Arc::new(MemoryNotifier::default()),
        rubric_config(),
        ReviewPolicy::default(),
    );
    let id = service
        .register_application(&applicant(), Track::Foundation)
        .expect("register")
        .application
        .id;

    repository.arm();
    match service.submit_review(id, &reviewer1(), submission(70.0)) {
        Err(WorkflowError::StaleRecord(stale)) => assert_eq!(stale, id),
        other => panic!("expected stale record, got {other:?}"),
    }
    service
        .submit_review(id, &reviewer1(), submission(70.0))
        .expect("retry after re-read succeeds");
}

#[test]
fn unknown_application_is_not_found() {
    let h = harness();

    let error = h
        .service
        .submit_review(ApplicationId(999_999), &reviewer1(), submission(70.0))
        .expect_err("missing application");
    assert_eq!(error.kind(), "NotFound");
}

#[test]
fn disparity_is_reported_once_both_reviews_exist() {
    let h = harness();
    let id = h.register();
    assert_eq!(h.service.calculate_score_disparity(id).expect("disparity"), None);

    let id = h.reviewed(91.0, 78.5);
    assert_eq!(
        h.service.calculate_score_disparity(id).expect("disparity"),
        Some(12.5)
    );
}
