use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::super::authorization::Operation;
use super::super::domain::{Actor, ActorId, ApplicationId, ApplicationStatus, Track};
use super::super::due_diligence::{
    self as dd, DdStatus, DueDiligenceRecord, PrimaryAssessment, ValidatorAction,
};
use super::super::error::WorkflowError;
use super::super::lock;
use super::super::repository::{
    ApplicationRecord, ApplicationRepository, NotificationPublisher, RepositoryError,
    WorkflowNotice,
};
use super::super::scoring::{aggregate, ScoreBreakdown};
use super::{authorize, GrantReviewService};

const CLAIM_ATTEMPTS: usize = 3;

/// Due-diligence state together with derived scoring for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueDiligenceView {
    pub application_id: ApplicationId,
    pub track: Track,
    pub due_diligence: DueDiligenceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_breakdown: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_score: Option<f64>,
    pub deadline_elapsed: bool,
}

/// Claimable work, oversight-initiated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdPoolEntry {
    pub application_id: ApplicationId,
    pub track: Track,
    pub review_status: ApplicationStatus,
    pub dd_status: DdStatus,
    pub is_oversight_initiated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_review_score: Option<f64>,
    /// Validator feedback left for the next claimant after a query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub reassigned: Vec<ApplicationId>,
    /// Overdue records left alone because they were locked or changed mid-sweep.
    pub skipped: Vec<ApplicationId>,
}

impl<R, N> GrantReviewService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Take ownership of an unclaimed assessment. Exactly one of any set of concurrent
    /// claimants succeeds; the rest receive `AlreadyClaimed`.
    ///
    /// A lost version race re-reads the record: only an owner or an unclaimable status on the
    /// fresh copy means the claim was taken. Unrelated writes just cost another attempt.
    pub fn claim_dd_application(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::ClaimDueDiligence)?;

        for attempt in 1..=CLAIM_ATTEMPTS {
            let mut record = self.load(application_id)?;
            lock::ensure_unlocked(&record)?;

            if record.due_diligence.is_none()
                && record.application.status != ApplicationStatus::Approved
            {
                return Err(WorkflowError::invalid_state(
                    "claim due diligence",
                    format!("the review outcome is {}", record.application.status),
                ));
            }

            let now = self.now();
            let state = record
                .due_diligence
                .get_or_insert_with(|| DueDiligenceRecord::new(now));
            dd::claim(state, application_id, &actor.id, now)?;

            match self.repository.update(record) {
                Ok(stored) => {
                    info!(%application_id, primary_reviewer = %actor.id, "due diligence claimed");
                    return self.view_of(&stored, now);
                }
                Err(RepositoryError::Conflict) => {
                    debug!(
                        %application_id,
                        claimant = %actor.id,
                        attempt,
                        "record changed before claim landed"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(%application_id, claimant = %actor.id, "claim kept losing to concurrent updates");
        Err(WorkflowError::StaleRecord(application_id))
    }

    pub fn release_dd_application(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::ReleaseDueDiligence)?;
        self.mutate_due_diligence(application_id, |state, _, _| {
            dd::release(state, application_id, &actor.id)
        })
        .inspect(|_| info!(%application_id, released_by = %actor.id, "due diligence released"))
    }

    pub fn submit_primary_dd_review(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        assessment: PrimaryAssessment,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::SubmitPrimaryAssessment)?;
        self.mutate_due_diligence(application_id, |state, track, now| {
            dd::submit_primary(
                state,
                application_id,
                &actor.id,
                self.rubrics.for_track(track),
                assessment,
                now,
            )
        })
        .inspect(|view| {
            info!(
                %application_id,
                primary_reviewer = %actor.id,
                score = view.due_diligence.phase1_score.unwrap_or_default(),
                "primary due-diligence assessment submitted"
            )
        })
    }

    /// Hand the assessment to a validator drawn from `eligible_pool` and start the SLA clock.
    pub fn select_validator_reviewer(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        validator: &ActorId,
        eligible_pool: &[ActorId],
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::SelectValidator)?;
        let window = self.policy.dd_approval_window;
        let view = self.mutate_due_diligence(application_id, |state, _, now| {
            dd::select_validator(
                state,
                application_id,
                &actor.id,
                validator,
                eligible_pool,
                window,
                now,
            )
            .map(|_| ())
        })?;

        let deadline = view
            .due_diligence
            .approval_deadline
            .map(|deadline| deadline.to_rfc3339())
            .unwrap_or_default();
        info!(%application_id, validator = %validator, %deadline, "validator selected");
        self.notify(
            WorkflowNotice::new("dd_validator_assigned", application_id)
                .with("validator", validator)
                .with("approval_deadline", deadline),
        );
        Ok(view)
    }

    pub fn submit_validator_action(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        action: ValidatorAction,
        comments: &str,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::SubmitValidatorAction)?;
        let view = self.mutate_due_diligence(application_id, |state, _, now| {
            dd::validator_decision(state, application_id, &actor.id, action, comments, now)
        })?;

        let template = match action {
            ValidatorAction::Approved => "dd_approved",
            ValidatorAction::Queried => "dd_queried",
        };
        info!(%application_id, validator = %actor.id, action = template, "validator acted");
        self.notify(WorkflowNotice::new(template, application_id).with("validator", &actor.id));
        Ok(view)
    }

    /// Move every overdue validator hand-off to `auto_reassigned`. Safe to run repeatedly.
    pub fn sweep_expired_approvals(&self) -> Result<SweepReport, WorkflowError> {
        let now = self.now();
        let mut report = SweepReport::default();

        for mut record in self.repository.list()? {
            let application_id = record.application.id;
            let Some(state) = record.due_diligence.as_mut() else {
                continue;
            };
            if !state.deadline_elapsed(now) {
                continue;
            }
            if record.lock.is_some() {
                report.skipped.push(application_id);
                continue;
            }

            let previous_validator = state.validator_reviewer_id.clone();
            dd::expire_if_overdue(state, now);
            match self.repository.update(record) {
                Ok(_) => {
                    info!(%application_id, "validator deadline elapsed; assessment reassigned");
                    let mut notice = WorkflowNotice::new("dd_auto_reassigned", application_id);
                    if let Some(validator) = previous_validator {
                        notice = notice.with("expired_validator", validator);
                    }
                    self.notify(notice);
                    report.reassigned.push(application_id);
                }
                Err(RepositoryError::Conflict) => {
                    warn!(%application_id, "record changed during sweep; left for next run");
                    report.skipped.push(application_id);
                }
                Err(other) => return Err(other.into()),
            }
        }

        Ok(report)
    }

    /// Audit overlay on the due-diligence score. Does not change the workflow status.
    pub fn admin_override_dd_score(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        new_score: f64,
        reason: &str,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::OverrideDueDiligenceScore)?;
        self.mutate_due_diligence(application_id, |state, _, now| {
            dd::override_score(state, &actor.id, new_score, reason, now)
        })
        .inspect(|view| {
            info!(
                %application_id,
                admin = %actor.id,
                new_score,
                original_score = view.due_diligence.original_score.unwrap_or_default(),
                "due-diligence score overridden"
            )
        })
    }

    pub fn recommend_for_due_diligence(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
        justification: &str,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::RecommendDueDiligence)?;
        let mut record = self.load(application_id)?;
        lock::ensure_unlocked(&record)?;

        let now = self.now();
        let created = dd::recommend(&mut record.due_diligence, &actor.id, justification, now)?;
        let stored = self.commit(record)?;

        info!(%application_id, oversight = %actor.id, created, "recommended for due diligence");
        self.notify(
            WorkflowNotice::new("dd_recommended", application_id).with("recommended_by", &actor.id),
        );
        self.view_of(&stored, now)
    }

    pub fn get_due_diligence(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<DueDiligenceView, WorkflowError> {
        authorize(actor, Operation::ViewDueDiligence)?;
        let record = self.load(application_id)?;
        self.view_of(&record, self.now())
    }

    pub fn due_diligence_pool(&self, actor: &Actor) -> Result<Vec<DdPoolEntry>, WorkflowError> {
        authorize(actor, Operation::ClaimDueDiligence)?;

        let mut entries: Vec<DdPoolEntry> = self
            .repository
            .list()?
            .into_iter()
            .filter(|record| !record.is_locked())
            .filter_map(|record| pool_entry(&record))
            .collect();

        entries.sort_by(|a, b| {
            b.is_oversight_initiated
                .cmp(&a.is_oversight_initiated)
                .then(a.submitted_at.cmp(&b.submitted_at))
                .then(a.application_id.cmp(&b.application_id))
        });
        Ok(entries)
    }

    /// Load, lock-check, apply `change` to the existing record, and commit in one write.
    fn mutate_due_diligence<F>(
        &self,
        application_id: ApplicationId,
        change: F,
    ) -> Result<DueDiligenceView, WorkflowError>
    where
        F: FnOnce(&mut DueDiligenceRecord, Track, DateTime<Utc>) -> Result<(), WorkflowError>,
    {
        let mut record = self.load(application_id)?;
        lock::ensure_unlocked(&record)?;

        let now = self.now();
        let track = record.application.track;
        let state = record
            .due_diligence
            .as_mut()
            .ok_or(WorkflowError::DueDiligenceNotFound(application_id))?;
        change(state, track, now)?;

        let stored = self.commit(record)?;
        self.view_of(&stored, now)
    }

    fn view_of(
        &self,
        record: &ApplicationRecord,
        now: DateTime<Utc>,
    ) -> Result<DueDiligenceView, WorkflowError> {
        let application_id = record.application.id;
        let state = record
            .due_diligence
            .clone()
            .ok_or(WorkflowError::DueDiligenceNotFound(application_id))?;

        let item_breakdown = if state.items.is_empty() {
            None
        } else {
            let rubric = self.rubrics.for_track(record.application.track);
            Some(aggregate(rubric, &state.as_item_scores())?)
        };

        Ok(DueDiligenceView {
            application_id,
            track: record.application.track,
            effective_score: state.effective_score(),
            deadline_elapsed: state.deadline_elapsed(now),
            item_breakdown,
            due_diligence: state,
        })
    }
}

fn pool_entry(record: &ApplicationRecord) -> Option<DdPoolEntry> {
    let (dd_status, is_oversight_initiated, prior_feedback) = match &record.due_diligence {
        Some(state) if state.primary_reviewer_id.is_none() && state.status.is_claimable() => (
            state.status,
            state.is_oversight_initiated,
            state
                .validator_comments
                .clone()
                .filter(|_| state.status == DdStatus::Queried),
        ),
        Some(_) => return None,
        // Review-approved applications enter the pool before any record exists.
        None if record.application.status == ApplicationStatus::Approved => {
            (DdStatus::Pending, false, None)
        }
        None => return None,
    };

    Some(DdPoolEntry {
        application_id: record.application.id,
        track: record.application.track,
        review_status: record.application.status,
        dd_status,
        is_oversight_initiated,
        final_review_score: record.outcome.as_ref().map(|outcome| outcome.final_score),
        prior_feedback,
        submitted_at: record.application.submitted_at,
    })
}
