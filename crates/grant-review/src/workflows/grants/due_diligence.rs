//! Independent on-site verification: claim, primary assessment, validator hand-off,
//! deadline-driven reassignment, and the administrative score overlay.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorId, ApplicationId, CriterionScore};
use super::error::WorkflowError;
use super::scoring::{aggregate, Rubric};

const MIN_PRIMARY_NOTES: usize = 10;
const MIN_VALIDATOR_COMMENTS: usize = 5;
const MIN_OVERRIDE_REASON: usize = 10;
const MIN_OVERSIGHT_JUSTIFICATION: usize = 20;
const PRIMARY_PHASE: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdStatus {
    Pending,
    InProgress,
    AwaitingApproval,
    Approved,
    Queried,
    AutoReassigned,
}

impl DdStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DdStatus::Pending => "pending",
            DdStatus::InProgress => "in_progress",
            DdStatus::AwaitingApproval => "awaiting_approval",
            DdStatus::Approved => "approved",
            DdStatus::Queried => "queried",
            DdStatus::AutoReassigned => "auto_reassigned",
        }
    }

    /// States from which an unowned record may be claimed.
    pub const fn is_claimable(self) -> bool {
        matches!(
            self,
            DdStatus::Pending | DdStatus::Queried | DdStatus::AutoReassigned
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorAction {
    Approved,
    Queried,
}

/// One rubric line item scored during on-site verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdItem {
    pub phase: u8,
    pub category: String,
    pub criterion_id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Due-diligence state for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueDiligenceRecord {
    pub status: DdStatus,
    pub created_at: DateTime<Utc>,

    pub primary_reviewer_id: Option<ActorId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub phase1_score: Option<f64>,
    pub phase1_notes: Option<String>,
    pub primary_reviewed_at: Option<DateTime<Utc>>,
    pub items: Vec<DdItem>,

    pub validator_reviewer_id: Option<ActorId>,
    pub validator_action: Option<ValidatorAction>,
    pub validator_comments: Option<String>,
    pub validator_action_at: Option<DateTime<Utc>>,
    pub approval_deadline: Option<DateTime<Utc>>,

    pub is_oversight_initiated: bool,
    pub oversight_justification: Option<String>,
    pub recommended_by: Option<ActorId>,
    pub recommended_at: Option<DateTime<Utc>>,

    pub final_verdict: Option<ValidatorAction>,
    pub final_reason: Option<String>,

    pub admin_override_score: Option<f64>,
    /// Captured on the first override only.
    pub original_score: Option<f64>,
    pub admin_override_reason: Option<String>,
    pub admin_override_by: Option<ActorId>,
    pub admin_override_at: Option<DateTime<Utc>>,
}

impl DueDiligenceRecord {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            status: DdStatus::Pending,
            created_at,
            primary_reviewer_id: None,
            claimed_at: None,
            phase1_score: None,
            phase1_notes: None,
            primary_reviewed_at: None,
            items: Vec::new(),
            validator_reviewer_id: None,
            validator_action: None,
            validator_comments: None,
            validator_action_at: None,
            approval_deadline: None,
            is_oversight_initiated: false,
            oversight_justification: None,
            recommended_by: None,
            recommended_at: None,
            final_verdict: None,
            final_reason: None,
            admin_override_score: None,
            original_score: None,
            admin_override_reason: None,
            admin_override_by: None,
            admin_override_at: None,
        }
    }

    /// The administrative override when present, otherwise the primary assessment.
    pub fn effective_score(&self) -> Option<f64> {
        self.admin_override_score.or(self.phase1_score)
    }

    pub fn deadline_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == DdStatus::AwaitingApproval
            && self.validator_reviewer_id.is_some()
            && self.approval_deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn as_item_scores(&self) -> Vec<CriterionScore> {
        self.items
            .iter()
            .map(|item| CriterionScore {
                criterion_id: item.criterion_id.clone(),
                score: item.score,
                reviewer_comment: item.comments.clone(),
            })
            .collect()
    }

    fn state_label(&self) -> String {
        format!("due diligence is {}", self.status.label())
    }
}

/// Primary reviewer input for `submit_primary_dd_review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryAssessment {
    pub score: f64,
    pub notes: String,
    #[serde(default)]
    pub items: Vec<CriterionScore>,
}

fn require_min_chars(
    field: &'static str,
    value: &str,
    minimum: usize,
) -> Result<String, WorkflowError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < minimum {
        return Err(WorkflowError::validation(
            field,
            format!("must be at least {minimum} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn require_percentage(field: &'static str, score: f64) -> Result<f64, WorkflowError> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        Ok(score)
    } else {
        Err(WorkflowError::validation(
            field,
            format!("{score} is outside 0..=100"),
        ))
    }
}

fn require_primary(
    dd: &DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
) -> Result<(), WorkflowError> {
    if dd.primary_reviewer_id.as_ref() == Some(actor) {
        Ok(())
    } else {
        Err(WorkflowError::NotOwner {
            application_id,
            actor: actor.clone(),
            assignment: "primary due-diligence reviewer",
        })
    }
}

/// Compare-and-set on the in-memory copy; the repository write repeats the check by version.
pub(crate) fn claim(
    dd: &mut DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if dd.primary_reviewer_id.is_some() || !dd.status.is_claimable() {
        return Err(WorkflowError::AlreadyClaimed(application_id));
    }
    dd.primary_reviewer_id = Some(actor.clone());
    dd.claimed_at = Some(now);
    dd.status = DdStatus::InProgress;
    Ok(())
}

pub(crate) fn release(
    dd: &mut DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
) -> Result<(), WorkflowError> {
    require_primary(dd, application_id, actor)?;

    let releasable = match dd.status {
        DdStatus::InProgress | DdStatus::AutoReassigned => true,
        DdStatus::AwaitingApproval => dd.validator_reviewer_id.is_none(),
        DdStatus::Pending | DdStatus::Approved | DdStatus::Queried => false,
    };
    if !releasable {
        return Err(WorkflowError::invalid_state(
            "release the assessment",
            dd.state_label(),
        ));
    }

    dd.primary_reviewer_id = None;
    dd.claimed_at = None;
    dd.status = DdStatus::Pending;
    Ok(())
}

pub(crate) fn submit_primary(
    dd: &mut DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
    rubric: &Rubric,
    assessment: PrimaryAssessment,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    require_primary(dd, application_id, actor)?;
    if dd.status != DdStatus::InProgress {
        return Err(WorkflowError::invalid_state(
            "submit a primary assessment",
            dd.state_label(),
        ));
    }

    let score = require_percentage("score", assessment.score)?;
    let notes = require_min_chars("notes", &assessment.notes, MIN_PRIMARY_NOTES)?;
    aggregate(rubric, &assessment.items)?;

    let items = assessment
        .items
        .into_iter()
        .map(|entry| {
            let category = rubric
                .criterion(&entry.criterion_id)
                .map(|(category, _)| category.name.clone())
                .unwrap_or_default();
            DdItem {
                phase: PRIMARY_PHASE,
                category,
                criterion_id: entry.criterion_id,
                score: entry.score,
                comments: entry.reviewer_comment,
            }
        })
        .collect();

    dd.phase1_score = Some(score);
    dd.phase1_notes = Some(notes);
    dd.primary_reviewed_at = Some(now);
    dd.items = items;
    dd.status = DdStatus::AwaitingApproval;
    Ok(())
}

pub(crate) fn select_validator(
    dd: &mut DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
    validator: &ActorId,
    eligible_pool: &[ActorId],
    approval_window: Duration,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, WorkflowError> {
    require_primary(dd, application_id, actor)?;

    let selectable = matches!(
        dd.status,
        DdStatus::AwaitingApproval | DdStatus::AutoReassigned
    ) && dd.validator_reviewer_id.is_none()
        && dd.phase1_score.is_some();
    if !selectable {
        return Err(WorkflowError::invalid_state(
            "select a validator",
            match &dd.validator_reviewer_id {
                Some(current) => format!("{current} is already the validator"),
                None => dd.state_label(),
            },
        ));
    }

    if validator == actor {
        return Err(WorkflowError::SelfValidationForbidden);
    }
    if !eligible_pool.contains(validator) {
        return Err(WorkflowError::validation(
            "validator_id",
            format!("{validator} is not in the eligible validator pool"),
        ));
    }

    let deadline = now.checked_add_signed(approval_window).ok_or_else(|| {
        WorkflowError::invalid_state(
            "select a validator",
            "the approval window runs past the supported calendar",
        )
    })?;
    dd.validator_reviewer_id = Some(validator.clone());
    dd.approval_deadline = Some(deadline);
    dd.status = DdStatus::AwaitingApproval;
    Ok(deadline)
}

pub(crate) fn validator_decision(
    dd: &mut DueDiligenceRecord,
    application_id: ApplicationId,
    actor: &ActorId,
    action: ValidatorAction,
    comments: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if dd.validator_reviewer_id.as_ref() != Some(actor) {
        return Err(WorkflowError::NotOwner {
            application_id,
            actor: actor.clone(),
            assignment: "validator",
        });
    }
    if dd.status != DdStatus::AwaitingApproval {
        return Err(WorkflowError::invalid_state(
            "record a validator action",
            dd.state_label(),
        ));
    }
    let comments = require_min_chars("comments", comments, MIN_VALIDATOR_COMMENTS)?;

    dd.validator_action = Some(action);
    dd.validator_action_at = Some(now);
    match action {
        ValidatorAction::Approved => {
            dd.final_verdict = Some(ValidatorAction::Approved);
            dd.final_reason = Some(comments.clone());
            dd.validator_comments = Some(comments);
            dd.status = DdStatus::Approved;
        }
        ValidatorAction::Queried => {
            // Both assignments and the queried assessment clear with the status.
            // Only the validator's feedback carries over to the next claimant.
            dd.validator_comments = Some(comments);
            dd.phase1_score = None;
            dd.phase1_notes = None;
            dd.primary_reviewed_at = None;
            dd.items.clear();
            dd.primary_reviewer_id = None;
            dd.claimed_at = None;
            dd.validator_reviewer_id = None;
            dd.approval_deadline = None;
            dd.status = DdStatus::Queried;
        }
    }
    Ok(())
}

/// Deadline sweep for a single record. Returns whether the record changed.
pub(crate) fn expire_if_overdue(dd: &mut DueDiligenceRecord, now: DateTime<Utc>) -> bool {
    if !dd.deadline_elapsed(now) {
        return false;
    }
    dd.validator_reviewer_id = None;
    dd.status = DdStatus::AutoReassigned;
    true
}

pub(crate) fn override_score(
    dd: &mut DueDiligenceRecord,
    actor: &ActorId,
    new_score: f64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    let new_score = require_percentage("new_score", new_score)?;
    let reason = require_min_chars("reason", reason, MIN_OVERRIDE_REASON)?;

    let phase1_score = dd.phase1_score.ok_or_else(|| {
        WorkflowError::invalid_state("override the score", "no primary assessment exists")
    })?;

    if dd.original_score.is_none() {
        dd.original_score = Some(phase1_score);
    }
    dd.admin_override_score = Some(new_score);
    dd.admin_override_reason = Some(reason);
    dd.admin_override_by = Some(actor.clone());
    dd.admin_override_at = Some(now);
    Ok(())
}

/// Flag for due diligence, creating the record when none exists. Returns whether it was created.
pub(crate) fn recommend(
    slot: &mut Option<DueDiligenceRecord>,
    actor: &ActorId,
    justification: &str,
    now: DateTime<Utc>,
) -> Result<bool, WorkflowError> {
    let justification =
        require_min_chars("justification", justification, MIN_OVERSIGHT_JUSTIFICATION)?;

    let created = slot.is_none();
    let dd = slot.get_or_insert_with(|| DueDiligenceRecord::new(now));
    dd.is_oversight_initiated = true;
    dd.oversight_justification = Some(justification);
    dd.recommended_by = Some(actor.clone());
    dd.recommended_at = Some(now);
    Ok(created)
}
