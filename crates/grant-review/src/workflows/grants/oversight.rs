use serde::{Deserialize, Serialize};

use super::domain::{round1dp, ApplicationId, ApplicationStatus};
use super::due_diligence::DdStatus;
use super::repository::ApplicationRecord;

/// Advisory reasons an application may warrant due diligence. None of these gate a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    ReviewerDisparity { disparity: f64, threshold: f64 },
    LowDueDiligenceScore { score: f64, threshold: f64 },
    OversightFlagged { justification: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSignal {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    pub disparity: Option<f64>,
    pub due_diligence_status: Option<DdStatus>,
    pub due_diligence_score: Option<f64>,
    pub reasons: Vec<EscalationReason>,
    /// True when a reason exists and no due-diligence record has been opened yet.
    pub recommend_due_diligence: bool,
}

/// `|r1 - r2|`, available once both review slots are filled.
pub fn score_disparity(record: &ApplicationRecord) -> Option<f64> {
    match (&record.reviews.primary, &record.reviews.secondary) {
        (Some(primary), Some(secondary)) => Some(round1dp((primary.score - secondary.score).abs())),
        _ => None,
    }
}

pub(crate) fn assess(
    record: &ApplicationRecord,
    disparity_threshold: f64,
    approval_threshold: f64,
) -> EscalationSignal {
    let disparity = score_disparity(record);
    let dd = record.due_diligence.as_ref();
    let dd_score = dd.and_then(|dd| dd.effective_score());

    let mut reasons = Vec::new();
    if let Some(disparity) = disparity.filter(|gap| *gap > disparity_threshold) {
        reasons.push(EscalationReason::ReviewerDisparity {
            disparity,
            threshold: disparity_threshold,
        });
    }
    if let Some(score) = dd_score.filter(|score| *score < approval_threshold) {
        reasons.push(EscalationReason::LowDueDiligenceScore {
            score,
            threshold: approval_threshold,
        });
    }
    if let Some(dd) = dd.filter(|dd| dd.is_oversight_initiated) {
        reasons.push(EscalationReason::OversightFlagged {
            justification: dd.oversight_justification.clone(),
        });
    }

    EscalationSignal {
        application_id: record.application.id,
        status: record.application.status,
        disparity,
        due_diligence_status: dd.map(|dd| dd.status),
        due_diligence_score: dd_score,
        recommend_due_diligence: dd.is_none() && !reasons.is_empty(),
        reasons,
    }
}
