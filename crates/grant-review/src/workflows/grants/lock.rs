use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ActorId;
use super::error::WorkflowError;
use super::repository::ApplicationRecord;

/// Administrative freeze over a decided application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub locked_by: ActorId,
    pub locked_at: DateTime<Utc>,
    pub reason: String,
}

/// Reject any mutation of a locked record before it touches state.
pub(crate) fn ensure_unlocked(record: &ApplicationRecord) -> Result<(), WorkflowError> {
    if record.is_locked() {
        Err(WorkflowError::ApplicationLocked(record.application.id))
    } else {
        Ok(())
    }
}

pub(crate) fn lock(
    record: &mut ApplicationRecord,
    actor: &ActorId,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<LockInfo, WorkflowError> {
    if record.is_locked() {
        return Err(WorkflowError::AlreadyLocked(record.application.id));
    }
    if !record.application.status.is_terminal() {
        return Err(WorkflowError::invalid_state(
            "lock the application",
            format!("its status is {}", record.application.status),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WorkflowError::validation("reason", "a lock reason is required"));
    }

    let info = LockInfo {
        locked_by: actor.clone(),
        locked_at: now,
        reason: reason.to_string(),
    };
    record.lock = Some(info.clone());
    Ok(info)
}

pub(crate) fn unlock(record: &mut ApplicationRecord) -> Result<LockInfo, WorkflowError> {
    record.lock.take().ok_or_else(|| {
        WorkflowError::invalid_state("unlock the application", "it is not locked")
    })
}
