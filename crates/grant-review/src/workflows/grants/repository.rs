use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationId};
use super::due_diligence::DueDiligenceRecord;
use super::lock::LockInfo;
use super::review::{FinalReviewOutcome, ReviewSlots};

/// One application with everything the workflows mutate. Persisted and replaced as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub reviews: ReviewSlots,
    /// Cached result of the transition that filled (or revised) the second slot.
    pub outcome: Option<FinalReviewOutcome>,
    pub lock: Option<LockInfo>,
    pub due_diligence: Option<DueDiligenceRecord>,
    /// Optimistic-concurrency token; bumped by every successful `update`.
    pub version: u64,
}

impl ApplicationRecord {
    pub fn new(application: Application) -> Self {
        Self {
            application,
            reviews: ReviewSlots::default(),
            outcome: None,
            lock: None,
            due_diligence: None,
            version: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }
}

/// Storage abstraction. `update` must be a conditional write: it succeeds only when the
/// stored version equals `record.version`, and returns the record carrying the next version.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Duplicate,
    #[error("record changed since it was read")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook for the notification collaborator (e-mail, dashboards).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: WorkflowNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowNotice {
    pub template: String,
    pub application_id: ApplicationId,
    pub details: BTreeMap<String, String>,
}

impl WorkflowNotice {
    pub fn new(template: &str, application_id: ApplicationId) -> Self {
        Self {
            template: template.to_string(),
            application_id,
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
