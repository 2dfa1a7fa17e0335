mod due_diligence;
mod oversight;
mod review;

pub use due_diligence::{DdPoolEntry, DueDiligenceView, SweepReport};
pub use review::ReviewReceipt;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::authorization::{is_eligible, Operation};
use super::domain::{Actor, Application, ApplicationId, ApplicationStatus, Track};
use super::error::WorkflowError;
use super::repository::{
    ApplicationRecord, ApplicationRepository, NotificationPublisher, RepositoryError,
    WorkflowNotice,
};
use super::scoring::RubricConfig;

/// Source of "now" for timestamps and deadlines.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decision thresholds and the validator SLA.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPolicy {
    pub approval_threshold: f64,
    pub disparity_threshold: f64,
    pub dd_approval_window: Duration,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            approval_threshold: 70.0,
            disparity_threshold: 10.0,
            dd_approval_window: Duration::hours(72),
        }
    }
}

/// Service composing the repository, rubric configuration, and both workflows.
pub struct GrantReviewService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    rubrics: Arc<RubricConfig>,
    policy: ReviewPolicy,
    clock: Arc<dyn Clock>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    ApplicationId(APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

impl<R, N> GrantReviewService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        rubrics: RubricConfig,
        policy: ReviewPolicy,
    ) -> Self {
        Self {
            repository,
            notifier,
            rubrics: Arc::new(rubrics),
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &ReviewPolicy {
        &self.policy
    }

    pub fn rubrics(&self) -> &RubricConfig {
        &self.rubrics
    }

    /// Accept an application handed over by intake.
    pub fn register_application(
        &self,
        actor: &Actor,
        track: Track,
    ) -> Result<ApplicationRecord, WorkflowError> {
        authorize(actor, Operation::RegisterApplication)?;

        let record = ApplicationRecord::new(Application {
            id: next_application_id(),
            track,
            status: ApplicationStatus::Submitted,
            submitted_at: self.now(),
        });
        let stored = self.repository.insert(record)?;
        info!(
            application_id = %stored.application.id,
            track = track.label(),
            "application registered for review"
        );
        Ok(stored)
    }

    fn load(&self, application_id: ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.repository
            .fetch(application_id)?
            .ok_or(WorkflowError::ApplicationNotFound(application_id))
    }

    /// Conditional write of a mutated copy. A lost race surfaces as `StaleRecord`.
    fn commit(&self, record: ApplicationRecord) -> Result<ApplicationRecord, WorkflowError> {
        let application_id = record.application.id;
        match self.repository.update(record) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict) => {
                warn!(%application_id, "concurrent modification rejected");
                Err(WorkflowError::StaleRecord(application_id))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Notices go out after commit; a failed send never undoes a transition.
    fn notify(&self, notice: WorkflowNotice) {
        let template = notice.template.clone();
        let application_id = notice.application_id;
        if let Err(err) = self.notifier.publish(notice) {
            warn!(
                %application_id,
                template = %template,
                error = %err,
                "workflow notice not delivered"
            );
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn authorize(actor: &Actor, operation: Operation) -> Result<(), WorkflowError> {
    if is_eligible(actor.role, operation) {
        Ok(())
    } else {
        Err(WorkflowError::NotEligible {
            role: actor.role,
            operation,
        })
    }
}
