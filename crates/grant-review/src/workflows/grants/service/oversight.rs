use tracing::debug;

use super::super::authorization::Operation;
use super::super::domain::{Actor, ApplicationId};
use super::super::error::WorkflowError;
use super::super::oversight::{assess, EscalationSignal};
use super::super::repository::{ApplicationRepository, NotificationPublisher};
use super::{authorize, GrantReviewService};

impl<R, N> GrantReviewService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn assess_escalation(
        &self,
        application_id: ApplicationId,
        actor: &Actor,
    ) -> Result<EscalationSignal, WorkflowError> {
        authorize(actor, Operation::ViewOversight)?;
        let record = self.load(application_id)?;
        Ok(assess(
            &record,
            self.policy.disparity_threshold,
            self.policy.approval_threshold,
        ))
    }

    /// Applications with at least one escalation reason, widest reviewer disparity first.
    pub fn oversight_queue(&self, actor: &Actor) -> Result<Vec<EscalationSignal>, WorkflowError> {
        authorize(actor, Operation::ViewOversight)?;

        let mut queue: Vec<EscalationSignal> = self
            .repository
            .list()?
            .iter()
            .map(|record| {
                assess(
                    record,
                    self.policy.disparity_threshold,
                    self.policy.approval_threshold,
                )
            })
            .filter(|signal| !signal.reasons.is_empty())
            .collect();

        queue.sort_by(|a, b| {
            let a_gap = a.disparity.unwrap_or_default();
            let b_gap = b.disparity.unwrap_or_default();
            b_gap
                .total_cmp(&a_gap)
                .then(a.application_id.cmp(&b.application_id))
        });
        debug!(entries = queue.len(), "oversight queue assembled");
        Ok(queue)
    }
}
