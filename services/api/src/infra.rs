use grant_review::error::AppError;
use grant_review::workflows::grants::{
    ApplicationId, ApplicationRecord, ApplicationRepository, NotificationError,
    NotificationPublisher, RepositoryError, RubricConfig, RubricImporter, WorkflowNotice,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const DEFAULT_RUBRIC_CSV: &str = include_str!("../config/default_rubric.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local store. `update` only lands when the caller's version matches the stored one.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl InMemoryApplicationRepository {
    fn records(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ApplicationId, ApplicationRecord>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records()?;
        if guard.contains_key(&record.application.id) {
            return Err(RepositoryError::Duplicate);
        }
        guard.insert(record.application.id, record.clone());
        Ok(record)
    }

    fn update(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records()?;
        let stored = guard
            .get(&record.application.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != record.version {
            return Err(RepositoryError::Conflict);
        }
        record.version += 1;
        guard.insert(record.application.id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.records()?.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let mut records: Vec<_> = self.records()?.values().cloned().collect();
        records.sort_by_key(|record| record.application.id);
        Ok(records)
    }
}

/// Keeps every notice and mirrors it to the log; stands in for the e-mail collaborator.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationPublisher {
    sent: Arc<Mutex<Vec<WorkflowNotice>>>,
}

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, notice: WorkflowNotice) -> Result<(), NotificationError> {
        info!(
            template = %notice.template,
            application_id = %notice.application_id,
            details = ?notice.details,
            "workflow notice dispatched"
        );
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox mutex poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}

impl LoggingNotificationPublisher {
    pub(crate) fn sent(&self) -> Vec<WorkflowNotice> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Rubric bundled with the binary, used when no `GRANT_RUBRIC_PATH` is configured.
pub(crate) fn default_rubric() -> Result<RubricConfig, AppError> {
    Ok(RubricImporter::from_reader(DEFAULT_RUBRIC_CSV.as_bytes())?)
}

pub(crate) fn load_rubrics(path: Option<&Path>) -> Result<RubricConfig, AppError> {
    match path {
        Some(path) => {
            let rubrics = RubricImporter::from_path(path)?;
            info!(path = %path.display(), "rubric loaded from file");
            Ok(rubrics)
        }
        None => default_rubric(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use grant_review::workflows::grants::{Application, ApplicationStatus, Track};

    fn record(id: u64) -> ApplicationRecord {
        ApplicationRecord::new(Application {
            id: ApplicationId(id),
            track: Track::Foundation,
            status: ApplicationStatus::Submitted,
            submitted_at: Utc::now(),
        })
    }

    #[test]
    fn bundled_rubric_covers_both_tracks() {
        let rubrics = default_rubric().expect("bundled rubric parses");
        assert_eq!(rubrics.for_track(Track::Foundation).max_total(), 100.0);
        assert_eq!(rubrics.for_track(Track::Acceleration).max_total(), 100.0);
    }

    #[test]
    fn update_rejects_a_stale_version() {
        let repository = InMemoryApplicationRepository::default();
        let original = repository.insert(record(7)).expect("insert");

        let first = repository.update(original.clone()).expect("first write");
        assert_eq!(first.version, 1);
        assert!(matches!(
            repository.update(original),
            Err(RepositoryError::Conflict)
        ));
        assert!(matches!(
            repository.insert(record(7)),
            Err(RepositoryError::Duplicate)
        ));
    }

    #[test]
    fn update_of_an_unknown_record_is_not_found() {
        let repository = InMemoryApplicationRepository::default();
        assert!(matches!(
            repository.update(record(99)),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn publisher_keeps_what_it_sends() {
        let publisher = LoggingNotificationPublisher::default();
        publisher
            .publish(WorkflowNotice::new("dd_approved", ApplicationId(3)).with("score", 81))
            .expect("publish");

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].details.get("score").map(String::as_str), Some("81"));
    }
}
