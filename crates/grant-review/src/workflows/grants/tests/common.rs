use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::grants::domain::{Actor, ActorId, ApplicationId, CriterionScore, Role, Track};
use crate::workflows::grants::due_diligence::PrimaryAssessment;
use crate::workflows::grants::repository::{
    ApplicationRecord, ApplicationRepository, NotificationError, NotificationPublisher,
    RepositoryError, WorkflowNotice,
};
use crate::workflows::grants::review::ReviewSubmission;
use crate::workflows::grants::scoring::{Criterion, Rubric, RubricCategory, RubricConfig};
use crate::workflows::grants::service::{Clock, GrantReviewService, ReviewPolicy};

pub(super) type TestService = GrantReviewService<MemoryRepository, MemoryNotifier>;

fn criterion(id: &str, label: &str, max_points: f64) -> Criterion {
    Criterion {
        id: id.to_string(),
        label: label.to_string(),
        max_points,
    }
}

/// Foundation: five criteria of 20 points. Acceleration: four criteria of 25 points.
pub(super) fn rubric_config() -> RubricConfig {
    let foundation = Rubric {
        track: Track::Foundation,
        categories: vec![
            RubricCategory {
                name: "Impact".to_string(),
                criteria: vec![
                    criterion("fdn_reach", "Community reach", 20.0),
                    criterion("fdn_outcomes", "Measurable outcomes", 20.0),
                ],
            },
            RubricCategory {
                name: "Feasibility".to_string(),
                criteria: vec![
                    criterion("fdn_plan", "Delivery plan", 20.0),
                    criterion("fdn_team", "Team capacity", 20.0),
                ],
            },
            RubricCategory {
                name: "Budget".to_string(),
                criteria: vec![criterion("fdn_budget", "Budget realism", 20.0)],
            },
        ],
    };
    let acceleration = Rubric {
        track: Track::Acceleration,
        categories: vec![
            RubricCategory {
                name: "Traction".to_string(),
                criteria: vec![
                    criterion("acc_revenue", "Revenue", 25.0),
                    criterion("acc_growth", "Growth", 25.0),
                ],
            },
            RubricCategory {
                name: "Scale".to_string(),
                criteria: vec![
                    criterion("acc_market", "Market size", 25.0),
                    criterion("acc_ops", "Operational readiness", 25.0),
                ],
            },
        ],
    };
    RubricConfig::new(vec![foundation, acceleration]).expect("fixture rubric is valid")
}

/// Criterion scores for `track` that sum to `total`, filling criteria in rubric order.
pub(super) fn scores_totalling(track: Track, total: f64) -> Vec<CriterionScore> {
    let config = rubric_config();
    let mut remaining = total;
    config
        .for_track(track)
        .criteria()
        .map(|(_, criterion)| {
            let score = remaining.min(criterion.max_points).max(0.0);
            remaining -= score;
            CriterionScore::new(criterion.id.clone(), score)
        })
        .collect()
}

pub(super) fn submission(total: f64) -> ReviewSubmission {
    ReviewSubmission {
        detailed_scores: scores_totalling(Track::Foundation, total),
        general_notes: format!("Scored {total} against the foundation rubric."),
    }
}

pub(super) fn assessment(score: f64) -> PrimaryAssessment {
    PrimaryAssessment {
        score,
        notes: "Site visit confirmed delivery partners.".to_string(),
        items: Vec::new(),
    }
}

pub(super) fn reviewer1() -> Actor {
    Actor::new("r1-amara", Role::Reviewer1)
}

pub(super) fn reviewer2() -> Actor {
    Actor::new("r2-bongani", Role::Reviewer2)
}

pub(super) fn technical(id: &str) -> Actor {
    Actor::new(id, Role::TechnicalReviewer)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-kea", Role::Admin)
}

pub(super) fn oversight() -> Actor {
    Actor::new("oversight-lindiwe", Role::Oversight)
}

pub(super) fn applicant() -> Actor {
    Actor::new("applicant-ngozi", Role::Applicant)
}

pub(super) fn validator_pool() -> Vec<ActorId> {
    vec![ActorId::new("tech-validator"), ActorId::new("tech-primary")]
}

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: ApplicationId) -> ApplicationRecord {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(&id)
            .cloned()
            .expect("record present")
    }

    /// Bump the stored version behind the service's back to simulate a concurrent writer.
    pub(super) fn touch(&self, id: ApplicationId) {
        self.touch_with(id, |_| {});
    }

    /// Apply `edit` to the stored record and bump its version, as another writer would.
    pub(super) fn touch_with(&self, id: ApplicationId, edit: impl FnOnce(&mut ApplicationRecord)) {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if let Some(record) = guard.get_mut(&id) {
            edit(record);
            record.version += 1;
        }
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.application.id) {
            return Err(RepositoryError::Duplicate);
        }
        guard.insert(record.application.id, record.clone());
        Ok(record)
    }

    fn update(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let current = guard
            .get(&record.application.id)
            .ok_or(RepositoryError::NotFound)?;
        if current.version != record.version {
            return Err(RepositoryError::Conflict);
        }
        record.version += 1;
        guard.insert(record.application.id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.application.id);
        Ok(records)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    notices: Arc<Mutex<Vec<WorkflowNotice>>>,
    failing: bool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        Self {
            notices: Arc::default(),
            failing: true,
        }
    }

    pub(super) fn notices(&self) -> Vec<WorkflowNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn templates(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .map(|notice| notice.template)
            .collect()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notice: WorkflowNotice) -> Result<(), NotificationError> {
        if self.failing {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

type ForeignWrite = Box<dyn FnOnce(&mut ApplicationRecord) + Send>;

/// Once armed, lets exactly one foreign write land between the service's read and its update.
#[derive(Default)]
pub(super) struct InterleavedRepository {
    pub(super) inner: MemoryRepository,
    armed: Mutex<Option<ForeignWrite>>,
}

impl InterleavedRepository {
    /// The foreign write only bumps the version.
    pub(super) fn arm(&self) {
        self.arm_with(|_| {});
    }

    pub(super) fn arm_with(&self, edit: impl FnOnce(&mut ApplicationRecord) + Send + 'static) {
        *self.armed.lock().expect("interleave mutex poisoned") = Some(Box::new(edit));
    }
}

impl ApplicationRepository for InterleavedRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let pending = self.armed.lock().expect("interleave mutex poisoned").take();
        if let Some(edit) = pending {
            self.inner.touch_with(record.application.id, edit);
        }
        self.inner.update(record)
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifier: Arc<MemoryNotifier>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(MemoryNotifier::default())
}

pub(super) fn harness_with(notifier: MemoryNotifier) -> Harness {
    build_harness(notifier, ReviewPolicy::default())
}

pub(super) fn harness_with_policy(policy: ReviewPolicy) -> Harness {
    build_harness(MemoryNotifier::default(), policy)
}

fn build_harness(notifier: MemoryNotifier, policy: ReviewPolicy) -> Harness {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(notifier);
    let clock = Arc::new(ManualClock::new(start_time()));
    let service = GrantReviewService::new(
        repository.clone(),
        notifier.clone(),
        rubric_config(),
        policy,
    )
    .with_clock(clock.clone());
    Harness {
        service,
        repository,
        notifier,
        clock,
    }
}

impl Harness {
    pub(super) fn register(&self) -> ApplicationId {
        self.service
            .register_application(&applicant(), Track::Foundation)
            .expect("register application")
            .application
            .id
    }

    /// A foundation application with both reviews in.
    pub(super) fn reviewed(&self, primary: f64, secondary: f64) -> ApplicationId {
        let id = self.register();
        self.service
            .submit_review(id, &reviewer1(), submission(primary))
            .expect("primary review");
        self.service
            .submit_review(id, &reviewer2(), submission(secondary))
            .expect("senior review");
        id
    }

    /// Review-approved application whose due diligence has been claimed by `tech-primary`.
    pub(super) fn claimed(&self) -> ApplicationId {
        let id = self.reviewed(80.0, 76.0);
        self.service
            .claim_dd_application(id, &technical("tech-primary"))
            .expect("claim due diligence");
        id
    }

    /// Primary assessment submitted and validator `tech-validator` assigned.
    pub(super) fn awaiting_validator(&self) -> ApplicationId {
        let id = self.claimed();
        let primary = technical("tech-primary");
        self.service
            .submit_primary_dd_review(id, &primary, assessment(74.0))
            .expect("primary assessment");
        self.service
            .select_validator_reviewer(
                id,
                &primary,
                &ActorId::new("tech-validator"),
                &validator_pool(),
            )
            .expect("select validator");
        id
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_error_kind(payload: &Value, status: StatusCode, expected: StatusCode, kind: &str) {
    assert_eq!(status, expected, "unexpected status for {payload}");
    assert_eq!(payload["success"], Value::Bool(false));
    assert_eq!(payload["error"]["kind"], kind);
}
