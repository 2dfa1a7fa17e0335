use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{Actor, ActorId, ApplicationId, CriterionScore, Role, Track};
use super::due_diligence::{PrimaryAssessment, ValidatorAction};
use super::error::WorkflowError;
use super::repository::{ApplicationRepository, NotificationPublisher, RepositoryError};
use super::review::{ReviewSlot, ReviewSubmission};
use super::service::GrantReviewService;

type SharedService<R, N> = Arc<GrantReviewService<R, N>>;

/// Router builder exposing every review, lock, due-diligence, and oversight operation.
pub fn grant_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/grants/applications", post(register_handler::<R, N>))
        .route(
            "/api/v1/grants/applications/:application_id/reviews",
            get(review_status_handler::<R, N>)
                .post(submit_review_handler::<R, N>)
                .put(revise_review_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/reviews/:slot/scores",
            get(detailed_scores_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/disparity",
            get(disparity_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/lock",
            post(lock_handler::<R, N>).delete(unlock_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence",
            get(due_diligence_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/claim",
            post(claim_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/release",
            post(release_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/primary",
            post(primary_assessment_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/validator",
            post(select_validator_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/validator-action",
            post(validator_action_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/override",
            post(override_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/due-diligence/recommend",
            post(recommend_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/applications/:application_id/escalation",
            get(escalation_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/due-diligence/pool",
            get(pool_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/due-diligence/sweep",
            post(sweep_handler::<R, N>),
        )
        .route(
            "/api/v1/grants/oversight/queue",
            get(oversight_queue_handler::<R, N>),
        )
        .with_state(service)
}

/// Caller identity for read endpoints, resolved upstream by the identity service.
#[derive(Debug, Deserialize)]
pub(crate) struct ActorQuery {
    actor_id: String,
    role: Role,
}

impl ActorQuery {
    fn actor(self) -> Actor {
        Actor::new(self.actor_id, self.role)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorBody {
    actor: Actor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterBody {
    actor: Actor,
    track: Track,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    actor: Actor,
    #[serde(default)]
    detailed_scores: Vec<CriterionScore>,
    #[serde(default)]
    general_notes: String,
}

impl ReviewBody {
    fn split(self) -> (Actor, ReviewSubmission) {
        (
            self.actor,
            ReviewSubmission {
                detailed_scores: self.detailed_scores,
                general_notes: self.general_notes,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReasonBody {
    actor: Actor,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrimaryBody {
    actor: Actor,
    score: f64,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    items: Vec<CriterionScore>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidatorBody {
    actor: Actor,
    validator_id: ActorId,
    #[serde(default)]
    eligible_pool: Vec<ActorId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidatorActionBody {
    actor: Actor,
    action: ValidatorAction,
    #[serde(default)]
    comments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverrideBody {
    actor: Actor,
    new_score: f64,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecommendBody {
    actor: Actor,
    #[serde(default)]
    justification: String,
}

pub(crate) async fn register_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Json(body): Json<RegisterBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.register_application(&body.actor, body.track),
    )
}

pub(crate) async fn submit_review_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ReviewBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let (actor, submission) = body.split();
    respond(
        StatusCode::CREATED,
        service.submit_review(ApplicationId(application_id), &actor, submission),
    )
}

pub(crate) async fn revise_review_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ReviewBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let (actor, submission) = body.split();
    respond(
        StatusCode::OK,
        service.revise_review(ApplicationId(application_id), &actor, submission),
    )
}

pub(crate) async fn review_status_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.get_review_status(ApplicationId(application_id), &query.actor()),
    )
}

pub(crate) async fn detailed_scores_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path((application_id, slot)): Path<(u64, ReviewSlot)>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.get_detailed_scores(ApplicationId(application_id), &query.actor(), slot),
    )
}

pub(crate) async fn disparity_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let application_id = ApplicationId(application_id);
    let threshold = service.policy().disparity_threshold;
    let result = service
        .calculate_score_disparity(application_id)
        .map(|disparity| {
            json!({
                "application_id": application_id,
                "disparity": disparity,
                "exceeds_threshold": disparity.is_some_and(|gap| gap > threshold),
                "threshold": threshold,
            })
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn lock_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ReasonBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.lock_application(ApplicationId(application_id), &body.actor, &body.reason),
    )
}

pub(crate) async fn unlock_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.unlock_application(ApplicationId(application_id), &query.actor()),
    )
}

pub(crate) async fn due_diligence_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.get_due_diligence(ApplicationId(application_id), &query.actor()),
    )
}

pub(crate) async fn claim_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.claim_dd_application(ApplicationId(application_id), &body.actor),
    )
}

pub(crate) async fn release_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ActorBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.release_dd_application(ApplicationId(application_id), &body.actor),
    )
}

pub(crate) async fn primary_assessment_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<PrimaryBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let assessment = PrimaryAssessment {
        score: body.score,
        notes: body.notes,
        items: body.items,
    };
    respond(
        StatusCode::OK,
        service.submit_primary_dd_review(ApplicationId(application_id), &body.actor, assessment),
    )
}

pub(crate) async fn select_validator_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ValidatorBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.select_validator_reviewer(
            ApplicationId(application_id),
            &body.actor,
            &body.validator_id,
            &body.eligible_pool,
        ),
    )
}

pub(crate) async fn validator_action_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<ValidatorActionBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.submit_validator_action(
            ApplicationId(application_id),
            &body.actor,
            body.action,
            &body.comments,
        ),
    )
}

pub(crate) async fn override_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<OverrideBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.admin_override_dd_score(
            ApplicationId(application_id),
            &body.actor,
            body.new_score,
            &body.reason,
        ),
    )
}

pub(crate) async fn recommend_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Json(body): Json<RecommendBody>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.recommend_for_due_diligence(
            ApplicationId(application_id),
            &body.actor,
            &body.justification,
        ),
    )
}

pub(crate) async fn escalation_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(application_id): Path<u64>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.assess_escalation(ApplicationId(application_id), &query.actor()),
    )
}

pub(crate) async fn pool_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.due_diligence_pool(&query.actor()))
}

pub(crate) async fn sweep_handler<R, N>(State(service): State<SharedService<R, N>>) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.sweep_expired_approvals())
}

pub(crate) async fn oversight_queue_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.oversight_queue(&query.actor()))
}

/// Wrap an operation result in the `{success, data | error}` envelope.
fn respond<T: Serialize>(success: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(data) => (success, Json(json!({ "success": true, "data": data }))).into_response(),
        Err(error) => {
            let payload = json!({
                "success": false,
                "error": {
                    "kind": error.kind(),
                    "message": error.to_string(),
                    "field": error.field(),
                },
            });
            (status_for(&error), Json(payload)).into_response()
        }
    }
}

/// HTTP status for a workflow failure.
pub fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation { .. }
        | WorkflowError::InvalidScore(_)
        | WorkflowError::SelfValidationForbidden => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::DuplicateReviewer(_)
        | WorkflowError::ApplicationLocked(_)
        | WorkflowError::AlreadyLocked(_)
        | WorkflowError::AlreadyClaimed(_)
        | WorkflowError::InvalidState { .. }
        | WorkflowError::StaleRecord(_) => StatusCode::CONFLICT,
        WorkflowError::NotOwner { .. } | WorkflowError::NotEligible { .. } => {
            StatusCode::FORBIDDEN
        }
        WorkflowError::ApplicationNotFound(_) | WorkflowError::DueDiligenceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        WorkflowError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        WorkflowError::Repository(RepositoryError::Duplicate) => StatusCode::CONFLICT,
    }
}
