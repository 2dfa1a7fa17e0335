use crate::cli::ServeArgs;
use crate::infra::{
    load_rubrics, AppState, InMemoryApplicationRepository, LoggingNotificationPublisher,
};
use crate::routes::with_grant_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use grant_review::config::AppConfig;
use grant_review::error::AppError;
use grant_review::telemetry;
use grant_review::workflows::grants::{
    ApplicationRepository, GrantReviewService, NotificationPublisher,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let rubrics = load_rubrics(config.workflow.rubric_path.as_deref())?;
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let notifier = Arc::new(LoggingNotificationPublisher::default());
    let grant_service = Arc::new(GrantReviewService::new(
        repository,
        notifier,
        rubrics,
        config.workflow.review_policy(),
    ));

    spawn_approval_sweep(
        grant_service.clone(),
        Duration::from_secs(config.workflow.dd_sweep_interval_secs),
    );

    let app = with_grant_routes(grant_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "grant review service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically returns overdue validator assignments to the claim pool.
fn spawn_approval_sweep<R, N>(service: Arc<GrantReviewService<R, N>>, every: Duration)
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately; skip it so startup is not a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.sweep_expired_approvals() {
                Ok(report) if report.reassigned.is_empty() && report.skipped.is_empty() => {
                    debug!("approval sweep found nothing overdue");
                }
                Ok(report) => info!(
                    reassigned = report.reassigned.len(),
                    skipped = report.skipped.len(),
                    "approval sweep completed"
                ),
                Err(error) => warn!(%error, "approval sweep failed"),
            }
        }
    });
}
