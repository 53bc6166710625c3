use crate::cli::ServeArgs;
use crate::infra::{load_registry, AppState, InMemoryAttendanceRepository, LoggingNotificationPublisher};
use crate::routes::with_attendance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use geoattend::config::AppConfig;
use geoattend::error::AppError;
use geoattend::telemetry;
use geoattend::workflows::attendance::AttendanceService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let registry = Arc::new(load_registry(&config.registry)?);
    let repository = Arc::new(InMemoryAttendanceRepository::default());
    let notifications = Arc::new(LoggingNotificationPublisher::default());
    let attendance_service = Arc::new(AttendanceService::new(
        registry,
        repository,
        notifications,
        config.attendance.clone(),
    ));

    let app = with_attendance_routes(attendance_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        tolerance_before_minutes = config.attendance.tolerance_before_minutes,
        late_grace_minutes = config.attendance.late_grace_minutes,
        "attendance service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
