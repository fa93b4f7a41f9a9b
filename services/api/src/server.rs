use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryRequestStore, OutboxNotifier};
use crate::routes::{with_leave_routes, with_outbox_route};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use leave_approval::config::{AppConfig, AppEnvironment};
use leave_approval::error::AppError;
use leave_approval::telemetry;
use leave_approval::workflows::leave::{
    InProcessEngine, JwtAuthority, LeaveApi, LeaveApprovalWorkflow,
};
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

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryRequestStore::default());
    let outbox = OutboxNotifier::default();
    let workflow = LeaveApprovalWorkflow::new(
        store.clone(),
        Arc::new(outbox.clone()),
        config.approval.sender_email.clone(),
    );
    let (engine, driver) = InProcessEngine::new(workflow, config.approval.max_step_attempts);
    tokio::spawn(driver.run());

    let api = Arc::new(LeaveApi::new(
        store,
        Arc::new(JwtAuthority::new(&config.approval.jwt_secret)),
        engine,
        config.approval.public_base_url.clone(),
    ));

    let mut app = with_leave_routes(api);
    if config.environment == AppEnvironment::Development {
        app = with_outbox_route(app, outbox);
    }
    let app = app.layer(Extension(app_state)).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        public_base_url = %config.approval.public_base_url,
        max_step_attempts = config.approval.max_step_attempts,
        "leave approval service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
