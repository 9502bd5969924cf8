use crate::cli::ServeArgs;
use crate::infra::{
    default_programs, AppState, ConfiguredGateway, InMemoryAcademicRepository,
    InMemoryEligibilityStore, InMemoryOrderRepository, InMemoryProgramCatalog, LoggingNotifier,
};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use edutravel::config::{AppConfig, PaymentConfig};
use edutravel::error::AppError;
use edutravel::telemetry;
use edutravel::workflows::eligibility::EligibilityService;
use edutravel::workflows::payments::{
    PaymentReconciliationService, PaymentSettings, PaystackGateway,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let eligibility_service = Arc::new(EligibilityService::new(
        Arc::new(InMemoryAcademicRepository::default()),
        Arc::new(InMemoryProgramCatalog::new(default_programs())),
        Arc::new(InMemoryEligibilityStore::default()),
        config.eligibility.scoring.clone(),
    ));

    let payment_service = Arc::new(PaymentReconciliationService::new(
        Arc::new(InMemoryOrderRepository::default()),
        Arc::new(configured_gateway(&config.payments)),
        Arc::new(LoggingNotifier::default()),
        PaymentSettings::from_config(&config.payments),
    ));

    let app = with_application_routes(eligibility_service, payment_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "edutravel api ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn configured_gateway(config: &PaymentConfig) -> ConfiguredGateway {
    match PaystackGateway::new(config) {
        Ok(gateway) => ConfiguredGateway::Paystack(gateway),
        Err(err) => {
            warn!(error = %err, "payment gateway disabled; verification and webhooks will fail");
            ConfiguredGateway::Disabled
        }
    }
}
