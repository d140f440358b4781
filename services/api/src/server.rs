use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use techdesk::config::{AppConfig, ServerConfig};
use techdesk::error::AppError;
use techdesk::telemetry;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{seeded_helpdesk, AppState};
use crate::routes::with_operational_routes;

/// Command-line flags take precedence over `APP_HOST` / `APP_PORT`.
fn apply_overrides(server: &mut ServerConfig, args: &ServeArgs) {
    if let Some(host) = &args.host {
        server.host = host.clone();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
}

pub(crate) async fn run(args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    apply_overrides(&mut config.server, &args);
    telemetry::init(&config.telemetry)?;

    let seeded = seeded_helpdesk(&config.helpdesk, !args.no_demo_tickets)?;
    info!(
        tickets = seeded.tickets_seeded,
        accounts = seeded.catalog.users.len(),
        creation_policy = %config.helpdesk.creation_policy,
        "demo helpdesk seeded"
    );

    let (metric_layer, metric_handle) = PrometheusMetricLayer::pair();
    let ready = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: Arc::clone(&ready),
        metrics: Arc::new(metric_handle),
    };
    let app = with_operational_routes(seeded.state)
        .layer(Extension(state))
        .layer(metric_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    ready.store(true, Ordering::Release);
    info!(environment = ?config.environment, %addr, "helpdesk listening");

    axum::serve(listener, app).await?;
    Ok(())
}
