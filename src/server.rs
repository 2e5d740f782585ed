use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    auth::{self, OwnershipResolver},
    config::Config,
    fanout::FanoutChannel,
    handlers::{self, AppState},
    metrics,
    signals::setup_signal_handlers,
    store::CaptureStore,
};

/// Start the capture server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the capture store and runs migrations
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Creates the Axum application
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Arc::new(metrics::init_metrics())
    } else {
        // A detached recorder keeps the /metrics state machinery out of the
        // hot path when metrics are disabled
        Arc::new(PrometheusBuilder::new().build_recorder().handle())
    };

    info!(url = %config.database.url, "Opening capture store...");
    let store = Arc::new(
        CaptureStore::new(&config.database.url, config.database.max_connections).await?,
    );

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState {
        fanout: FanoutChannel::new(store.clone()),
        store,
        ownership: Arc::new(OwnershipResolver::new(config.auth.enabled)),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting hookbin on {}", addr);
    info!(
        "Configuration: auth {}, poll interval {}ms, slug length {}",
        if config.auth.enabled { "enabled" } else { "disabled" },
        config.capture.poll_interval_ms,
        config.capture.slug_length
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    // The ingestion surface is public by design: any sender, any origin, any
    // body size. Capture never rejects on payload size.
    let ingest_routes = Router::new()
        .route(
            "/webhook/:slug",
            get(handlers::ingest::handle_webhook)
                .post(handlers::ingest::handle_webhook)
                .put(handlers::ingest::handle_webhook)
                .patch(handlers::ingest::handle_webhook)
                .delete(handlers::ingest::handle_webhook),
        )
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .with_state(state.clone());

    // Viewer routes require a caller identity
    let viewer_routes = Router::new()
        .route(
            "/api/endpoints",
            get(handlers::endpoints::list_endpoints).post(handlers::endpoints::create_endpoint),
        )
        .route(
            "/api/endpoints/:id",
            get(handlers::endpoints::get_endpoint).delete(handlers::endpoints::delete_endpoint),
        )
        .route(
            "/api/endpoints/:id/webhooks",
            get(handlers::endpoints::list_captures),
        )
        .route(
            "/api/endpoints/:id/events",
            get(handlers::events::stream_events),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::identity_middleware,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/api/session/init", post(handlers::session::init_session))
        .with_state(state.clone());

    let mut app = Router::new()
        .merge(public_routes)
        .merge(ingest_routes)
        .merge(viewer_routes);

    if state.config.metrics.enabled {
        app = app.merge(
            Router::new()
                .route(
                    state.config.metrics.endpoint.as_str(),
                    get(handlers::metrics_handler::metrics),
                )
                .with_state(metrics_handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
}
