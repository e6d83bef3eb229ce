use crate::analytics::Analytics;
use crate::config::Config;
use crate::conversion::{BoundedJobCache, CommandConverter, JobCache, Orchestrator, PageConverter};
use crate::retention::start_retention_task;
use anyhow::{Context, Result};
use axum::{response::IntoResponse, routing::get, Json, Router};
use readly_db::pool::DbPool;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod error;
pub mod routes_admin;
pub mod routes_convert;
pub mod routes_download;
pub mod routes_jobs;

use auth::AdminGuard;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
    pub analytics: Analytics,
    pub admin: AdminGuard,
}

impl AppContext {
    /// Wire the service around a converter and a fast-path cache.
    pub fn new(
        config: Config,
        pool: DbPool,
        converter: Arc<dyn PageConverter>,
        cache: Arc<dyn JobCache>,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            pool.clone(),
            converter,
            cache,
            config.rate_limit.max_per_day,
            config.storage.artifact_dir(),
        );

        Self {
            analytics: Analytics::new(pool.clone(), config.analytics.utc_offset_hours),
            admin: AdminGuard::new(config.admin.password.clone()),
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            pool,
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_convert::convert_routes())
        .merge(routes_jobs::jobs_routes())
        .merge(routes_download::download_routes())
        .merge(routes_admin::admin_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Start the HTTP server and the retention task
pub async fn start_server(config: Config, pool: DbPool) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let artifact_dir = config.storage.artifact_dir();
    std::fs::create_dir_all(&artifact_dir)
        .with_context(|| format!("Failed to create artifact directory: {:?}", artifact_dir))?;

    let retention = config.retention.enabled.then(|| {
        tracing::info!(
            "Retention enabled: deleting conversions older than {} days every {}s",
            config.retention.max_age_days,
            config.retention.interval_secs
        );
        start_retention_task(pool.clone(), config.retention.clone())
    });

    let converter = Arc::new(CommandConverter::from_config(&config.converter));
    let cache = Arc::new(BoundedJobCache::new(config.cache.max_entries));
    let ctx = AppContext::new(config, pool, converter, cache);

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = retention {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
