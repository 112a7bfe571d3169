use crate::config::ServerConfig;
use crate::routes::{self, AppState, UploadLimits};
use crate::store::TaskStore;
use crate::uploads::{UploadStore, UPLOADS_ROUTE};
use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

// multipart framing on top of the file bytes themselves
const BODY_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState, client_origin: Option<&HeaderValue>) -> Router {
    let body_limit = state
        .limits
        .max_files
        .saturating_mul(state.limits.max_file_bytes)
        .saturating_add(BODY_OVERHEAD);
    let cors = match client_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.clone())
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };
    let uploads = ServeDir::new(state.uploads.dir());

    Router::new()
        .route("/health", get(routes::health_handler))
        .route(
            "/tasks",
            get(routes::list_tasks_handler).post(routes::create_task_handler),
        )
        .route(
            "/tasks/{id}",
            get(routes::get_task_handler)
                .patch(routes::update_task_handler)
                .delete(routes::delete_task_handler),
        )
        .route("/tasks/{id}/submissions", post(routes::submit_handler))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
    let store = TaskStore::open(&config.data_file)
        .await
        .with_context(|| format!("opening {}", config.data_file.display()))?;
    let uploads = UploadStore::prepare(&config.upload_dir)
        .await
        .with_context(|| format!("creating {}", config.upload_dir.display()))?;
    let origin = config
        .client_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("client_origin is not a valid header value")?;

    let state = AppState {
        store: Arc::new(store),
        uploads: Arc::new(uploads),
        limits: UploadLimits {
            max_files: config.max_files,
            max_file_bytes: config.max_file_bytes,
        },
    };
    let app = router(state, origin.as_ref());

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
