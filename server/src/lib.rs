use std::{path::Path, path::PathBuf, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use utoipa::OpenApi;

pub mod config;
pub mod content;
pub mod content_type;
pub mod digest;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod registry;
pub mod sqlite;
pub mod stats;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::Config;
use crate::domain::Storage;
use crate::error::DedupResult;
use crate::sqlite::{Mode, Sqlite};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Room for multipart framing on top of the payload limit.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub struct AppState {
    db: PathBuf,
    max_upload_size: u64,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_files,
        handlers::upload_files,
        handlers::upload_file,
        handlers::get_file_content,
        handlers::get_file_info,
        handlers::delete_file,
        handlers::get_content,
        handlers::get_stats,
    ),
    components(schemas(
        kernel::FileRecord,
        kernel::ContentEntry,
        kernel::UploadResult,
        kernel::DeleteResult,
        kernel::StorageStats,
        kernel::SortOrder,
    )),
    tags(
        (name = "files", description = "Upload, list, download and delete files"),
        (name = "contents", description = "Deduplicated content entries"),
        (name = "stats", description = "Deduplication statistics"),
    )
)]
pub struct ApiDoc;

pub async fn run() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "dstore=debug,server=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // Start init
    let db = config.db_path();
    if let Err(e) = init_database(&db) {
        tracing::error!("database {} cannot be initialized: {e}", db.display());
        return;
    }

    let socket: SocketAddr = match format!("0.0.0.0:{}", config.port).parse() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("invalid port '{}': {e}", config.port);
            return;
        }
    };
    let listener = match tokio::net::TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("cannot listen on {socket}: {e}");
            return;
        }
    };
    tracing::debug!("listening on {socket}");
    tracing::debug!(
        "database: {} max upload size: {}",
        db.display(),
        config.max_upload_size
    );

    let app = create_routes(&config);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
    }
}

/// Creates the database file and schema unless they already exist.
pub fn init_database(db: &Path) -> DedupResult<()> {
    Sqlite::open(db, Mode::ReadWrite)?.new_database()
}

pub fn create_routes(config: &Config) -> Router {
    let state = Arc::new(AppState {
        db: config.db_path(),
        max_upload_size: config.max_upload_size,
    });
    let body_limit = config.max_upload_size.saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/api/files",
            get(handlers::list_files).post(handlers::upload_files),
        )
        .route("/api/upload/:name", post(handlers::upload_file))
        .route(
            "/api/files/:id",
            get(handlers::get_file_content).delete(handlers::delete_file),
        )
        .route("/api/files/:id/meta", get(handlers::get_file_info))
        .route("/api/contents/:fingerprint", get(handlers::get_content))
        .route("/api/stats", get(handlers::get_stats))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(body_limit))
                .into_inner(),
        )
        .with_state(state)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
