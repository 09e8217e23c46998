#![allow(clippy::unused_async)]
use crate::digest::{Capture, Captured};
use crate::domain::{StagedUpload, Storage};
use crate::error::{DedupError, DedupResult};
use crate::file_reply::FileReply;
use crate::sqlite::{Mode, Sqlite};
use crate::AppState;
use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use kernel::{ContentEntry, DeleteResult, FileFilter, FileRecord, StorageStats, UploadResult};
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Lists files matching the filter, newest first
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(FileFilter),
    responses(
        (status = 200, description = "Matching files", body = [FileRecord]),
        (status = 500, description = "Server error", body = String)
    ),
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FileFilter>,
) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.list_files(&filter)
    })
    .await;
    make_response(result.map(Json), StatusCode::OK)
}

/// Uploads every `file` part of a multipart form, all or none.
///
/// A text part called `name` renames the upload when the form carries exactly one file.
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "files",
    request_body(content = String, content_type = "multipart/form-data", description = "`file` parts and an optional `name` part"),
    responses(
        (status = 201, description = "Files uploaded", body = [UploadResult]),
        (status = 400, description = "No file in the form", body = String),
        (status = 413, description = "A file exceeds the upload limit", body = String),
        (status = 500, description = "Server error", body = String)
    ),
)]
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut parts: Vec<StagedUpload> = Vec::new();
    let mut rename: Option<String> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("multipart error: {e}");
                return (StatusCode::BAD_REQUEST, e.to_string().into_response());
            }
        };

        if field.name() == Some("name") {
            match field.text().await {
                Ok(text) if !text.trim().is_empty() => rename = Some(text.trim().to_owned()),
                Ok(_) => {}
                Err(e) => return (StatusCode::BAD_REQUEST, e.to_string().into_response()),
            }
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content_type_hint = field.content_type().map(str::to_owned);
        match capture_field(&mut field, state.max_upload_size).await {
            Ok(captured) => parts.push(StagedUpload {
                name,
                content_type_hint,
                captured,
            }),
            Err(e) => {
                tracing::error!("file '{name}' not uploaded. Error: {e}");
                return error_response(&e);
            }
        }
    }

    if parts.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "No file provided".to_owned().into_response(),
        );
    }
    if let (Some(name), [part]) = (rename, parts.as_mut_slice()) {
        part.name = name;
    }

    let result = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.upload_batch(parts)
    })
    .await;
    if let Ok(uploaded) = &result {
        uploaded.iter().for_each(log_uploaded);
    }
    make_response(result.map(Json), StatusCode::CREATED)
}

/// Hashes and spools a multipart field chunk by chunk.
async fn capture_field(field: &mut Field<'_>, limit: u64) -> DedupResult<Captured> {
    let mut capture = Capture::new(limit);
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| DedupError::Read(io::Error::other(e)))?
    {
        if capture.is_spilled() {
            // Spooling to disk blocks.
            capture = tokio::task::spawn_blocking(move || capture.update(&chunk).map(|()| capture))
                .await
                .map_err(|e| DedupError::StorageIo(io::Error::other(e)))??;
        } else {
            capture.update(&chunk)?;
        }
    }
    capture.finish()
}

/// Uploads the raw request body as a single file.
#[utoipa::path(
    post,
    path = "/api/upload/{name}",
    tag = "files",
    request_body(content = String, content_type = "application/octet-stream", description = "Raw file bytes, `Content-Type` is used as the type hint"),
    responses(
        (status = 201, description = "File uploaded", body = UploadResult),
        (status = 413, description = "File exceeds the upload limit", body = String),
        (status = 500, description = "Server error", body = String)
    ),
    params(
        ("name" = String, Path, description = "File name")
    ),
)]
pub async fn upload_file(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> impl IntoResponse {
    let hint = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let stream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    let reader = StreamReader::new(stream);

    let result = execute(&state, Mode::ReadWrite, move |mut repository| {
        // Bridges the async body into the blocking store without buffering it.
        let mut reader = SyncIoBridge::new(reader);
        let upload = repository.upload(&name, hint.as_deref(), &mut reader);
        log_upload_result(upload, &name)
    })
    .await;
    make_response(result.map(Json), StatusCode::CREATED)
}

/// Gets file binary content by file id
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    responses(
        (status = 200, description = "File binary content", content_type = "application/octet-stream"),
        (status = 404, description = "File not found", body = String)
    ),
    params(
        ("id" = i64, Path, description = "File id")
    ),
)]
pub async fn get_file_content(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        let info = repository.get_file_info(id)?;
        let capacity = usize::try_from(info.size).unwrap_or_default();
        let mut content = Vec::<u8>::with_capacity(capacity);
        repository
            .get_file_data(id)?
            .read_to_end(&mut content)
            .map_err(DedupError::StorageIo)?;
        tracing::info!("file: {} read: {}", id, content.len());
        Ok(FileReply::new(content, info))
    })
    .await;
    make_response(result, StatusCode::OK)
}

/// Gets file's information by file id
#[utoipa::path(
    get,
    path = "/api/files/{id}/meta",
    tag = "files",
    responses(
        (status = 200, body = FileRecord),
        (status = 404, description = "File not found", body = String)
    ),
    params(
        ("id" = i64, Path, description = "File id")
    ),
)]
pub async fn get_file_info(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.get_file_info(id)
    })
    .await;
    make_response(result.map(Json), StatusCode::OK)
}

/// Deletes file by id, purging its content when no other file references it
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    responses(
        (status = 200, description = "File successfully deleted", body = DeleteResult),
        (status = 404, description = "File not found", body = String)
    ),
    params(
        ("id" = i64, Path, description = "File id")
    ),
)]
pub async fn delete_file(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadWrite, move |mut repository| {
        repository.delete_file(id)
    })
    .await;
    make_response(result.map(Json), StatusCode::OK)
}

/// Gets stored content information by fingerprint
#[utoipa::path(
    get,
    path = "/api/contents/{fingerprint}",
    tag = "contents",
    responses(
        (status = 200, body = ContentEntry),
        (status = 400, description = "Malformed fingerprint", body = String),
        (status = 404, description = "Content not found", body = String)
    ),
    params(
        ("fingerprint" = String, Path, description = "BLAKE3 fingerprint, 64 hex characters")
    ),
)]
pub async fn get_content(
    Path(fingerprint): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        let entry = repository.get_content(&fingerprint)?;
        Ok((entry, fingerprint))
    })
    .await;
    match result {
        Ok((Some(entry), _)) => (StatusCode::OK, Json(entry).into_response()),
        Ok((None, fingerprint)) => (
            StatusCode::NOT_FOUND,
            format!("content not found: {fingerprint}").into_response(),
        ),
        Err(e) => error_response(&e),
    }
}

/// Gets deduplication statistics
#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Storage statistics", body = StorageStats),
        (status = 500, description = "Server error", body = String)
    ),
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = execute(&state, Mode::ReadOnly, move |mut repository| {
        repository.compute_stats()
    })
    .await;
    make_response(result.map(Json), StatusCode::OK)
}

fn make_response<R: IntoResponse>(result: DedupResult<R>, status: StatusCode) -> (StatusCode, Response) {
    match result {
        Ok(response) => (status, response.into_response()),
        Err(e) => error_response(&e),
    }
}

fn error_response(e: &DedupError) -> (StatusCode, Response) {
    let status = match e {
        DedupError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DedupError::NotFound(_) => StatusCode::NOT_FOUND,
        DedupError::InvalidFingerprint(_) | DedupError::Read(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if e.is_consistency_fault() {
        tracing::error!("store consistency fault: {e}");
    } else if status.is_server_error() {
        tracing::error!("Error: {e}");
    } else {
        tracing::info!("Error: {e}");
    }
    (status, e.to_string().into_response())
}

async fn execute<F, R>(state: &Arc<AppState>, mode: Mode, action: F) -> DedupResult<R>
where
    F: FnOnce(Sqlite) -> DedupResult<R> + Send + 'static,
    R: Send + 'static,
{
    let state = Arc::clone(state);
    let joined = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let repository =
            Sqlite::open(state.db.as_path(), mode)?.with_max_upload_size(state.max_upload_size);
        let res = action(repository);
        let duration = start.elapsed();
        tracing::info!("DB query time: {:?}", duration);
        res
    })
    .await;
    joined.unwrap_or_else(|e| Err(DedupError::StorageIo(io::Error::other(e))))
}

fn log_upload_result(
    operation_result: DedupResult<UploadResult>,
    file_name: &str,
) -> DedupResult<UploadResult> {
    match &operation_result {
        Ok(uploaded) => log_uploaded(uploaded),
        Err(e) => {
            tracing::error!("file '{}' not uploaded. Error: {}", file_name, e);
        }
    }
    operation_result
}

fn log_uploaded(uploaded: &UploadResult) {
    tracing::info!(
        "file: {} size: {} file id: {} duplicate: {} saved: {}",
        uploaded.record.name,
        uploaded.record.size,
        uploaded.record.id,
        !uploaded.was_content_new,
        uploaded.storage_saved
    );
}
