//! File handlers for the HTTP API.

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::Response,
    Json,
};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};

use crate::file::{FileDownload, StagedUpload, UploadRequest};
use crate::storage::CHUNK_SIZE;
use crate::web::dto::validation::sanitize_file_name;
use crate::web::dto::{
    ApiResponse, FileResponse, ListFilesQuery, PaginatedResponse, UpdateTagsRequest, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::{AdminUser, AuthUser};

/// Body chunks buffered between an upload request and its blocking writer.
const UPLOAD_CHANNEL_DEPTH: usize = 4;

/// How a downloaded body should be presented by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// Build a Content-Disposition value that cannot inject headers.
///
/// Non-ASCII or quote-bearing names get an RFC 5987 `filename*` parameter
/// next to a sanitized ASCII-ish fallback.
fn content_disposition_header(disposition: Disposition, filename: &str) -> String {
    let kind = disposition.as_str();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("{kind}; filename=\"{filename}\"");
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!("{kind}; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Stream an opened blob back to the client.
fn stream_response(download: FileDownload, disposition: Disposition) -> Result<Response<Body>, ApiError> {
    let FileDownload { metadata, file } = download;

    let file = tokio::fs::File::from_std(file);
    let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));

    Response::builder()
        .header(header::CONTENT_TYPE, &metadata.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(disposition, &metadata.original_file_name),
        )
        .header(header::CONTENT_LENGTH, metadata.size_in_bytes)
        .header(header::ETAG, format!("\"{}\"", metadata.checksum))
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// POST /api/files - Upload a file.
///
/// Request body: multipart/form-data with a "file" field and optional "tags".
/// The file part is streamed to storage as it arrives; "tags" may come before
/// or after it.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileResponse>>), ApiError> {
    let mut staged: Option<StagedUpload> = None;
    let mut tags: Option<String> = None;

    if let Err(e) = read_upload_form(&state, &mut multipart, &mut staged, &mut tags).await {
        if let Some(staged) = staged {
            state.files.discard(staged).await;
        }
        return Err(e);
    }

    let mut staged = staged.ok_or_else(|| ApiError::unprocessable("File is required"))?;
    staged.set_tags(tags);

    let file = state.files.record(staged, &claims.sub).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(FileResponse::from(file))),
    ))
}

async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &mut Option<StagedUpload>,
    tags: &mut Option<String>,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" if staged.is_some() => {
                return Err(ApiError::unprocessable("Only one file can be uploaded at a time"));
            }
            "file" => {
                *staged = Some(stage_file_field(state, field).await?);
            }
            "tags" => {
                *tags = Some(field.text().await.map_err(multipart_error)?);
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }
    Ok(())
}

/// Stream one multipart file part into the blob store.
async fn stage_file_field(state: &AppState, field: Field<'_>) -> Result<StagedUpload, ApiError> {
    let request = UploadRequest {
        file_name: sanitize_file_name(field.file_name().unwrap_or("")),
        content_type: field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string(),
        tags: None,
    };

    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(UPLOAD_CHANNEL_DEPTH);
    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let reader = SyncIoBridge::new(StreamReader::new(Box::pin(chunks)));

    // Staging comes first so its cancel guard is dropped before the sender.
    let (staged, pumped) = tokio::join!(
        state.files.stage(request, reader),
        forward_chunks(field, tx)
    );

    match (staged, pumped) {
        (Ok(staged), Ok(())) => Ok(staged),
        (Ok(staged), Err(e)) => {
            state.files.discard(staged).await;
            Err(multipart_error(e))
        }
        (Err(_), Err(e)) => Err(multipart_error(e)),
        (Err(e), Ok(())) => Err(e.into()),
    }
}

/// Feed a field's chunks to the blocking writer until either side stops.
async fn forward_chunks(
    mut field: Field<'_>,
    tx: mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), MultipartError> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                // A closed channel means the writer hit the size limit or gave up.
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                return Err(e);
            }
        }
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large("Upload exceeds the maximum allowed size");
    }
    tracing::debug!("Failed to read multipart data: {}", e);
    ApiError::bad_request("Invalid multipart data")
}

/// GET /api/files - List active files.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<PaginatedResponse<FileResponse>>, ApiError> {
    let page = state
        .files
        .list(query.page_number, query.page_size, query.search_term.as_deref())
        .await?;

    Ok(Json(PaginatedResponse::from_page(page, FileResponse::from)))
}

/// GET /api/files/:id - Get file metadata.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FileResponse>>, ApiError> {
    let file = state.files.get(&id).await?;
    Ok(Json(ApiResponse::new(file.into())))
}

/// PUT /api/files/:id/tags - Replace a file's tags.
pub async fn update_tags(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateTagsRequest>,
) -> Result<Json<ApiResponse<FileResponse>>, ApiError> {
    let file = state.files.update_tags(&id, req.tags.as_deref()).await?;
    Ok(Json(ApiResponse::new(file.into())))
}

/// GET /api/files/:id/download - Download file content as an attachment.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let download = state.files.download(&id).await?;
    stream_response(download, Disposition::Attachment)
}

/// GET /api/files/:id/preview - Show an image or PDF inline.
pub async fn preview_file(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(id): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let download = state.files.preview(&id).await?;
    stream_response(download, Disposition::Inline)
}

/// DELETE /api/files/:id - Soft delete a file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.files.soft_delete(&id).await?;
    tracing::info!(file_id = %id, subject = %claims.sub, "Soft delete requested");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/files/:id/hard - Permanently delete a file (admin only).
pub async fn hard_delete_file(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.files.hard_delete(&id).await?;
    tracing::info!(file_id = %id, subject = %claims.sub, "Hard delete performed");
    Ok(StatusCode::NO_CONTENT)
}
