//! Artifact HTTP handlers.

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use shared_types::UploadResponse;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Multipart form field carrying the uploaded document.
const FILE_FIELD: &str = "file";

/// Replace the current artifact with the uploaded `file` field.
pub async fn upload_artifact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;

        let outcome = state
            .artifacts
            .upload(&data, file_name.as_deref())
            .await?;

        tracing::info!(
            uploader = %user.email,
            bytes = data.len(),
            "Artifact uploaded"
        );

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            backup: outcome.backup,
        }));
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// Serve the current artifact. The response must never be cached since the
/// artifact can be replaced at any time.
pub async fn serve_artifact(State(state): State<AppState>) -> ApiResult<Response> {
    let bytes = state.artifacts.read_current().await?;

    Ok((
        [
            (header::CONTENT_TYPE, state.artifacts.content_type()),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        bytes,
    )
        .into_response())
}
