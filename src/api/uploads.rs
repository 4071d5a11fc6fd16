//! Upload API handler
//!
//! `POST /upload` accepts one or more parts named `file` and answers with the
//! storage name and public URL of each, in the order they were sent.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

/// Form field carrying uploaded files
pub const FILE_FIELD: &str = "file";

/// POST /upload - Store every file part and return their links
///
/// The batch is all-or-nothing: the first invalid file aborts the request and
/// nothing from it is kept on disk.
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart = multipart?;
    let store = &state.store;

    let mut staged = Vec::new();
    let mut dir_ready = false;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            warn!(field = ?field.name(), "Ignoring unknown multipart field");
            continue;
        }

        let original = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                debug!("Ignoring `file` field without a filename");
                continue;
            }
        };

        if !dir_ready {
            store.ensure_upload_dir().await?;
            dir_ready = true;
        }

        let storage_filename = store.storage_filename(&original)?;
        let mut upload = store.stage(storage_filename)?;
        while let Some(chunk) = field.chunk().await? {
            upload.write_chunk(&chunk).await?;
        }
        upload.finish().await?;

        debug!(
            original = %original,
            filename = %upload.storage_filename(),
            bytes = upload.size(),
            "Staged uploaded file"
        );
        staged.push(upload);
    }

    if staged.is_empty() {
        return Err(AppError::NoFiles);
    }

    let results = store.commit(staged)?;
    let body = serde_json::to_vec(&results)?;

    info!(count = results.len(), "Upload request completed");
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
