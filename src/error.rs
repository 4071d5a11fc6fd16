//! Error types and error handling for the application
//!
//! Every failure of an upload request is an `AppError`. The `IntoResponse`
//! impl is the single place that turns an error into the `{"error": ...}` JSON
//! body; the underlying cause is logged but never sent to the client.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Body is not a readable multipart form (wrong content type, malformed, too large)
    #[error("Unable to parse form: {0}")]
    ParseForm(String),

    /// No part named `file` carried a file
    #[error("No files uploaded")]
    NoFiles,

    /// Original filename has no extension
    #[error("Filename must have an extension: {0}")]
    MissingExtension(String),

    /// Extension is on the deny list
    #[error("Disallowed file extension: {0}")]
    DisallowedExtension(String),

    /// Filename would escape the upload directory
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Upload directory could not be created
    #[error("Unable to create directory: {0}")]
    CreateDirectory(#[source] std::io::Error),

    /// Uploaded content could not be read on the server side
    #[error("Unable to open uploaded file: {0}")]
    OpenUpload(String),

    /// Destination file could not be created
    #[error("Unable to create file on server: {0}")]
    CreateFile(#[source] std::io::Error),

    /// Copying content to the destination failed
    #[error("Unable to save file on server: {0}")]
    SaveFile(#[source] std::io::Error),

    /// Result list could not be encoded
    #[error("Unable to marshal JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON body of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResult {
    /// Short human-readable message
    pub error: String,
}

impl AppError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ParseForm(_)
            | AppError::NoFiles
            | AppError::MissingExtension(_)
            | AppError::DisallowedExtension(_)
            | AppError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            AppError::CreateDirectory(_)
            | AppError::OpenUpload(_)
            | AppError::CreateFile(_)
            | AppError::SaveFile(_)
            | AppError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client, free of system error details
    pub fn client_message(&self) -> &'static str {
        match self {
            AppError::ParseForm(_) => "Unable to parse form",
            AppError::NoFiles => "No files uploaded",
            AppError::MissingExtension(_) => "Filename must have an extension",
            AppError::DisallowedExtension(_) => "Disallowed file extension",
            AppError::InvalidFilename(_) => "Invalid filename",
            AppError::CreateDirectory(_) => "Unable to create directory",
            AppError::OpenUpload(_) => "Unable to open uploaded file",
            AppError::CreateFile(_) => "Unable to create file on server",
            AppError::SaveFile(_) => "Unable to save file on server",
            AppError::Serialize(_) => "Unable to marshal JSON",
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status().is_server_error() {
            AppError::OpenUpload(err.body_text())
        } else {
            AppError::ParseForm(err.body_text())
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::ParseForm(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Upload request failed");
        } else {
            tracing::warn!(error = %self, "Upload request rejected");
        }

        let body = Json(ErrorResult {
            error: self.client_message().to_string(),
        });

        (status, body).into_response()
    }
}
