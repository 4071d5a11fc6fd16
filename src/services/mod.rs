//! Service layer for business logic
//!
//! Keeps filesystem work out of the HTTP handlers so it can be tested on its own.

pub mod storage;

pub use storage::{StagedUpload, UploadResult, UploadStore};
