//! API module
//!
//! Contains HTTP request handlers

pub mod uploads;

pub use uploads::upload_files;
