//! Upload storage service
//!
//! Turns client filenames into storage filenames and persists file content
//! under the upload directory. Content is first streamed into staging files
//! kept in a sibling directory outside the served root, and only renamed to
//! its storage filename once the whole batch has been accepted, so a rejected
//! request leaves nothing behind.

use crate::config::Config;
use crate::error::AppError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Length of the random prefix put in front of every stored filename
pub const RANDOM_PREFIX_LEN: usize = 6;

/// Prefix of in-flight staging files; never produced by `storage_filename`
pub const STAGING_PREFIX: &str = ".upload-";

/// Metadata returned for each stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Name the file was written under
    pub filename: String,
    /// Absolute link to the stored file
    pub url: String,
}

/// Extension of `name`: the suffix starting at the last `.` of the final path
/// element, or `""` when that element has no `.`.
pub fn file_extension(name: &str) -> &str {
    match name.rfind(['.', '/']) {
        Some(i) if name[i..].starts_with('.') => &name[i..],
        _ => "",
    }
}

/// Replace every space with an underscore
pub fn sanitize_filename(name: &str) -> String {
    name.replace(' ', "_")
}

/// Random alphanumeric string drawn from the thread-local generator
pub fn random_prefix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn staging_dir_for(upload_dir: &Path) -> PathBuf {
    match upload_dir.file_name() {
        Some(name) => {
            upload_dir.with_file_name(format!(".{}.staging", name.to_string_lossy()))
        }
        None => upload_dir.join(".staging"),
    }
}

/// A file part being written to its staging location
pub struct StagedUpload {
    storage_filename: String,
    file: fs::File,
    path: TempPath,
    size: u64,
}

impl StagedUpload {
    /// Storage filename this upload will be committed under
    pub fn storage_filename(&self) -> &str {
        &self.storage_filename
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append a chunk of content
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        self.file.write_all(chunk).await.map_err(AppError::SaveFile)?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Flush content to disk and open up permissions for serving
    pub async fn finish(&mut self) -> Result<(), AppError> {
        self.file.flush().await.map_err(AppError::SaveFile)?;
        self.file.sync_all().await.map_err(AppError::SaveFile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            self.file
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .await
                .map_err(AppError::SaveFile)?;
        }

        Ok(())
    }
}

/// Storage for uploaded files
#[derive(Clone)]
pub struct UploadStore {
    config: Arc<Config>,
}

impl UploadStore {
    /// Create a store bound to the configured upload directory
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Directory files are stored in
    pub fn upload_dir(&self) -> &PathBuf {
        &self.config.storage.upload_dir
    }

    /// Directory in-flight uploads are staged in
    ///
    /// A hidden sibling of the upload directory (`./uploaded` stages in
    /// `./.uploaded.staging`), so it is never reachable through the file
    /// server and commits stay a same-filesystem rename.
    pub fn staging_dir(&self) -> PathBuf {
        staging_dir_for(self.upload_dir())
    }

    /// Create the upload and staging directories and their parents if missing
    pub async fn ensure_upload_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.upload_dir())
            .await
            .map_err(AppError::CreateDirectory)?;
        fs::create_dir_all(self.staging_dir())
            .await
            .map_err(AppError::CreateDirectory)
    }

    /// Validate a client filename and derive the name it will be stored under
    ///
    /// # Arguments
    /// * `original` - Filename as sent by the client
    ///
    /// # Returns
    /// * `Ok(String)` - `<6 random alphanumerics>_<name with spaces replaced>`
    /// * `Err(AppError)` - Missing or disallowed extension, or a name containing
    ///   a path separator
    pub fn storage_filename(&self, original: &str) -> Result<String, AppError> {
        let ext = file_extension(original);
        if ext.is_empty() {
            return Err(AppError::MissingExtension(original.to_string()));
        }

        if self.config.disallowed_extensions.contains(ext) {
            return Err(AppError::DisallowedExtension(ext.to_string()));
        }

        let sanitized = sanitize_filename(original);
        if sanitized.contains(['/', '\\', '\0']) {
            return Err(AppError::InvalidFilename(original.to_string()));
        }

        Ok(format!("{}_{}", random_prefix(RANDOM_PREFIX_LEN), sanitized))
    }

    /// Open a staging file that will become `storage_filename` on commit
    pub fn stage(&self, storage_filename: String) -> Result<StagedUpload, AppError> {
        let staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.staging_dir())
            .map_err(AppError::CreateFile)?;
        let (file, path) = staged.into_parts();

        Ok(StagedUpload {
            storage_filename,
            file: fs::File::from_std(file),
            path,
            size: 0,
        })
    }

    /// Move staged files to their storage filenames, in order
    ///
    /// An existing file with the same name is replaced.
    pub fn commit(&self, staged: Vec<StagedUpload>) -> Result<Vec<UploadResult>, AppError> {
        let mut results = Vec::with_capacity(staged.len());

        for upload in staged {
            let StagedUpload {
                storage_filename,
                file,
                path,
                size,
            } = upload;
            drop(file);

            let destination = self.upload_dir().join(&storage_filename);
            path.persist(&destination)
                .map_err(|e| AppError::CreateFile(e.error))?;

            tracing::info!(
                filename = %storage_filename,
                bytes = size,
                "Stored uploaded file"
            );

            results.push(UploadResult {
                url: self.config.file_url(&storage_filename),
                filename: storage_filename,
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store(dir: &Path) -> UploadStore {
        UploadStore::new(Arc::new(Config::with_dirs(dir, dir)))
    }

    /// Store with its upload directory created under `root`
    async fn create_ready_store(root: &Path) -> (UploadStore, PathBuf) {
        let upload_dir = root.join("uploaded");
        let store = create_test_store(&upload_dir);
        store.ensure_upload_dir().await.expect("create dirs");
        (store, upload_dir)
    }

    fn split_storage_name(name: &str) -> (&str, &str) {
        let (prefix, rest) = name.split_at(RANDOM_PREFIX_LEN);
        assert!(rest.starts_with('_'), "missing separator in {}", name);
        (prefix, &rest[1..])
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("report.pdf"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension("name."), ".");
        assert_eq!(file_extension(".bashrc"), ".bashrc");
        assert_eq!(file_extension("dir.d/file"), "");
    }

    #[test]
    fn test_sanitize_filename_replaces_only_spaces() {
        assert_eq!(sanitize_filename("my holiday photo.jpg"), "my_holiday_photo.jpg");
        assert_eq!(sanitize_filename("  a.txt"), "__a.txt");
        assert_eq!(sanitize_filename("tab\there.txt"), "tab\there.txt");
    }

    #[test]
    fn test_random_prefix_charset() {
        for _ in 0..100 {
            let prefix = random_prefix(RANDOM_PREFIX_LEN);
            assert_eq!(prefix.len(), RANDOM_PREFIX_LEN);
            assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_storage_filename_format() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = create_test_store(dir.path());

        let name = store
            .storage_filename("quarterly report v2.pdf")
            .expect("Allowed filename");
        let (prefix, rest) = split_storage_name(&name);
        assert!(prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(rest, "quarterly_report_v2.pdf");
    }

    #[test]
    fn test_storage_filename_requires_extension() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = create_test_store(dir.path());

        match store.storage_filename("Makefile") {
            Err(AppError::MissingExtension(_)) => {}
            other => panic!(
                "Expected MissingExtension error, got: {:?}",
                other.map(|_| ())
            ),
        }
    }

    #[test]
    fn test_storage_filename_disallowed_is_case_sensitive() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = create_test_store(dir.path());

        for name in [
            "setup.exe",
            "run.bat",
            "x.cmd",
            "pkg.msi",
            "a.vbs",
            "s.scr",
            "index.html",
        ] {
            match store.storage_filename(name) {
                Err(AppError::DisallowedExtension(_)) => {}
                other => panic!(
                    "Expected DisallowedExtension for {}, got: {:?}",
                    name,
                    other.map(|_| ())
                ),
            }
        }

        assert!(store.storage_filename("SETUP.EXE").is_ok());
        assert!(store.storage_filename("page.htm").is_ok());
    }

    #[test]
    fn test_storage_filename_rejects_separators() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = create_test_store(dir.path());

        for name in ["../../etc/cron.d/job.txt", "..\\evil.txt", "a/b.txt"] {
            match store.storage_filename(name) {
                Err(AppError::InvalidFilename(_)) => {}
                other => panic!(
                    "Expected InvalidFilename for {}, got: {:?}",
                    name,
                    other.map(|_| ())
                ),
            }
        }

        // Dots alone are harmless once prefixed
        assert!(store.storage_filename("...txt").is_ok());
    }

    #[test]
    fn test_staging_dir_is_sibling() {
        assert_eq!(
            staging_dir_for(Path::new("./uploaded")),
            PathBuf::from("./.uploaded.staging")
        );
        assert_eq!(
            staging_dir_for(Path::new("/srv/files/uploaded/")),
            PathBuf::from("/srv/files/.uploaded.staging")
        );
        assert_eq!(staging_dir_for(Path::new("/")), PathBuf::from("/.staging"));
    }

    #[tokio::test]
    async fn test_stage_and_commit() {
        let dir = tempdir().expect("Failed to create temp dir");
        let (store, upload_dir) = create_ready_store(dir.path()).await;

        let mut staged = store
            .stage("abc123_notes.txt".to_string())
            .expect("Failed to stage");
        staged.write_chunk(b"hello ").await.expect("write");
        staged.write_chunk(b"world").await.expect("write");
        staged.finish().await.expect("finish");
        assert_eq!(staged.size(), 11);
        assert_eq!(staged.storage_filename(), "abc123_notes.txt");

        // Nothing is visible in the served directory before commit
        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(store.staging_dir()).unwrap().count(), 1);

        let results = store.commit(vec![staged]).expect("Failed to commit");
        assert_eq!(
            results,
            vec![UploadResult {
                filename: "abc123_notes.txt".to_string(),
                url: "http://localhost:8080/uploaded/abc123_notes.txt".to_string(),
            }]
        );

        let content = std::fs::read(upload_dir.join("abc123_notes.txt")).expect("read back");
        assert_eq!(content, b"hello world");

        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 1);
        assert_eq!(
            std::fs::read_dir(store.staging_dir()).unwrap().count(),
            0,
            "staging file should be gone"
        );
    }

    #[tokio::test]
    async fn test_dropped_stage_leaves_nothing() {
        let dir = tempdir().expect("Failed to create temp dir");
        let (store, upload_dir) = create_ready_store(dir.path()).await;

        let mut staged = store
            .stage("abc123_partial.bin".to_string())
            .expect("Failed to stage");
        staged.write_chunk(&[0u8; 1024]).await.expect("write");
        drop(staged);

        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(store.staging_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_commit_overwrites_existing_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let (store, upload_dir) = create_ready_store(dir.path()).await;
        std::fs::write(upload_dir.join("same00_a.txt"), "old").unwrap();

        let mut staged = store.stage("same00_a.txt".to_string()).unwrap();
        staged.write_chunk(b"new").await.unwrap();
        staged.finish().await.unwrap();
        store.commit(vec![staged]).unwrap();

        assert_eq!(std::fs::read_to_string(upload_dir.join("same00_a.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_ensure_upload_dir_creates_parents() {
        let dir = tempdir().expect("Failed to create temp dir");
        let nested = dir.path().join("a").join("b");
        let store = create_test_store(&nested);

        store.ensure_upload_dir().await.expect("create");
        assert!(nested.is_dir());
        assert!(dir.path().join("a").join(".b.staging").is_dir());
        // Idempotent
        store.ensure_upload_dir().await.expect("create again");
    }

    #[tokio::test]
    async fn test_ensure_upload_dir_fails_on_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = create_test_store(&blocker.join("uploads"));

        match store.ensure_upload_dir().await {
            Err(AppError::CreateDirectory(_)) => {}
            other => panic!("Expected CreateDirectory error, got: {:?}", other),
        }
    }
}
