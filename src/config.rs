//! Application configuration
//!
//! Configuration is read once at startup from command-line flags (each with an
//! environment variable fallback) and is immutable afterwards. Handlers receive
//! it through the shared application state.

use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;

/// Default upper bound for a whole multipart request body (2 GiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 << 30;

/// Extensions rejected at upload time unless overridden
pub const DEFAULT_DISALLOWED_EXTENSIONS: &[&str] =
    &[".exe", ".bat", ".cmd", ".msi", ".vbs", ".scr", ".html"];

/// Route under which uploaded files are served
pub const UPLOADED_ROUTE: &str = "/uploaded";

/// Command-line interface
#[derive(Debug, Clone, Parser)]
#[command(
    name = "upload-service",
    version,
    about = "Multipart file upload and retrieval service"
)]
pub struct Cli {
    /// Address to bind the listener to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Base URL placed in front of every returned file link
    #[arg(
        long,
        alias = "hostname",
        env = "PUBLIC_BASE_URL",
        default_value = "http://localhost:8080"
    )]
    pub public_base_url: String,

    /// Directory uploaded files are written to and served from
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploaded")]
    pub upload_dir: PathBuf,

    /// Directory of static assets served at `/`
    #[arg(long, env = "STATIC_DIR", default_value = "./static")]
    pub static_dir: PathBuf,

    /// Path segment between the base URL and the stored filename in returned links
    #[arg(long, env = "UPLOAD_URL_PREFIX", default_value = UPLOADED_ROUTE)]
    pub url_prefix: String,

    /// Maximum size of an upload request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Comma separated list of rejected extensions (matched case-sensitively)
    #[arg(
        long,
        env = "DISALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_values_t = default_disallowed_extensions()
    )]
    pub disallowed_extensions: Vec<String>,

    /// Log every GET request for an uploaded file
    #[arg(
        long,
        env = "LOG_UPLOADED_ACCESS",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub log_uploaded_access: bool,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage configuration
    pub storage: StorageConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// Base URL used when building links to stored files (no trailing slash)
    pub public_base_url: String,
    /// Extensions that are refused, compared exactly
    pub disallowed_extensions: HashSet<String>,
    /// Whether GET requests under the uploaded route are logged
    pub log_uploaded_access: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory uploads are persisted to
    pub upload_dir: PathBuf,
    /// Directory static assets are served from
    pub static_dir: PathBuf,
    /// Path prefix for returned URLs, always starting with `/` and never ending with one
    pub url_prefix: String,
}

/// Request limits
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum request body size for uploads
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 8080,
                host: "0.0.0.0".to_string(),
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("./uploaded"),
                static_dir: PathBuf::from("./static"),
                url_prefix: UPLOADED_ROUTE.to_string(),
            },
            limits: LimitsConfig {
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
            public_base_url: "http://localhost:8080".to_string(),
            disallowed_extensions: default_disallowed_extensions().into_iter().collect(),
            log_uploaded_access: true,
        }
    }
}

impl Config {
    /// Parse flags and environment into a configuration
    pub fn load() -> Self {
        Self::from_cli(Cli::parse())
    }

    /// Build a configuration from already parsed arguments
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            server: ServerConfig {
                port: cli.port,
                host: cli.host,
            },
            storage: StorageConfig {
                upload_dir: cli.upload_dir,
                static_dir: cli.static_dir,
                url_prefix: normalize_prefix(&cli.url_prefix),
            },
            limits: LimitsConfig {
                max_body_bytes: cli.max_body_bytes,
            },
            public_base_url: cli.public_base_url.trim_end_matches('/').to_string(),
            disallowed_extensions: cli
                .disallowed_extensions
                .into_iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            log_uploaded_access: cli.log_uploaded_access,
        }
    }

    /// Configuration rooted at the given directories, used by tests and embedders
    pub fn with_dirs(upload_dir: impl Into<PathBuf>, static_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.upload_dir = upload_dir.into();
        config.storage.static_dir = static_dir.into();
        config
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Public URL of a stored file
    pub fn file_url(&self, storage_filename: &str) -> String {
        format!(
            "{}{}/{}",
            self.public_base_url, self.storage.url_prefix, storage_filename
        )
    }
}

fn default_disallowed_extensions() -> Vec<String> {
    DEFAULT_DISALLOWED_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
