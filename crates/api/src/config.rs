use std::path::PathBuf;
use std::time::Duration;

use submitter_core::service::{JobsConfig, DEFAULT_MAX_CONCURRENT_JOBS};
use submitter_core::subprocess::ExternalCommand;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `3600`).
    ///
    /// A waiting submission holds its request open until the analysis
    /// finishes, so this must exceed the longest expected run.
    pub request_timeout_secs: u64,
    /// Largest accepted upload body in bytes (default: 1 GiB).
    pub max_upload_bytes: usize,
    /// Root served under `/static` (default: `./static`).
    pub static_dir: PathBuf,
    /// Job storage and external command settings.
    pub jobs: JobsConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `0.0.0.0`                |
    /// | `PORT`                  | `8080`                   |
    /// | `CORS_ORIGINS`          | `http://localhost:8080`  |
    /// | `REQUEST_TIMEOUT_SECS`  | `3600`                   |
    /// | `MAX_UPLOAD_BYTES`      | `1073741824`             |
    /// | `STATIC_DIR`            | `./static`               |
    /// | `JOBS_ROOT`             | `./jobs`                 |
    /// | `ANALYSIS_COMMAND`      | `cravat`                 |
    /// | `VIEWER_COMMAND`        | `cravat-view`            |
    /// | `ANALYSIS_TIMEOUT_SECS` | unset (no timeout)       |
    /// | `MAX_CONCURRENT_JOBS`   | `2`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (1024 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let static_dir =
            PathBuf::from(std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into()));

        let jobs_root =
            PathBuf::from(std::env::var("JOBS_ROOT").unwrap_or_else(|_| "./jobs".into()));

        let analysis_command = command_from_env("ANALYSIS_COMMAND", "cravat");
        let viewer_command = command_from_env("VIEWER_COMMAND", "cravat-view");

        let analysis_timeout = std::env::var("ANALYSIS_TIMEOUT_SECS").ok().map(|raw| {
            Duration::from_secs(
                raw.parse()
                    .expect("ANALYSIS_TIMEOUT_SECS must be a valid u64"),
            )
        });

        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .map(|raw| {
                raw.parse()
                    .expect("MAX_CONCURRENT_JOBS must be a valid usize")
            })
            .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            static_dir,
            jobs: JobsConfig {
                jobs_root,
                analysis_command,
                viewer_command,
                analysis_timeout,
                max_concurrent_jobs,
            },
        }
    }
}

/// Read a command line from `var`, falling back to `default`.
///
/// Panics at startup if the value is blank or has unbalanced quotes.
fn command_from_env(var: &str, default: &str) -> ExternalCommand {
    let line = std::env::var(var).unwrap_or_else(|_| default.into());
    parse_command(var, &line)
}

fn parse_command(var: &str, line: &str) -> ExternalCommand {
    ExternalCommand::parse(line)
        .unwrap_or_else(|e| panic!("{var} is not a valid command line ({line:?}): {e}"))
}
