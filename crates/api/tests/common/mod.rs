#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use submitter_api::config::ServerConfig;
use submitter_api::routes;
use submitter_api::state::AppState;
use submitter_core::service::{JobService, JobsConfig};
use submitter_core::subprocess::ExternalCommand;

/// Analysis stand-in that writes the output artifact next to its input.
pub const ANALYSIS_OK: &str = "cp \"$1\" \"$(dirname \"$1\")/input.sqlite\"\n";

/// Analysis stand-in that fails without producing output.
pub const ANALYSIS_FAIL: &str = "exit 1\n";

/// Viewer stand-in that stays alive until killed.
pub const VIEWER: &str = "exec sleep 30\n";

/// Multipart boundary used by [`multipart_upload`].
const BOUNDARY: &str = "submitter-test-boundary";

/// Write a temporary bash script and return it with a command that runs it.
pub fn bash_script(body: &str) -> (tempfile::NamedTempFile, ExternalCommand) {
    let mut f = tempfile::Builder::new()
        .suffix(".sh")
        .tempfile()
        .expect("create temp file");
    writeln!(f, "#!/bin/bash").expect("write shebang");
    write!(f, "{body}").expect("write body");
    f.flush().expect("flush script");
    let cmd = ExternalCommand::new("bash").with_args([f.path().to_string_lossy()]);
    (f, cmd)
}

/// Build a test `ServerConfig` with jobs under `root/jobs` and static
/// assets under `root/static`.
pub fn test_config(
    root: &Path,
    analysis_command: ExternalCommand,
    viewer_command: ExternalCommand,
) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8080".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 16 * 1024 * 1024,
        static_dir: root.join("static"),
        jobs: JobsConfig {
            jobs_root: root.join("jobs"),
            analysis_command,
            viewer_command,
            analysis_timeout: Some(Duration::from_secs(20)),
            max_concurrent_jobs: 2,
        },
    }
}

/// Everything a test needs to drive the app and inspect its side effects.
pub struct TestApp {
    pub router: Router,
    pub jobs: Arc<JobService>,
    pub dir: tempfile::TempDir,
    _scripts: Vec<tempfile::NamedTempFile>,
}

impl TestApp {
    /// App whose analysis command runs `analysis` and whose viewer runs `viewer`.
    pub async fn new(analysis: &str, viewer: &str) -> Self {
        Self::with_upload_limit(analysis, viewer, 16 * 1024 * 1024).await
    }

    /// Same as [`TestApp::new`] with `max_upload_bytes` overridden.
    pub async fn with_upload_limit(analysis: &str, viewer: &str, max_upload_bytes: usize) -> Self {
        let dir = tempfile::tempdir().expect("create test root");
        let (analysis_script, analysis_cmd) = bash_script(analysis);
        let (viewer_script, viewer_cmd) = bash_script(viewer);
        let mut config = test_config(dir.path(), analysis_cmd, viewer_cmd);
        config.max_upload_bytes = max_upload_bytes;
        let (router, jobs) = build_test_app(config).await;
        Self {
            router,
            jobs,
            dir,
            _scripts: vec![analysis_script, viewer_script],
        }
    }

    pub fn jobs_root(&self) -> std::path::PathBuf {
        self.dir.path().join("jobs")
    }

    pub fn static_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("static")
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub async fn build_test_app(config: ServerConfig) -> (Router, Arc<JobService>) {
    let jobs = Arc::new(JobService::new(config.jobs.clone()));
    jobs.init().await.expect("init jobs root");

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:8080".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let state = AppState {
        jobs: Arc::clone(&jobs),
    };

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/rest", routes::rest_routes(config.max_upload_bytes))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    (router, jobs)
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a single-field multipart upload.
pub async fn multipart_upload(
    app: Router,
    uri: &str,
    field: &str,
    filename: &str,
    contents: &[u8],
) -> Response<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}
