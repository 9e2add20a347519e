//! The ingest HTTP service.
//!
//! One listener, two routes (`{base}/health` and `{base}/ingest/{streamId}`),
//! permissive CORS on every response, and a body-size cap enforced while
//! reading. The runtime descriptor is written only once the listener is bound.

use super::idle::IdleTimer;
use super::ingest::{append_line, PreparedEvent};
use super::net::{bind_listener, format_base_url};
use super::runtime::{
    mark_stopped, read_runtime, remove_pid, write_pid, write_runtime, Descriptor, Endpoints,
    RuntimeInfo, RuntimeOptions, ServerInfo,
};
use super::shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason};
use crate::config::ServerOptions;
use crate::error::{DebugError, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Map, Value};
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Header carrying the shared token as an alternative to `Authorization`.
pub const TOKEN_HEADER: &str = "x-debug-token";

/// How long in-flight connections get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const INGEST_PREFIX: &str = "/ingest/";

const CORS_HEADERS: [(HeaderName, &str); 4] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET,POST,OPTIONS"),
    (
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        "Content-Type, Authorization, X-Debug-Token",
    ),
    (header::ACCESS_CONTROL_MAX_AGE, "86400"),
];

/// Request-independent state shared by every handler invocation.
pub struct IngestState {
    logs_dir: PathBuf,
    base_path: String,
    token: Option<String>,
    max_body_bytes: usize,
    idle: Option<Arc<IdleTimer>>,
}

impl IngestState {
    pub fn new(options: &ServerOptions, idle: Option<Arc<IdleTimer>>) -> Self {
        Self {
            logs_dir: options.logs_dir.clone(),
            base_path: options.base_path.clone(),
            token: options.token.clone(),
            max_body_bytes: options.max_body_bytes(),
            idle,
        }
    }
}

/// Build the service. Routing is done by hand in [`dispatch`] so the base
/// path, preflight and 404 rules apply uniformly to every method and path.
pub fn router(state: Arc<IngestState>) -> Router {
    with_service_layers(Router::new().fallback(dispatch).with_state(state))
}

/// Panic recovery, CORS headers and request tracing around `app`.
fn with_service_layers(app: Router) -> Router {
    let mut app = app.layer(CatchPanicLayer::custom(panic_response));

    for (name, value) in CORS_HEADERS {
        app = app.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Error responses of the service, each with a stable `error` code.
#[derive(Debug)]
enum Rejection {
    NotFound,
    Unauthorized,
    BodyTooLarge,
    InvalidJson,
    InvalidBody,
    Internal(String),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "body_too_large"),
            Self::InvalidJson => (StatusCode::BAD_REQUEST, "invalid_json"),
            Self::InvalidBody => (StatusCode::BAD_REQUEST, "invalid_body"),
            Self::Internal(detail) => {
                error!(detail = %detail, "Ingest request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        (status, Json(json!({ "ok": false, "error": code }))).into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    Rejection::Internal(format!("handler panicked: {detail}")).into_response()
}

async fn dispatch(State(state): State<Arc<IngestState>>, req: Request) -> Response {
    let Some(route) = strip_base_path(req.uri().path(), &state.base_path) else {
        return Rejection::NotFound.into_response();
    };
    let route = route.to_string();

    if req.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    if req.method() == Method::GET && route == "/health" {
        return Json(json!({ "ok": true })).into_response();
    }

    if req.method() == Method::POST {
        if let Some(raw_stream) = route.strip_prefix(INGEST_PREFIX) {
            let stream_id = percent_encoding::percent_decode_str(raw_stream)
                .decode_utf8_lossy()
                .into_owned();
            return match ingest(&state, &stream_id, req).await {
                Ok(response) => response,
                Err(rejection) => rejection.into_response(),
            };
        }
    }

    Rejection::NotFound.into_response()
}

/// Remove the configured prefix. `None` when the path is outside it.
fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base_path)?;
    match rest {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

async fn ingest(
    state: &IngestState,
    stream_id: &str,
    req: Request,
) -> std::result::Result<Response, Rejection> {
    if !authorize(req.headers(), state.token.as_deref()) {
        debug!(stream_id, "Rejected ingest without valid token");
        return Err(Rejection::Unauthorized);
    }

    let (parts, body) = req.into_parts();
    let raw = read_body(&parts.headers, body, state.max_body_bytes).await?;
    let payload: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&raw).map_err(|_| Rejection::InvalidJson)?
    };
    let Value::Object(event) = payload else {
        return Err(Rejection::InvalidBody);
    };

    let received_at = chrono::Utc::now().timestamp_millis();
    let prepared = PreparedEvent::new(event, stream_id, received_at);
    let path = prepared.log_path(&state.logs_dir);
    let line = prepared
        .to_line()
        .map_err(|e| Rejection::Internal(e.to_string()))?;

    append_line(path.clone(), line)
        .await
        .map_err(|e| Rejection::Internal(format!("append to {}: {e}", path.display())))?;

    if let Some(idle) = &state.idle {
        idle.reset();
    }

    debug!(stream_id, path = %path.display(), "Event written");
    Ok(Json(json!({ "ok": true, "written": true, "path": path })).into_response())
}

/// Accept everything when no token is configured; otherwise require an exact
/// `Authorization: Bearer <token>` or `X-Debug-Token: <token>`.
fn authorize(headers: &HeaderMap, token: Option<&str>) -> bool {
    let Some(token) = token else {
        return true;
    };

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if bearer == Some(token) {
        return true;
    }

    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == token)
}

/// Collect the body, giving up as soon as it grows past `limit` bytes.
async fn read_body(
    headers: &HeaderMap,
    mut body: Body,
    limit: usize,
) -> std::result::Result<Vec<u8>, Rejection> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(Rejection::BodyTooLarge);
    }

    let mut buf = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|_| Rejection::InvalidJson)?;
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > limit {
                return Err(Rejection::BodyTooLarge);
            }
            buf.extend_from_slice(&data);
        }
    }
    Ok(buf)
}

/// A bound, serving ingest daemon.
pub struct IngestServer {
    runtime: RuntimeInfo,
    coordinator: ShutdownCoordinator,
    idle: Option<Arc<IdleTimer>>,
    serve: JoinHandle<std::io::Result<()>>,
}

impl IngestServer {
    /// Bind, persist the runtime descriptor and pid marker, and start serving.
    pub async fn start(options: ServerOptions) -> Result<Self> {
        let listener = bind_listener(&options.host, options.port).await?;
        let port = listener.local_addr()?.port();
        let base_url = format_base_url(&options.host, port);

        let coordinator = ShutdownCoordinator::new();
        let idle = options.idle_ttl_ms.map(|ttl| {
            Arc::new(IdleTimer::spawn(
                Duration::from_millis(ttl),
                coordinator.handle(),
            ))
        });
        if let Some(idle) = &idle {
            info!(ttl = ?idle.ttl(), "Idle shutdown armed");
        }

        let runtime = RuntimeInfo {
            ok: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            cwd: options.cwd.clone(),
            logs_dir: options.logs_dir.clone(),
            running: true,
            server: ServerInfo {
                host: options.host.clone(),
                port,
                base_url,
                base_path: options.base_path.clone(),
                endpoints: Endpoints::for_base_path(&options.base_path),
            },
            started_at: chrono::Utc::now(),
            stopped_at: None,
            options: RuntimeOptions {
                max_body_kb: options.max_body_kb,
                token_enabled: options.token.is_some(),
                idle_ttl_ms: options.idle_ttl_ms,
            },
        };
        write_runtime(&options.logs_dir, &runtime)?;
        write_pid(&options.logs_dir, runtime.pid)?;

        let app = router(Arc::new(IngestState::new(&options, idle.clone())));
        let shutdown = coordinator.wait();
        let serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                })
                .await
        });

        info!(
            base_url = %runtime.server.base_url,
            logs_dir = %runtime.logs_dir.display(),
            pid = runtime.pid,
            "Ingest server listening"
        );

        Ok(Self {
            runtime,
            coordinator,
            idle,
            serve,
        })
    }

    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    pub fn base_url(&self) -> &str {
        &self.runtime.server.base_url
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.coordinator.handle()
    }

    /// Turn SIGTERM and SIGINT into a graceful shutdown.
    pub fn install_signal_handlers(&self) -> Result<()> {
        let handle = self.coordinator.handle();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM");
                        handle.shutdown(ShutdownReason::Signal("SIGTERM"));
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT");
                        handle.shutdown(ShutdownReason::Signal("SIGINT"));
                    }
                }
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C");
                handle.shutdown(ShutdownReason::Signal("ctrl-c"));
            });
        }

        Ok(())
    }

    /// Request shutdown and wait for it to complete.
    pub async fn close(self) -> Result<()> {
        self.coordinator.handle().shutdown(ShutdownReason::Requested);
        self.wait().await.map(|_| ())
    }

    /// Serve until something requests shutdown, drain connections, then
    /// mark the descriptor stopped and remove the pid marker.
    pub async fn wait(mut self) -> Result<ShutdownReason> {
        let early_exit = tokio::select! {
            biased;
            _ = self.coordinator.wait() => None,
            joined = &mut self.serve => Some(joined),
        };

        let result = match (self.coordinator.reason(), early_exit) {
            (Some(reason), None) => {
                info!(?reason, "Shutting down ingest server");
                match tokio::time::timeout(DRAIN_TIMEOUT, &mut self.serve).await {
                    Ok(joined) => log_listener_exit(joined),
                    Err(_) => {
                        warn!(timeout = ?DRAIN_TIMEOUT, "Connections did not drain, aborting");
                        self.serve.abort();
                    }
                }
                Ok(reason)
            }
            // Graceful shutdown already finished the listener.
            (Some(reason), Some(joined)) => {
                info!(?reason, "Shutting down ingest server");
                log_listener_exit(joined);
                Ok(reason)
            }
            (None, joined) => {
                let detail = match joined {
                    Some(Ok(Ok(()))) | None => "listener stopped unexpectedly".to_string(),
                    Some(Ok(Err(e))) => e.to_string(),
                    Some(Err(e)) => e.to_string(),
                };
                error!(detail = %detail, "Ingest server stopped without a shutdown request");
                Err(DebugError::Internal(detail))
            }
        };

        if let Some(idle) = &self.idle {
            idle.cancel();
        }
        if let Err(e) = release_runtime(&self.runtime.logs_dir, self.runtime.pid) {
            warn!(error = %e, "Failed to clean up runtime state");
        }

        result
    }
}

fn log_listener_exit(joined: std::result::Result<std::io::Result<()>, JoinError>) {
    match joined {
        Ok(Ok(())) => debug!("Listener closed"),
        Ok(Err(e)) => warn!(error = %e, "Listener closed with error"),
        Err(e) => warn!(error = %e, "Serve task failed"),
    }
}

/// Mark the descriptor stopped and drop the pid marker, but only while they
/// still belong to `pid`. Safe to call more than once.
fn release_runtime(logs_dir: &Path, pid: u32) -> Result<()> {
    match read_runtime(logs_dir) {
        Some(Descriptor::Current(info)) if info.pid == pid => {
            mark_stopped(logs_dir)?;
            remove_pid(logs_dir)?;
            info!(pid, "Runtime state released");
        }
        _ => debug!(pid, "Runtime state owned elsewhere, leaving it"),
    }
    Ok(())
}

/// Run the service in the foreground until a signal or the idle timer stops it.
pub async fn run_foreground(options: ServerOptions) -> Result<(RuntimeInfo, ShutdownReason)> {
    let server = IngestServer::start(options).await?;
    server.install_signal_handlers()?;
    let runtime = server.runtime().clone();
    let reason = server.wait().await?;
    Ok((runtime, reason))
}
