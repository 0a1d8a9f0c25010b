//! Ephemeral HTTP server hosting the workspace and receiving page signals

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};
use url::Url;

use super::{DoneSignal, HarnessEvent, HarnessSink};
use crate::config::ServerConfig;
use crate::error::{RenderError, Result};

/// Running local server bound to an ephemeral port
pub struct HarnessServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HarnessServer {
    /// Bind to an ephemeral port on the configured host and serve `root`
    pub async fn start(config: &ServerConfig, root: PathBuf, sink: HarnessSink) -> Result<Self> {
        let app = router(root, sink, config.max_upload_bytes);

        let listener = TcpListener::bind((config.bind_host.as_str(), 0)).await?;
        let addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                warn!("Harness server stopped with error: {}", e);
            }
        });

        info!("🌐 Harness server listening on http://{}", addr);
        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Absolute URL of a page under the served root
    pub fn url(&self, page: &str) -> Result<Url> {
        Url::parse(&format!("http://{}/", self.addr))
            .and_then(|base| base.join(page))
            .map_err(|e| RenderError::execution(format!("invalid harness URL: {}", e)))
    }

    /// Stop accepting requests; aborts the server task if it does not drain in time
    pub async fn shutdown(self, limit: Duration) {
        let Self {
            shutdown, mut task, ..
        } = self;
        let _ = shutdown.send(());

        if tokio::time::timeout(limit, &mut task).await.is_err() {
            warn!("Harness server did not drain within {:.1}s, aborting", limit.as_secs_f64());
            task.abort();
        }
        debug!("🛑 Harness server stopped");
    }
}

fn router(root: PathBuf, sink: HarnessSink, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/__harness/ready", post(ready_handler))
        .route("/__harness/started", post(started_handler))
        .route("/__harness/done", post(done_handler))
        .route("/__harness/failed", post(failed_handler))
        .route("/__harness/log", post(log_handler))
        .route("/__harness/artifact", post(artifact_handler))
        .route("/__harness/frame/:index", post(frame_handler))
        .fallback_service(ServeDir::new(root))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .layer(middleware::from_fn_with_state(sink.clone(), record_failed_requests)),
        )
        .with_state(sink)
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default = "default_level")]
    level: String,
    message: String,
}

fn default_level() -> String {
    "log".to_string()
}

#[derive(Debug, Deserialize)]
struct FailureReport {
    message: String,
}

async fn ready_handler(State(sink): State<HarnessSink>) -> StatusCode {
    sink.emit(HarnessEvent::Ready);
    StatusCode::NO_CONTENT
}

async fn started_handler(State(sink): State<HarnessSink>) -> StatusCode {
    sink.emit(HarnessEvent::Started);
    StatusCode::NO_CONTENT
}

async fn done_handler(
    State(sink): State<HarnessSink>,
    Json(signal): Json<DoneSignal>,
) -> StatusCode {
    sink.emit(HarnessEvent::Done(signal));
    StatusCode::NO_CONTENT
}

async fn failed_handler(
    State(sink): State<HarnessSink>,
    Json(report): Json<FailureReport>,
) -> StatusCode {
    sink.diagnostics().push("pageerror", &report.message);
    sink.emit(HarnessEvent::Failed(report.message));
    StatusCode::NO_CONTENT
}

async fn log_handler(State(sink): State<HarnessSink>, Json(entry): Json<LogEntry>) -> StatusCode {
    debug!("page {}: {}", entry.level, entry.message);
    sink.diagnostics()
        .push(&format!("console.{}", entry.level), &entry.message);
    StatusCode::NO_CONTENT
}

async fn artifact_handler(State(sink): State<HarnessSink>, body: Bytes) -> Response {
    if body.is_empty() {
        return (StatusCode::BAD_REQUEST, "empty artifact").into_response();
    }
    match tokio::fs::write(sink.artifact_path(), &body).await {
        Ok(()) => {
            debug!("💾 Received artifact ({} bytes)", body.len());
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn frame_handler(
    State(sink): State<HarnessSink>,
    Path(index): Path<u32>,
    body: Bytes,
) -> Response {
    match tokio::fs::write(sink.frame_path(index), &body).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Record every 4xx/5xx response as a failed-request diagnostic
async fn record_failed_requests(
    State(sink): State<HarnessSink>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        sink.diagnostics()
            .push("request", format!("{} {} -> {}", method, uri, status.as_u16()));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Diagnostics;

    async fn start(root: &std::path::Path) -> (HarnessServer, HarnessSink, crate::harness::HarnessChannel) {
        let frames = root.join("frames");
        std::fs::create_dir_all(&frames).unwrap();
        let (sink, channel) =
            HarnessSink::channel(Diagnostics::default(), root.join("artifact.bin"), frames);
        let server = HarnessServer::start(&ServerConfig::default(), root.to_path_buf(), sink.clone())
            .await
            .unwrap();
        (server, sink, channel)
    }

    #[tokio::test]
    async fn test_serves_workspace_and_forwards_signals() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let (server, sink, mut channel) = start(dir.path()).await;
        let client = reqwest::Client::new();

        let page = client.get(server.url("index.html").unwrap()).send().await.unwrap();
        assert_eq!(page.status(), 200);

        client
            .post(server.url("__harness/done").unwrap())
            .json(&serde_json::json!({ "frames": 4 }))
            .send()
            .await
            .unwrap();
        let done = channel.wait_done(Duration::from_secs(2)).await.unwrap();
        assert_eq!(done.frames, Some(4));

        client
            .post(server.url("__harness/frame/2").unwrap())
            .body(vec![1u8, 2, 3])
            .send()
            .await
            .unwrap();
        assert_eq!(std::fs::read(sink.frame_path(2)).unwrap(), vec![1, 2, 3]);

        server.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_missing_asset_is_recorded() {
        let dir = tempfile::TempDir::new().unwrap();
        let (server, sink, _channel) = start(dir.path()).await;

        let response = reqwest::get(server.url("public/missing.png").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let report = sink.diagnostics().report().unwrap();
        assert!(report.contains("[request] GET /public/missing.png -> 404"));
        server.shutdown(Duration::from_secs(2)).await;
    }
}
