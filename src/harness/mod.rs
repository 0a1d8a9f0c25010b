//! Browser harness: a local ephemeral web server, a headless browser session and
//! the typed message channel bridging the page back to the orchestrator.
//!
//! The harness page signals `ready`, `started` and `done` by posting to the
//! server, which forwards them as [`HarnessEvent`]s. Every wait on that channel
//! is bounded by a timeout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{with_timeout, RenderError, Result};

pub mod browser;
pub mod server;

use browser::{BrowserLauncher, LaunchRequest};
use server::HarnessServer;

/// Scene program interpreter page served to the browser by the motion engine
pub const MOTION_PAGE: &str = include_str!("assets/motion.html");

/// Composition frame renderer page served to the browser by the composition engine
pub const COMPOSITION_PAGE: &str = include_str!("assets/composition.html");

const MAX_DIAGNOSTICS: usize = 500;

/// Captured console output, page errors, failed requests and browser stderr
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Diagnostics {
    pub fn push(&self, source: &str, message: impl AsRef<str>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() < MAX_DIAGNOSTICS {
            entries.push(format!("[{}] {}", source, message.as_ref().trim_end()));
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Newline-joined entries, or `None` when nothing was captured
    pub fn report(&self) -> Option<String> {
        let entries = self.entries();
        if entries.is_empty() {
            None
        } else {
            Some(entries.join("\n"))
        }
    }
}

/// Message from the page, the server or the browser process
#[derive(Debug, Clone, PartialEq)]
pub enum HarnessEvent {
    /// Page loaded its program and is about to start
    Ready,
    /// Rendering started
    Started,
    /// Rendering finished, possibly with an in-page error
    Done(DoneSignal),
    /// Page reported an unrecoverable error
    Failed(String),
    /// Browser process exited on its own
    BrowserExited(String),
}

/// Payload of the done signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoneSignal {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub frames: Option<u32>,
}

/// Cloneable sending half handed to the server and the browser watcher
#[derive(Debug, Clone)]
pub struct HarnessSink {
    events: mpsc::UnboundedSender<HarnessEvent>,
    diagnostics: Diagnostics,
    artifact_path: Arc<PathBuf>,
    frames_dir: Arc<PathBuf>,
}

impl HarnessSink {
    /// Create a sink/channel pair; uploads land in `artifact_path` and `frames_dir`
    pub fn channel(
        diagnostics: Diagnostics,
        artifact_path: PathBuf,
        frames_dir: PathBuf,
    ) -> (Self, HarnessChannel) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sink = Self {
            events,
            diagnostics,
            artifact_path: Arc::new(artifact_path),
            frames_dir: Arc::new(frames_dir),
        };
        let channel = HarnessChannel {
            receiver,
            state: ChannelState::default(),
        };
        (sink, channel)
    }

    pub fn emit(&self, event: HarnessEvent) {
        debug!("📨 Harness event: {:?}", event);
        let _ = self.events.send(event);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.frames_dir.join(frame_file_name(index))
    }
}

/// File name of a captured frame
pub fn frame_file_name(index: u32) -> String {
    format!("frame_{:06}.png", index)
}

/// ffmpeg input pattern matching [`frame_file_name`]
pub const FRAME_PATTERN: &str = "frame_%06d.png";

#[derive(Debug, Default)]
struct ChannelState {
    ready: bool,
    started: bool,
    done: Option<DoneSignal>,
    failure: Option<String>,
}

impl ChannelState {
    fn absorb(&mut self, event: HarnessEvent) {
        match event {
            HarnessEvent::Ready => self.ready = true,
            HarnessEvent::Started => {
                self.ready = true;
                self.started = true;
            }
            HarnessEvent::Done(signal) => {
                self.ready = true;
                self.started = true;
                self.done = Some(signal);
            }
            HarnessEvent::Failed(message) => {
                self.failure.get_or_insert(message);
            }
            HarnessEvent::BrowserExited(status) => {
                if self.done.is_none() {
                    self.failure
                        .get_or_insert(format!("Browser exited before render completed ({})", status));
                }
            }
        }
    }
}

/// Receiving half: orchestrator-side waits on page signals
#[derive(Debug)]
pub struct HarnessChannel {
    receiver: mpsc::UnboundedReceiver<HarnessEvent>,
    state: ChannelState,
}

impl HarnessChannel {
    pub async fn wait_ready(&mut self, limit: Duration) -> Result<()> {
        self.wait_until("Page navigation", limit, |s| s.ready).await
    }

    pub async fn wait_started(&mut self, limit: Duration) -> Result<()> {
        self.wait_until("Wait for render start", limit, |s| s.started)
            .await
    }

    pub async fn wait_done(&mut self, limit: Duration) -> Result<DoneSignal> {
        self.wait_until("Wait for render done", limit, |s| s.done.is_some())
            .await?;
        Ok(self.state.done.clone().unwrap_or_default())
    }

    async fn wait_until(
        &mut self,
        stage: &str,
        limit: Duration,
        reached: fn(&ChannelState) -> bool,
    ) -> Result<()> {
        let receiver = &mut self.receiver;
        let state = &mut self.state;

        with_timeout(stage, limit, async move {
            loop {
                if let Some(failure) = &state.failure {
                    return Err(RenderError::execution(failure.clone()));
                }
                if reached(state) {
                    return Ok(());
                }
                match receiver.recv().await {
                    Some(event) => state.absorb(event),
                    None => return Err(RenderError::execution("harness channel closed")),
                }
            }
        })
        .await
    }
}

/// What to serve and capture for one job
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Directory served as the web root
    pub root: PathBuf,
    /// Page path relative to the root
    pub page: String,
    pub width: u32,
    pub height: u32,
    /// Browser profile directory inside the workspace
    pub profile_dir: PathBuf,
    /// Where an uploaded artifact is written
    pub artifact_path: PathBuf,
    /// Where uploaded frames are written
    pub frames_dir: PathBuf,
    pub done_timeout: Duration,
}

/// Serve the page, drive a browser session through ready → started → done and
/// tear both down regardless of outcome.
pub async fn run_capture(
    config: &Config,
    launcher: &dyn BrowserLauncher,
    request: CaptureRequest,
    diagnostics: &Diagnostics,
) -> Result<DoneSignal> {
    let (sink, mut channel) = HarnessSink::channel(
        diagnostics.clone(),
        request.artifact_path.clone(),
        request.frames_dir.clone(),
    );

    let server = with_timeout(
        "Local server startup",
        config.server.startup_timeout(),
        HarnessServer::start(&config.server, request.root.clone(), sink.clone()),
    )
    .await?;

    let outcome = drive_browser(config, launcher, &request, &server, sink, &mut channel).await;

    server.shutdown(config.server.startup_timeout()).await;
    outcome
}

async fn drive_browser(
    config: &Config,
    launcher: &dyn BrowserLauncher,
    request: &CaptureRequest,
    server: &HarnessServer,
    sink: HarnessSink,
    channel: &mut HarnessChannel,
) -> Result<DoneSignal> {
    let url = server.url(&request.page)?;
    info!("🌐 Opening harness page {}", url);

    let session = with_timeout(
        "Browser launch",
        config.browser.launch_timeout(),
        launcher.launch(LaunchRequest {
            url,
            width: request.width,
            height: request.height,
            profile_dir: request.profile_dir.clone(),
            sink,
        }),
    )
    .await?;

    let result = async {
        channel.wait_ready(config.browser.navigation_timeout()).await?;
        channel.wait_started(config.browser.start_timeout()).await?;
        info!("🎬 Render started, waiting up to {:.0}s", request.done_timeout.as_secs_f64());

        let done = channel.wait_done(request.done_timeout).await?;
        if let Some(error) = &done.error {
            return Err(RenderError::execution(format!("Render error: {}", error)));
        }
        Ok(done)
    }
    .await;

    if let Err(e) = session.close(config.browser.shutdown_timeout()).await {
        warn!("Failed to stop browser cleanly: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (HarnessSink, HarnessChannel) {
        HarnessSink::channel(
            Diagnostics::default(),
            PathBuf::from("/tmp/artifact"),
            PathBuf::from("/tmp/frames"),
        )
    }

    #[tokio::test]
    async fn test_signals_in_order() {
        let (sink, mut channel) = channel();
        sink.emit(HarnessEvent::Ready);
        sink.emit(HarnessEvent::Started);
        sink.emit(HarnessEvent::Done(DoneSignal {
            error: None,
            frames: Some(3),
        }));

        let limit = Duration::from_secs(1);
        channel.wait_ready(limit).await.unwrap();
        channel.wait_started(limit).await.unwrap();
        assert_eq!(channel.wait_done(limit).await.unwrap().frames, Some(3));
    }

    #[tokio::test]
    async fn test_done_implies_earlier_signals() {
        let (sink, mut channel) = channel();
        sink.emit(HarnessEvent::Done(DoneSignal::default()));
        channel.wait_started(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_done_times_out() {
        let (sink, mut channel) = channel();
        sink.emit(HarnessEvent::Started);

        let err = channel.wait_done(Duration::from_millis(50)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().starts_with("Wait for render done"));
    }

    #[tokio::test]
    async fn test_failure_short_circuits() {
        let (sink, mut channel) = channel();
        sink.emit(HarnessEvent::Failed("ReferenceError: x".into()));

        let err = channel.wait_ready(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.to_string(), "Execution failed: ReferenceError: x");
    }

    #[tokio::test]
    async fn test_browser_exit_after_done_is_harmless() {
        let (sink, mut channel) = channel();
        sink.emit(HarnessEvent::Done(DoneSignal::default()));
        sink.emit(HarnessEvent::BrowserExited("exit status: 0".into()));
        assert!(channel.wait_done(Duration::from_secs(1)).await.is_ok());
    }

    #[test]
    fn test_diagnostics_report() {
        let diagnostics = Diagnostics::default();
        assert!(diagnostics.report().is_none());
        diagnostics.push("console", "hello\n");
        diagnostics.push("request", "GET /missing.js -> 404");
        assert_eq!(
            diagnostics.report().unwrap(),
            "[console] hello\n[request] GET /missing.js -> 404"
        );
    }

    #[test]
    fn test_frame_names() {
        assert_eq!(frame_file_name(7), "frame_000007.png");
    }
}
