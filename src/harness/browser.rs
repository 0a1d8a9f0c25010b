//! Headless browser sessions pointed at the harness page

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{Diagnostics, HarnessEvent, HarnessSink};
use crate::config::BrowserConfig;
use crate::error::{RenderError, Result};

/// Everything a launcher needs to open one page
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub url: Url,
    pub width: u32,
    pub height: u32,
    /// Fresh profile directory owned by the job workspace
    pub profile_dir: PathBuf,
    /// Channel for process exit notifications and stderr diagnostics
    pub sink: HarnessSink,
}

/// Starts browser sessions. Swappable so tests can drive the harness endpoints directly.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn BrowserSession>>;
}

/// A running browser; closed exactly once by the orchestrator
#[async_trait]
pub trait BrowserSession: Send {
    async fn close(self: Box<Self>, limit: Duration) -> Result<()>;
}

/// Launches a Chromium-family browser in headless mode
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
    extra_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    fn args(&self, request: &LaunchRequest) -> Vec<String> {
        let mut args = vec![
            "--headless=new".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-timer-throttling".to_string(),
            "--disable-renderer-backgrounding".to_string(),
            "--autoplay-policy=no-user-gesture-required".to_string(),
            "--hide-scrollbars".to_string(),
            "--force-device-scale-factor=1".to_string(),
            format!("--window-size={},{}", request.width, request.height),
            format!("--user-data-dir={}", request.profile_dir.display()),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(request.url.to_string());
        args
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn BrowserSession>> {
        tokio::fs::create_dir_all(&request.profile_dir).await?;

        let mut child = Command::new(&self.executable)
            .args(self.args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderError::execution(format!(
                    "Failed to launch browser {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        info!("🧭 Browser started (pid {:?})", child.id());

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, request.sink.diagnostics().clone()));
        }

        let (kill, kill_signal) = oneshot::channel::<()>();
        let sink = request.sink;
        let watcher = tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_signal => None,
            };

            match exited {
                Some(status) => {
                    let description = match status {
                        Ok(status) => status.to_string(),
                        Err(e) => e.to_string(),
                    };
                    debug!("Browser exited on its own: {}", description);
                    sink.emit(HarnessEvent::BrowserExited(description));
                }
                None => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill browser: {}", e);
                    }
                }
            }
        });

        Ok(Box::new(ChromiumSession {
            kill: Some(kill),
            watcher,
        }))
    }
}

struct ChromiumSession {
    kill: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn close(mut self: Box<Self>, limit: Duration) -> Result<()> {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }

        match tokio::time::timeout(limit, &mut self.watcher).await {
            Ok(_) => {
                debug!("🛑 Browser stopped");
                Ok(())
            }
            Err(_) => {
                self.watcher.abort();
                Err(RenderError::timeout("Browser shutdown", limit))
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, diagnostics: Diagnostics) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        debug!("browser stderr: {}", line);
        diagnostics.push("browser", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dir: &std::path::Path) -> (LaunchRequest, crate::harness::HarnessChannel) {
        let (sink, channel) = HarnessSink::channel(
            Diagnostics::default(),
            dir.join("artifact"),
            dir.join("frames"),
        );
        let request = LaunchRequest {
            url: Url::parse("http://127.0.0.1:9/index.html").unwrap(),
            width: 640,
            height: 360,
            profile_dir: dir.join("profile"),
            sink,
        };
        (request, channel)
    }

    #[test]
    fn test_args_include_window_and_profile() {
        let dir = tempfile::TempDir::new().unwrap();
        let (request, _channel) = request(dir.path());
        let mut launcher = ChromiumLauncher::new(PathBuf::from("chromium"));
        launcher.extra_args.push("--no-sandbox".into());

        let args = launcher.args(&request);
        assert!(args.contains(&"--window-size=640,360".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-data-dir=")));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().unwrap(), "http://127.0.0.1:9/index.html");
    }

    #[tokio::test]
    async fn test_missing_executable_fails_launch() {
        let dir = tempfile::TempDir::new().unwrap();
        let (request, _channel) = request(dir.path());
        let launcher = ChromiumLauncher::new(dir.path().join("no-such-browser"));

        let err = launcher.launch(request).await.err().unwrap();
        assert!(err.to_string().contains("Failed to launch browser"));
    }
}
