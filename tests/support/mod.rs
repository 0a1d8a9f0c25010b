//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

use reelforge::error::Result;
use reelforge::harness::browser::{BrowserLauncher, BrowserSession, LaunchRequest};
use reelforge::Config;

/// What the fake page does once "loaded"
#[derive(Debug, Clone)]
pub enum Script {
    /// ready → started → artifact/frames → done, every frame carrying `frame` as its body
    Complete {
        artifact: Vec<u8>,
        frames: u32,
        frame: Vec<u8>,
    },
    /// ready → started, then nothing
    StallAfterStart,
    /// ready → started → done with an in-page error
    PageError(String),
}

/// Launcher that plays a [`Script`] against the harness endpoints over HTTP
#[derive(Clone)]
pub struct FakeBrowser {
    script: Script,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl FakeBrowser {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            sizes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn completing(artifact: &[u8], frames: u32) -> Arc<Self> {
        Self::new(Script::Complete {
            artifact: artifact.to_vec(),
            frames,
            frame: vec![0x89, b'P', b'N', b'G'],
        })
    }

    /// Uploads `frames` copies of a real PNG and no recording
    pub fn capturing(frame: Vec<u8>, frames: u32) -> Arc<Self> {
        Self::new(Script::Complete {
            artifact: Vec::new(),
            frames,
            frame,
        })
    }
}

struct FakeSession {
    task: JoinHandle<()>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn close(self: Box<Self>, _limit: Duration) -> Result<()> {
        self.task.abort();
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, request: LaunchRequest) -> Result<Box<dyn BrowserSession>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.sizes
            .lock()
            .unwrap()
            .push((request.width, request.height));

        let script = self.script.clone();
        let page = request.url.clone();
        let task = tokio::spawn(async move {
            let _ = play(script, page).await;
        });

        Ok(Box::new(FakeSession {
            task,
            closes: Arc::clone(&self.closes),
        }))
    }
}

async fn play(script: Script, page: Url) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = reqwest::Client::new();
    let endpoint = |path: &str| page.join(&format!("/__harness/{}", path));

    // the page fetches its own document first, like a browser would
    client.get(page.clone()).send().await?.error_for_status()?;

    client.post(endpoint("ready")?).json(&json!({})).send().await?;
    client.post(endpoint("started")?).json(&json!({})).send().await?;

    match script {
        Script::Complete {
            artifact,
            frames,
            frame,
        } => {
            if !artifact.is_empty() {
                client.post(endpoint("artifact")?).body(artifact).send().await?;
            }
            for index in 0..frames {
                client
                    .post(endpoint(&format!("frame/{}", index))?)
                    .body(frame.clone())
                    .send()
                    .await?
                    .error_for_status()?;
            }
            client
                .post(endpoint("done")?)
                .json(&json!({ "frames": frames }))
                .send()
                .await?;
        }
        Script::StallAfterStart => {}
        Script::PageError(message) => {
            client
                .post(endpoint("log")?)
                .json(&json!({ "level": "error", "message": message }))
                .send()
                .await?;
            client
                .post(endpoint("done")?)
                .json(&json!({ "error": message }))
                .send()
                .await?;
        }
    }
    Ok(())
}

/// Config with every workspace and artifact under `root` and short browser waits
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.output.base_dir = root.join("output");
    config.output.workspace_root = Some(root.join("workspaces"));
    config.browser.launch_timeout_secs = 5;
    config.browser.navigation_timeout_secs = 5;
    config.browser.start_timeout_secs = 5;
    config.browser.done_timeout_floor_secs = 1;
    config.browser.done_timeout_per_second = 0.0;
    config.browser.shutdown_timeout_secs = 1;
    config.encoder.probe_output = false;
    config
}

/// Entries left under a directory (0 when it does not exist)
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ffmpeg_tools_available() -> bool {
    tool_available("ffmpeg") && tool_available("ffprobe")
}

/// Solid-colour PNG of the given size, drawn by ffmpeg
pub fn solid_png(dir: &Path, width: u32, height: u32) -> Vec<u8> {
    let path = dir.join("solid.png");
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("color=c=navy:s={}x{}", width, height))
        .args(["-frames:v", "1"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success(), "ffmpeg failed drawing {}", path.display());
    std::fs::read(path).unwrap()
}
