use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the render pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Job scheduler settings
    pub scheduler: SchedulerConfig,

    /// Output and workspace settings
    pub output: OutputConfig,

    /// Defaults applied to submitted specs
    pub defaults: SpecDefaults,

    /// Headless browser settings
    pub browser: BrowserConfig,

    /// Local harness server settings
    pub server: ServerConfig,

    /// Video encoding settings
    pub encoder: EncoderConfig,

    /// Audio analysis settings
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between polls for pending jobs (milliseconds)
    pub poll_interval_ms: u64,

    /// Jobs processed at once within a tick (1 = strictly sequential)
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Shared directory receiving finished artifacts
    pub base_dir: PathBuf,

    /// Parent directory for ephemeral workspaces (system temp when unset)
    pub workspace_root: Option<PathBuf>,

    /// Keep workspaces and append captured diagnostics to errors
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecDefaults {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub fps: u32,
    pub theme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chromium-compatible executable
    pub executable: PathBuf,

    /// Extra command line flags passed to the browser
    pub extra_args: Vec<String>,

    /// Browser process launch timeout (seconds)
    pub launch_timeout_secs: u64,

    /// Harness page load timeout (seconds)
    pub navigation_timeout_secs: u64,

    /// Timeout for the render-started signal (seconds)
    pub start_timeout_secs: u64,

    /// Minimum timeout for the render-done signal (seconds)
    pub done_timeout_floor_secs: u64,

    /// Additional done timeout per second of requested duration
    pub done_timeout_per_second: f64,

    /// Timeout for killing the browser on teardown (seconds)
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface the harness server binds to (port is always ephemeral)
    pub bind_host: String,

    /// Server startup timeout (seconds)
    pub startup_timeout_secs: u64,

    /// Largest accepted artifact or frame upload (bytes)
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub video_codec: String,
    pub pixel_format: String,
    pub crf: u32,

    /// Minimum encode timeout (seconds)
    pub timeout_floor_secs: u64,

    /// Inspect encoded output with ffprobe after encoding
    pub probe_output: bool,

    /// Timeout for writing the composition bundle (seconds)
    pub bundle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Silence threshold in dB
    pub noise_threshold_db: f64,

    /// Minimum silence length in seconds
    pub min_silence_secs: f64,

    /// Timeout for each audio subprocess (seconds)
    pub timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_concurrent_jobs: 1,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            workspace_root: None,
            debug: false,
        }
    }
}

impl Default for SpecDefaults {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            duration: 5.0,
            fps: 30,
            theme: "default".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("chromium"),
            extra_args: Vec::new(),
            launch_timeout_secs: 15,
            navigation_timeout_secs: 30,
            start_timeout_secs: 30,
            done_timeout_floor_secs: 60,
            done_timeout_per_second: 4.0,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            startup_timeout_secs: 5,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            crf: 18,
            timeout_floor_secs: 60,
            probe_output: true,
            bundle_timeout_secs: 30,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            noise_threshold_db: -30.0,
            min_silence_secs: 0.5,
            timeout_secs: 120,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            output: OutputConfig::default(),
            defaults: SpecDefaults::default(),
            browser: BrowserConfig::default(),
            server: ServerConfig::default(),
            encoder: EncoderConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl OutputConfig {
    /// Directory under which per-job workspaces are allocated
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("reelforge"))
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Done timeout scaled to the requested duration, never below the floor
    pub fn done_timeout(&self, duration_secs: f64) -> Duration {
        let scaled = duration_secs.max(0.0) * self.done_timeout_per_second;
        let floor = self.done_timeout_floor_secs as f64;
        Duration::try_from_secs_f64(scaled.max(floor)).unwrap_or(Duration::MAX)
    }
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl EncoderConfig {
    /// Encode timeout: roughly one second per rendered frame batch, never below the floor
    pub fn encode_timeout(&self, frames: u32) -> Duration {
        let scaled = frames as f64 / 10.0;
        Duration::from_secs_f64(scaled.max(self.timeout_floor_secs as f64))
    }

    pub fn bundle_timeout(&self) -> Duration {
        Duration::from_secs(self.bundle_timeout_secs)
    }
}

impl AudioConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "reelforge.toml",
            "config/reelforge.toml",
            "/etc/reelforge/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        if let Ok(config) = Self::from_env() {
            return Ok(config);
        }

        Err(anyhow!("No configuration file found"))
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let config = toml::from_str(&config_str)?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(output_dir) = std::env::var("REELFORGE_OUTPUT_DIR") {
            config.output.base_dir = PathBuf::from(output_dir);
        }

        if let Ok(workspace_root) = std::env::var("REELFORGE_WORKSPACE_ROOT") {
            config.output.workspace_root = Some(PathBuf::from(workspace_root));
        }

        if let Ok(debug) = std::env::var("REELFORGE_DEBUG") {
            config.output.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }

        if let Ok(browser) = std::env::var("REELFORGE_BROWSER") {
            config.browser.executable = PathBuf::from(browser);
        }

        if let Ok(ffmpeg) = std::env::var("REELFORGE_FFMPEG") {
            config.encoder.ffmpeg_path = PathBuf::from(ffmpeg);
        }

        if let Ok(ffprobe) = std::env::var("REELFORGE_FFPROBE") {
            config.encoder.ffprobe_path = PathBuf::from(ffprobe);
        }

        if let Ok(poll) = std::env::var("REELFORGE_POLL_INTERVAL_MS") {
            config.scheduler.poll_interval_ms = poll.parse().unwrap_or(1000);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(anyhow!("max_concurrent_jobs must be greater than 0"));
        }

        if self.defaults.width == 0 || self.defaults.height == 0 {
            return Err(anyhow!("default dimensions must be greater than 0"));
        }

        if self.defaults.fps == 0 || self.defaults.duration <= 0.0 {
            return Err(anyhow!("default fps and duration must be greater than 0"));
        }

        if self.browser.done_timeout_per_second < 0.0 {
            return Err(anyhow!("done_timeout_per_second must not be negative"));
        }

        if !self.output.base_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.output.base_dir) {
                return Err(anyhow!("Cannot create output directory: {}", e));
            }
        }

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Render Pipeline Configuration:\n\
            - Poll Interval: {}ms\n\
            - Concurrent Jobs: {}\n\
            - Output Directory: {}\n\
            - Workspace Root: {}\n\
            - Browser: {}\n\
            - FFmpeg: {}\n\
            - Debug: {}",
            self.scheduler.poll_interval_ms,
            self.scheduler.max_concurrent_jobs,
            self.output.base_dir.display(),
            self.output.workspace_root().display(),
            self.browser.executable.display(),
            self.encoder.ffmpeg_path.display(),
            self.output.debug
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_workspace_root(mut self, dir: PathBuf) -> Self {
        self.config.output.workspace_root = Some(dir);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.output.debug = debug;
        self
    }

    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.scheduler.poll_interval_ms = millis;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.config.scheduler.max_concurrent_jobs = jobs;
        self
    }

    pub fn with_browser(mut self, executable: PathBuf) -> Self {
        self.config.browser.executable = executable;
        self
    }

    /// Shrink every browser wait, mostly useful for tests and smoke runs
    pub fn with_browser_timeouts(mut self, start_secs: u64, done_floor_secs: u64) -> Self {
        self.config.browser.navigation_timeout_secs = start_secs;
        self.config.browser.start_timeout_secs = start_secs;
        self.config.browser.done_timeout_floor_secs = done_floor_secs;
        self.config.browser.done_timeout_per_second = 0.0;
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        self.config.encoder.ffmpeg_path = ffmpeg;
        self.config.encoder.ffprobe_path = ffprobe;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheduler.poll_interval_ms, 1000);
        assert_eq!(config.scheduler.max_concurrent_jobs, 1);
        assert_eq!(config.defaults.fps, 30);
        assert!(!config.output.debug);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_debug(true)
            .with_poll_interval_ms(50)
            .with_browser_timeouts(2, 3)
            .build();

        assert!(config.output.debug);
        assert_eq!(config.scheduler.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.browser.start_timeout(), Duration::from_secs(2));
        assert_eq!(config.browser.done_timeout(120.0), Duration::from_secs(3));
    }

    #[test]
    fn test_done_timeout_scales_with_duration() {
        let browser = BrowserConfig::default();
        assert_eq!(browser.done_timeout(1.0), Duration::from_secs(60));
        assert_eq!(browser.done_timeout(30.0), Duration::from_secs(120));
    }

    #[test]
    fn test_done_timeout_saturates() {
        let browser = BrowserConfig::default();
        assert_eq!(browser.done_timeout(1e19), Duration::MAX);
        assert_eq!(browser.done_timeout(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[scheduler]\npoll_interval_ms = 250\n").unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, 250);
        assert_eq!(config.scheduler.max_concurrent_jobs, 1);
        assert_eq!(config.defaults.width, 1920);
    }

    #[test]
    fn test_config_validation() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .with_output_dir(temp.path().join("out"))
            .build();
        assert!(config.validate().is_ok());
        assert!(temp.path().join("out").exists());

        let invalid = ConfigBuilder::new().with_max_concurrent_jobs(0).build();
        assert!(invalid.validate().is_err());
    }
}
