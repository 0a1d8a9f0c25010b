//! Engine dispatch: the capability every renderer implements and the registry
//! the scheduler resolves engine names against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RenderError, Result};
use crate::harness::browser::{BrowserLauncher, ChromiumLauncher};
use crate::harness::Diagnostics;
use crate::spec::RenderSpec;

pub mod composition;
pub mod infographic;
pub mod motion;

pub use composition::CompositionEngine;
pub use infographic::InfographicEngine;
pub use motion::MotionEngine;

/// Outcome of one engine invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl RenderResult {
    pub fn ok(output_path: PathBuf) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            error: Some(error.into()),
        }
    }

    /// Convert an engine outcome, appending diagnostics when `debug` is set
    pub fn from_outcome(outcome: Result<PathBuf>, diagnostics: &Diagnostics, debug: bool) -> Self {
        match outcome {
            Ok(path) => Self::ok(path),
            Err(e) => {
                let mut message = e.to_string();
                if debug {
                    if let Some(report) = diagnostics.report() {
                        message.push_str("\n--- diagnostics ---\n");
                        message.push_str(&report);
                    }
                }
                Self::failed(message)
            }
        }
    }
}

/// A rendering strategy turning a spec into one artifact.
///
/// Implementations never panic or error past this boundary: every failure is
/// reported through [`RenderResult::failed`].
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Name used in `RenderSpec::engine`
    fn name(&self) -> &'static str;

    async fn render(&self, spec: &RenderSpec, output_dir: &Path) -> RenderResult;
}

/// Name → engine lookup
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn RenderEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in engines driving the given browser launcher
    pub fn with_default_engines(config: &Config, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let config = Arc::new(config.clone());
        let mut registry = Self::new();
        registry.register(Arc::new(InfographicEngine::new()));
        registry.register(Arc::new(MotionEngine::new(
            Arc::clone(&config),
            Arc::clone(&launcher),
        )));
        registry.register(Arc::new(CompositionEngine::new(config, launcher)));
        registry
    }

    /// Registry with the built-in engines and a Chromium launcher from config
    pub fn from_config(config: &Config) -> Self {
        let launcher = Arc::new(ChromiumLauncher::from_config(&config.browser));
        Self::with_default_engines(config, launcher)
    }

    pub fn register(&mut self, engine: Arc<dyn RenderEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn RenderEngine>> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::UnknownEngine(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }
}

/// Engine-prefixed, timestamped artifact file name
pub fn artifact_name(prefix: &str, extension: &str) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S-%3f");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}.{}", prefix, stamp, &suffix[..8], extension)
}

/// Fail with a verification error unless `path` is a non-empty file
pub fn verify_artifact(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(RenderError::Verification(format!(
            "artifact is empty: {}",
            path.display()
        ))),
        Err(_) => Err(RenderError::Verification(format!(
            "artifact missing: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_default_engines() {
        let registry = EngineRegistry::from_config(&Config::default());
        assert_eq!(registry.names(), vec!["composition", "infographic", "motion"]);
        assert!(registry.resolve("motion").is_ok());

        let err = registry.resolve("nonexistent").err().unwrap();
        assert_eq!(err.to_string(), "Unknown engine: nonexistent");
    }

    #[test]
    fn test_artifact_names_are_unique() {
        let a = artifact_name("motion", "webm");
        let b = artifact_name("motion", "webm");
        assert!(a.starts_with("motion-"));
        assert!(a.ends_with(".webm"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.mp4");
        assert!(matches!(verify_artifact(&path), Err(RenderError::Verification(_))));

        std::fs::write(&path, b"").unwrap();
        assert!(verify_artifact(&path).is_err());

        std::fs::write(&path, b"data").unwrap();
        assert!(verify_artifact(&path).is_ok());
    }

    #[test]
    fn test_failed_result_appends_diagnostics_only_in_debug() {
        let diagnostics = Diagnostics::default();
        diagnostics.push("console", "boom");

        let quiet = RenderResult::from_outcome(
            Err(RenderError::execution("bad")),
            &diagnostics,
            false,
        );
        assert_eq!(quiet.error.as_deref(), Some("Execution failed: bad"));

        let verbose = RenderResult::from_outcome(
            Err(RenderError::execution("bad")),
            &diagnostics,
            true,
        );
        assert!(verbose.error.unwrap().contains("[console] boom"));
    }
}
