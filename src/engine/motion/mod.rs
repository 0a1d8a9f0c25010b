//! Scripted animation engine: compiles the spec into a scene program, has a
//! headless browser interpret and record it in-page, and collects the webm.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use super::{artifact_name, verify_artifact, RenderEngine, RenderResult};
use crate::config::Config;
use crate::error::Result;
use crate::harness::browser::BrowserLauncher;
use crate::harness::{run_capture, CaptureRequest, Diagnostics, MOTION_PAGE};
use crate::spec::RenderSpec;
use crate::workspace::Workspace;

pub mod compile;
pub mod effects;
pub mod scene;

pub use effects::Effect;
pub use scene::SceneProgram;

const PAGE: &str = "index.html";
const RECORDING: &str = "recording.webm";

pub struct MotionEngine {
    config: Arc<Config>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl MotionEngine {
    pub fn new(config: Arc<Config>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    /// Select the effect and compile it into a scene program
    pub fn build_program(spec: &RenderSpec) -> Result<SceneProgram> {
        let effect = Effect::select(&spec.data)?;
        info!("🎞️ Motion effect: {}", effect.name());
        compile::compile(&effect, spec)
    }

    async fn run(
        &self,
        spec: &RenderSpec,
        output_dir: &Path,
        diagnostics: &Diagnostics,
    ) -> Result<PathBuf> {
        let program = Self::build_program(spec)?;
        tokio::fs::create_dir_all(output_dir).await?;

        let workspace = Workspace::create(
            &self.config.output.workspace_root(),
            "motion",
            self.config.output.debug,
        )?;
        workspace.write_json("program.json", &program)?;
        workspace.write_json("spec.json", spec)?;
        workspace.write_file(PAGE, MOTION_PAGE)?;

        let recording = workspace.join(RECORDING);
        let request = CaptureRequest {
            root: workspace.path().to_path_buf(),
            page: PAGE.to_string(),
            width: spec.width,
            height: spec.height,
            profile_dir: workspace.join("profile"),
            artifact_path: recording.clone(),
            frames_dir: workspace.join("frames"),
            done_timeout: self.config.browser.done_timeout(spec.duration),
        };

        let done = run_capture(&self.config, self.launcher.as_ref(), request, diagnostics).await?;
        verify_artifact(&recording)?;

        let output = output_dir.join(artifact_name("motion", "webm"));
        tokio::fs::copy(&recording, &output).await?;
        verify_artifact(&output)?;

        info!(
            "✅ Motion render complete: {} ({} frames drawn)",
            output.display(),
            done.frames.map(|f| f.to_string()).unwrap_or_else(|| "?".into())
        );
        workspace.close();
        Ok(output)
    }
}

#[async_trait]
impl RenderEngine for MotionEngine {
    fn name(&self) -> &'static str {
        "motion"
    }

    async fn render(&self, spec: &RenderSpec, output_dir: &Path) -> RenderResult {
        let diagnostics = Diagnostics::default();
        let outcome = self.run(spec, output_dir, &diagnostics).await;
        if let Err(e) = &outcome {
            error!("❌ Motion render failed: {}", e);
        }
        RenderResult::from_outcome(outcome, &diagnostics, self.config.output.debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecDefaults;
    use crate::spec::SubmitRequest;
    use serde_json::json;

    #[test]
    fn test_build_program_uses_spec_dimensions() {
        let spec = SubmitRequest {
            width: Some(640),
            height: Some(360),
            theme: Some("dark".into()),
            ..SubmitRequest::new("motion", json!({ "counter": { "to": 10 } }))
        }
        .into_spec(&SpecDefaults::default())
        .unwrap();

        let program = MotionEngine::build_program(&spec).unwrap();
        assert_eq!((program.width, program.height, program.fps), (640, 360, 30));
        assert_eq!(program.background, crate::theme::Palette::named("dark").background);
    }

    #[test]
    fn test_ambiguous_effect_fails_before_workspace() {
        let spec = SubmitRequest::new(
            "motion",
            json!({ "counter": { "to": 1 }, "quote": { "text": "x" } }),
        )
        .into_spec(&SpecDefaults::default())
        .unwrap();

        let err = MotionEngine::build_program(&spec).unwrap_err();
        assert_eq!(err.to_string(), "Ambiguous effect: counter, quote");
    }
}
