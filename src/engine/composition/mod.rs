//! Component composition engine: builds a typed composition tree, bundles it
//! with the composition page, captures it frame by frame in a headless browser
//! and encodes the frames with ffmpeg. Also hosts the audio marker mode.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{artifact_name, verify_artifact, RenderEngine, RenderResult};
use crate::audio::AudioAnalyzer;
use crate::config::Config;
use crate::error::{with_timeout, RenderError, Result};
use crate::harness::browser::BrowserLauncher;
use crate::harness::{run_capture, CaptureRequest, Diagnostics};
use crate::spec::RenderSpec;
use crate::video::VideoEncoder;
use crate::workspace::Workspace;

pub mod bundle;
pub mod csv;
pub mod payload;

pub use bundle::{select_composition, SelectedComposition};
pub use payload::CompositionPayload;

pub struct CompositionEngine {
    config: Arc<Config>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl CompositionEngine {
    pub fn new(config: Arc<Config>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    async fn run(
        &self,
        spec: &RenderSpec,
        output_dir: &Path,
        diagnostics: &Diagnostics,
    ) -> Result<PathBuf> {
        if spec.bool_field("audio_markers_only") {
            if let Some(audio) = spec.str_field("audio_path") {
                return self.audio_markers(Path::new(audio), output_dir).await;
            }
            warn!("audio_markers_only set without audio_path, rendering video instead");
        }

        let payload = CompositionPayload::build(spec)?;
        tokio::fs::create_dir_all(output_dir).await?;
        let workspace = Workspace::create(
            &self.config.output.workspace_root(),
            "composition",
            self.config.output.debug,
        )?;
        payload.stage_assets(&workspace)?;
        workspace.write_json("spec.json", spec)?;
        info!(
            "🧩 Composition {} with {} overlays",
            payload.id,
            payload.overlays.len()
        );

        let bundle = with_timeout(
            "Bundle",
            self.config.encoder.bundle_timeout(),
            bundle::write_bundle(&workspace, &payload),
        )
        .await?;
        let selected = select_composition(&payload.id, spec)?;

        let frames_dir = workspace.subdir("frames")?;
        let request = CaptureRequest {
            root: bundle.root.clone(),
            page: bundle.page.clone(),
            width: selected.width,
            height: selected.height,
            profile_dir: workspace.join("profile"),
            artifact_path: workspace.join("capture.bin"),
            frames_dir: frames_dir.clone(),
            done_timeout: self.config.browser.done_timeout(spec.duration),
        };
        let done = run_capture(&self.config, self.launcher.as_ref(), request, diagnostics).await?;

        let captured = count_frames(&frames_dir)?;
        if captured != selected.duration_in_frames {
            return Err(RenderError::Verification(format!(
                "captured {} frames, expected {} (page reported {})",
                captured,
                selected.duration_in_frames,
                done.frames.map(|f| f.to_string()).unwrap_or_else(|| "none".into())
            )));
        }

        let output = output_dir.join(artifact_name("composition", "mp4"));
        let encoder = VideoEncoder::new(&self.config.encoder);
        with_timeout(
            "Encode",
            self.config.encoder.encode_timeout(captured),
            encoder.encode_frames(&frames_dir, selected.fps, &output),
        )
        .await?;
        verify_artifact(&output)?;

        if self.config.encoder.probe_output {
            match with_timeout(
                "Probe",
                self.config.encoder.encode_timeout(0),
                encoder.probe_video(&output),
            )
            .await
            {
                Ok(video) => info!(
                    "📹 {}x{} {:.2}fps {:.2}s {}",
                    video.width, video.height, video.fps, video.duration_secs, video.codec
                ),
                Err(e) => warn!("Could not probe {}: {}", output.display(), e),
            }
        }

        info!("✅ Composition render complete: {}", output.display());
        workspace.close();
        Ok(output)
    }

    async fn audio_markers(&self, audio: &Path, output_dir: &Path) -> Result<PathBuf> {
        let analyzer = AudioAnalyzer::new(&self.config.encoder, &self.config.audio);
        let markers = analyzer.analyze(audio).await?;
        tokio::fs::create_dir_all(output_dir).await?;

        let output = output_dir.join(artifact_name("composition-markers", "json"));
        tokio::fs::write(&output, serde_json::to_vec_pretty(&markers)?).await?;
        verify_artifact(&output)?;

        info!(
            "✅ Wrote {} audio markers to {}",
            markers.markers.len(),
            output.display()
        );
        Ok(output)
    }
}

fn count_frames(frames_dir: &Path) -> Result<u32> {
    let mut count = 0;
    for entry in std::fs::read_dir(frames_dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame_") && name.ends_with(".png") {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl RenderEngine for CompositionEngine {
    fn name(&self) -> &'static str {
        "composition"
    }

    async fn render(&self, spec: &RenderSpec, output_dir: &Path) -> RenderResult {
        let diagnostics = Diagnostics::default();
        let outcome = self.run(spec, output_dir, &diagnostics).await;
        if let Err(e) = &outcome {
            error!("❌ Composition render failed: {}", e);
        }
        RenderResult::from_outcome(outcome, &diagnostics, self.config.output.debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::frame_file_name;

    #[test]
    fn test_count_frames_ignores_other_files() {
        let dir = tempfile::TempDir::new().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(frame_file_name(i)), b"png").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(count_frames(dir.path()).unwrap(), 3);
    }
}
