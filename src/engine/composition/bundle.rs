//! Bundling the composition page tree and resolving the composition to render

use std::path::PathBuf;
use tracing::debug;

use super::payload::{CompositionPayload, COMPOSITION_IDS};
use crate::error::{RenderError, Result};
use crate::harness::COMPOSITION_PAGE;
use crate::spec::RenderSpec;
use crate::workspace::{Workspace, PUBLIC_DIR};

pub const BUNDLE_DIR: &str = "bundle";
pub const BUNDLE_PAGE: &str = "index.html";
pub const PAYLOAD_FILE: &str = "composition.json";

/// A written bundle ready to be served
#[derive(Debug, Clone)]
pub struct Bundle {
    pub root: PathBuf,
    pub page: String,
    pub assets: usize,
}

/// Write page, payload and public assets under `bundle/`
pub async fn write_bundle(workspace: &Workspace, payload: &CompositionPayload) -> Result<Bundle> {
    let root = workspace.subdir(BUNDLE_DIR)?;
    tokio::fs::write(root.join(BUNDLE_PAGE), COMPOSITION_PAGE).await?;
    tokio::fs::write(root.join(PAYLOAD_FILE), serde_json::to_vec_pretty(payload)?).await?;

    let assets = workspace.copy_tree(PUBLIC_DIR, &format!("{}/{}", BUNDLE_DIR, PUBLIC_DIR))?;
    debug!("📦 Bundle written to {} ({} assets)", root.display(), assets);

    Ok(Bundle {
        root,
        page: BUNDLE_PAGE.to_string(),
        assets,
    })
}

/// Resolved composition metadata; authoritative for capture and encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedComposition {
    pub id: &'static str,
    pub duration_in_frames: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

/// Look up a registered composition id and resolve its timing against the spec
pub fn select_composition(id: &str, spec: &RenderSpec) -> Result<SelectedComposition> {
    let id = COMPOSITION_IDS
        .iter()
        .copied()
        .find(|known| *known == id)
        .ok_or_else(|| {
            RenderError::execution(format!(
                "Composition not found: {} (registered: {})",
                id,
                COMPOSITION_IDS.join(", ")
            ))
        })?;

    Ok(SelectedComposition {
        id,
        duration_in_frames: spec.total_frames(),
        fps: spec.fps,
        width: spec.width,
        height: spec.height,
    })
}
