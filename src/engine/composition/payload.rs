//! Composition payload: the typed tree the composition page renders frame by frame

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::csv::Table;
use crate::anim::{Ease, OpacityWindow};
use crate::error::{RenderError, Result};
use crate::spec::RenderSpec;
use crate::theme::Palette;
use crate::workspace::Workspace;

/// Ids of the registered composition roots
pub const COMPOSITION_IDS: [&str; 3] = ["DataVideo", "StillZoom", "MapFlyover"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPayload {
    /// Composition id, one of [`COMPOSITION_IDS`]
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_in_frames: u32,
    pub theme: Palette,
    pub root: Root,
    pub overlays: Vec<Overlay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Root {
    DataVideo(DataVideo),
    StillZoom(StillZoom),
    MapFlyover(MapFlyover),
}

impl Root {
    pub fn composition_id(&self) -> &'static str {
        match self {
            Root::DataVideo(_) => "DataVideo",
            Root::StillZoom(_) => "StillZoom",
            Root::MapFlyover(_) => "MapFlyover",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVideo {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub items: Vec<String>,
    pub table: Option<Table>,
}

/// Zoom-and-pan over a still image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillZoom {
    /// Image path relative to the bundle root
    pub image: String,
    #[serde(skip)]
    pub source: PathBuf,
    /// Normalized focus point the camera zooms towards
    pub focus: [f64; 2],
    pub zoom_from: f64,
    pub zoom_to: f64,
}

/// Camera state at one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
    pub label: Option<String>,
    /// Frame at which the camera arrives
    pub frame: u32,
    pub label_window: OpacityWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFlyover {
    pub image: String,
    #[serde(skip)]
    pub source: PathBuf,
    pub waypoints: Vec<Waypoint>,
    pub trail_color: String,
}

impl MapFlyover {
    /// Camera position and zoom at `frame`, eased between the bracketing waypoints
    pub fn camera_at(&self, frame: u32) -> Camera {
        let (first, last) = match (self.waypoints.first(), self.waypoints.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Camera { x: 0.5, y: 0.5, zoom: 1.0 },
        };
        if frame <= first.frame {
            return first.camera();
        }
        if frame >= last.frame {
            return last.camera();
        }

        for pair in self.waypoints.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if frame == b.frame {
                return b.camera();
            }
            if frame >= a.frame && frame < b.frame {
                let span = (b.frame - a.frame).max(1) as f64;
                let t = Ease::InOutCubic.apply((frame - a.frame) as f64 / span);
                return Camera {
                    x: a.x + (b.x - a.x) * t,
                    y: a.y + (b.y - a.y) * t,
                    zoom: a.zoom + (b.zoom - a.zoom) * t,
                };
            }
        }
        last.camera()
    }
}

impl Waypoint {
    fn camera(&self) -> Camera {
        Camera {
            x: self.x,
            y: self.y,
            zoom: self.zoom,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarPosition {
    Top,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Overlay {
    TitleCard {
        title: String,
        subtitle: Option<String>,
        window: OpacityWindow,
    },
    LowerThird {
        title: String,
        subtitle: Option<String>,
        window: OpacityWindow,
    },
    Chapter {
        title: String,
        index: usize,
        window: OpacityWindow,
    },
    QuoteCard {
        text: String,
        author: Option<String>,
        window: OpacityWindow,
    },
    ProgressBar {
        position: BarPosition,
        color: String,
    },
}

impl Overlay {
    pub fn window(&self) -> Option<&OpacityWindow> {
        match self {
            Overlay::TitleCard { window, .. }
            | Overlay::LowerThird { window, .. }
            | Overlay::Chapter { window, .. }
            | Overlay::QuoteCard { window, .. } => Some(window),
            Overlay::ProgressBar { .. } => None,
        }
    }
}

// Raw data shapes accepted from the spec

#[derive(Debug, Deserialize)]
struct BoundingBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct ZoomRange {
    from: f64,
    to: f64,
}

#[derive(Debug, Deserialize)]
struct RawWaypoint {
    x: f64,
    y: f64,
    #[serde(default)]
    zoom: Option<f64>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMap {
    image_path: PathBuf,
    waypoints: Vec<RawWaypoint>,
    #[serde(default)]
    trail_color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCard {
    #[serde(alias = "name")]
    title: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    title: String,
    #[serde(default)]
    at: f64,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    text: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProgressBar {
    #[serde(default)]
    position: BarPosition,
    #[serde(default)]
    color: Option<String>,
}

const FADE_SECS: f64 = 0.5;

fn field<T: DeserializeOwned>(spec: &RenderSpec, key: &str) -> Result<Option<T>> {
    match spec.data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| RenderError::InvalidSpec(format!("{}: {}", key, e))),
    }
}

impl CompositionPayload {
    /// Parse and validate the payload. Referenced files are checked but not copied.
    pub fn build(spec: &RenderSpec) -> Result<Self> {
        let total_frames = spec.total_frames();
        let palette = Palette::named(&spec.theme);

        let root = if spec.data.contains_key("map") {
            Root::MapFlyover(map_flyover(spec, total_frames, &palette)?)
        } else if let Some(path) = spec.str_field("image_path") {
            Root::StillZoom(still_zoom(spec, Path::new(path))?)
        } else {
            Root::DataVideo(data_video(spec)?)
        };

        let overlays = overlays(spec, total_frames, &palette)?;

        Ok(Self {
            id: root.composition_id().to_string(),
            width: spec.width,
            height: spec.height,
            fps: spec.fps,
            duration_in_frames: total_frames,
            theme: palette,
            root,
            overlays,
        })
    }

    /// Copy referenced images into the workspace `public/` folder
    pub fn stage_assets(&self, workspace: &Workspace) -> Result<usize> {
        let source = match &self.root {
            Root::StillZoom(zoom) => &zoom.source,
            Root::MapFlyover(map) => &map.source,
            Root::DataVideo(_) => return Ok(0),
        };
        workspace.copy_asset(source)?;
        Ok(1)
    }
}

fn data_video(spec: &RenderSpec) -> Result<DataVideo> {
    let items = match spec.data.get("items") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => ["label", "title", "name"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let table = match spec.str_field("csv_path") {
        Some(path) => Some(Table::read(Path::new(path))?),
        None => None,
    };

    Ok(DataVideo {
        title: spec.str_field("title").map(str::to_string),
        subtitle: spec.str_field("subtitle").map(str::to_string),
        items,
        table,
    })
}

fn still_zoom(spec: &RenderSpec, source: &Path) -> Result<StillZoom> {
    let image = Workspace::asset_path(source)?;
    let bbox: Option<BoundingBox> = field(spec, "bbox")?;
    let zoom: Option<ZoomRange> = field(spec, "zoom")?;

    let focus = match &bbox {
        Some(b) => [
            (b.x + b.width / 2.0).clamp(0.0, 1.0),
            (b.y + b.height / 2.0).clamp(0.0, 1.0),
        ],
        None => [0.5, 0.5],
    };

    let (zoom_from, zoom_to) = match (zoom, &bbox) {
        (Some(range), _) => (range.from, range.to),
        (None, Some(b)) => {
            let extent = b.width.max(b.height).max(1e-3);
            (1.0, 0.8 / extent)
        }
        (None, None) => (1.0, 1.2),
    };

    Ok(StillZoom {
        image,
        source: source.to_path_buf(),
        focus,
        zoom_from: zoom_from.clamp(1.0, 4.0),
        zoom_to: zoom_to.clamp(1.0, 4.0),
    })
}

fn map_flyover(
    spec: &RenderSpec,
    total_frames: u32,
    palette: &Palette,
) -> Result<MapFlyover> {
    let raw: RawMap = field(spec, "map")?.ok_or(RenderError::MissingField("map"))?;
    if raw.waypoints.len() < 2 {
        return Err(RenderError::InvalidSpec(format!(
            "map needs at least 2 waypoints, got {}",
            raw.waypoints.len()
        )));
    }

    let image = Workspace::asset_path(&raw.image_path)?;
    let last = total_frames.saturating_sub(1);
    let segments = (raw.waypoints.len() - 1) as f64;
    let segment_secs = spec.duration / segments;

    let waypoints = raw
        .waypoints
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            let frame = (i as f64 * last as f64 / segments).round() as u32;
            let arrive = frame as f64 / spec.fps as f64;
            Waypoint {
                x: w.x.clamp(0.0, 1.0),
                y: w.y.clamp(0.0, 1.0),
                zoom: w.zoom.unwrap_or(1.5).clamp(1.0, 4.0),
                label: w.label,
                frame,
                label_window: OpacityWindow::from_seconds(
                    arrive - 0.3,
                    arrive + segment_secs * 0.8,
                    0.3,
                    spec.fps,
                    total_frames,
                ),
            }
        })
        .collect();

    Ok(MapFlyover {
        image,
        source: raw.image_path,
        waypoints,
        trail_color: raw.trail_color.unwrap_or_else(|| palette.accent.clone()),
    })
}

fn card_window(
    card_start: Option<f64>,
    card_length: Option<f64>,
    start: f64,
    length: f64,
    spec: &RenderSpec,
) -> OpacityWindow {
    let start = card_start.unwrap_or(start);
    let end = start + card_length.unwrap_or(length);
    OpacityWindow::from_seconds(start, end, FADE_SECS, spec.fps, spec.total_frames())
}

fn overlays(spec: &RenderSpec, total_frames: u32, palette: &Palette) -> Result<Vec<Overlay>> {
    let duration = spec.duration;
    let mut overlays = Vec::new();

    if let Some(card) = field::<RawCard>(spec, "title_card")? {
        overlays.push(Overlay::TitleCard {
            window: card_window(card.start, card.duration, 0.0, (duration * 0.4).min(3.0), spec),
            title: card.title,
            subtitle: card.subtitle,
        });
    }

    if let Some(card) = field::<RawCard>(spec, "lower_third")? {
        overlays.push(Overlay::LowerThird {
            window: card_window(
                card.start,
                card.duration,
                (duration * 0.1).min(1.0),
                (duration * 0.5).min(4.0),
                spec,
            ),
            title: card.title,
            subtitle: card.subtitle,
        });
    }

    if let Some(mut chapters) = field::<Vec<RawChapter>>(spec, "chapters")? {
        chapters.sort_by(|a, b| a.at.total_cmp(&b.at));
        let ends: Vec<f64> = chapters
            .iter()
            .skip(1)
            .map(|c| c.at)
            .chain(std::iter::once(duration))
            .collect();
        for (index, (chapter, end)) in chapters.into_iter().zip(ends).enumerate() {
            overlays.push(Overlay::Chapter {
                window: OpacityWindow::from_seconds(
                    chapter.at,
                    end.min(chapter.at + 3.0),
                    FADE_SECS,
                    spec.fps,
                    total_frames,
                ),
                title: chapter.title,
                index,
            });
        }
    }

    if let Some(quote) = field::<RawQuote>(spec, "quote_card")? {
        overlays.push(Overlay::QuoteCard {
            window: card_window(
                quote.start,
                quote.duration,
                duration * 0.5,
                (duration * 0.4).min(4.0),
                spec,
            ),
            text: quote.text,
            author: quote.author,
        });
    }

    let bar = match spec.data.get("progress_bar") {
        Some(Value::Bool(true)) => Some(RawProgressBar::default()),
        Some(Value::Bool(false)) | None => None,
        Some(_) => field::<RawProgressBar>(spec, "progress_bar")?,
    };
    if let Some(bar) = bar {
        overlays.push(Overlay::ProgressBar {
            position: bar.position,
            color: bar.color.unwrap_or_else(|| palette.accent.clone()),
        });
    }

    Ok(overlays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecDefaults;
    use crate::spec::SubmitRequest;
    use serde_json::json;

    fn spec(data: Value) -> RenderSpec {
        SubmitRequest::new("composition", data)
            .into_spec(&SpecDefaults::default())
            .unwrap()
    }

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let root = tempfile::TempDir::new().unwrap();
        let workspace = Workspace::create(&root.path().join("ws"), "composition", false).unwrap();
        (root, workspace)
    }

    #[test]
    fn test_data_video_with_csv() {
        let root = tempfile::TempDir::new().unwrap();
        let csv = root.path().join("table.csv");
        std::fs::write(&csv, "name,score\nada,3\n").unwrap();

        let payload = CompositionPayload::build(&spec(json!({
            "title": "Scores",
            "items": ["one", { "label": "two" }],
            "csv_path": csv.to_string_lossy()
        })))
        .unwrap();

        assert_eq!(payload.id, "DataVideo");
        assert_eq!(payload.duration_in_frames, 150);
        match payload.root {
            Root::DataVideo(data) => {
                assert_eq!(data.items, vec!["one", "two"]);
                assert_eq!(data.table.unwrap().rows[0], vec!["ada", "3"]);
            }
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_still_zoom_from_bbox() {
        let (root, workspace) = workspace();
        let image = root.path().join("photo.png");
        std::fs::write(&image, b"png").unwrap();

        let payload = CompositionPayload::build(&spec(json!({
            "image_path": image.to_string_lossy(),
            "bbox": { "x": 0.5, "y": 0.2, "width": 0.2, "height": 0.4 }
        })))
        .unwrap();
        assert_eq!(payload.stage_assets(&workspace).unwrap(), 1);

        match payload.root {
            Root::StillZoom(zoom) => {
                assert!(zoom.image.starts_with("public/"));
                assert!(workspace.join(&zoom.image).is_file());
                assert!((zoom.focus[0] - 0.6).abs() < 1e-9);
                assert!((zoom.focus[1] - 0.4).abs() < 1e-9);
                assert_eq!(zoom.zoom_from, 1.0);
                assert!((zoom.zoom_to - 2.0).abs() < 1e-9);
            }
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_missing_image_is_rejected() {
        let err = CompositionPayload::build(&spec(json!({ "image_path": "/no/such/image.png" })))
            .unwrap_err();
        assert!(err.to_string().contains("asset not found"));
    }

    fn flyover(waypoints: Value) -> Result<CompositionPayload> {
        let root = tempfile::TempDir::new().unwrap();
        let image = root.path().join("map.jpg");
        std::fs::write(&image, b"jpg").unwrap();
        CompositionPayload::build(&spec(json!({
            "map": { "image_path": image.to_string_lossy(), "waypoints": waypoints }
        })))
    }

    #[test]
    fn test_map_flyover_waypoints_evenly_timed() {
        let payload = flyover(json!([
            { "x": 0.1, "y": 0.1, "zoom": 1.0, "label": "Start" },
            { "x": 0.5, "y": 0.5, "zoom": 2.0 },
            { "x": 0.9, "y": 0.3, "zoom": 1.0, "label": "End" }
        ]))
        .unwrap();

        let map = match payload.root {
            Root::MapFlyover(map) => map,
            other => panic!("unexpected root {:?}", other),
        };
        let frames: Vec<u32> = map.waypoints.iter().map(|w| w.frame).collect();
        assert_eq!(frames, vec![0, 75, 149]);

        let start = map.camera_at(0);
        assert_eq!((start.x, start.y), (0.1, 0.1));
        let mid = map.camera_at(75);
        assert_eq!((mid.x, mid.y, mid.zoom), (0.5, 0.5, 2.0));
        let between = map.camera_at(37);
        assert!(between.x > 0.1 && between.x < 0.5);
        assert_eq!(map.camera_at(500), map.camera_at(149));

        assert!(map.waypoints[1].label_window.opacity_at(80) > 0.0);
        assert_eq!(map.waypoints[1].label_window.opacity_at(10), 0.0);
    }

    #[test]
    fn test_map_flyover_needs_two_waypoints() {
        let err = flyover(json!([{ "x": 0.1, "y": 0.1 }])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid spec: map needs at least 2 waypoints, got 1");
    }

    #[test]
    fn test_overlay_windows() {
        let payload = CompositionPayload::build(&spec(json!({
            "title": "x",
            "title_card": { "title": "Hello" },
            "lower_third": { "name": "Ada Lovelace", "subtitle": "Mathematician" },
            "chapters": [{ "title": "Two", "at": 3.0 }, { "title": "One", "at": 0.0 }],
            "quote_card": { "text": "Hi" },
            "progress_bar": { "position": "top" }
        })))
        .unwrap();

        assert_eq!(payload.overlays.len(), 6);
        let title = payload.overlays[0].window().unwrap();
        assert_eq!((title.start, title.end), (0, 60));

        let chapter_titles: Vec<&str> = payload
            .overlays
            .iter()
            .filter_map(|o| match o {
                Overlay::Chapter { title, .. } => Some(title.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chapter_titles, vec!["One", "Two"]);

        match payload.overlays.last().unwrap() {
            Overlay::ProgressBar { position, color } => {
                assert_eq!(*position, BarPosition::Top);
                assert_eq!(color, &Palette::default().accent);
            }
            other => panic!("unexpected overlay {:?}", other),
        }
    }

    #[test]
    fn test_data_video_stages_nothing() {
        let (_root, workspace) = workspace();
        let payload = CompositionPayload::build(&spec(json!({ "items": ["a"] }))).unwrap();
        assert_eq!(payload.stage_assets(&workspace).unwrap(), 0);
        assert!(!workspace.join("public").exists());
    }

    #[test]
    fn test_progress_bar_flag() {
        let payload = CompositionPayload::build(&spec(json!({ "progress_bar": true }))).unwrap();
        assert!(matches!(
            payload.overlays.as_slice(),
            [Overlay::ProgressBar { position: BarPosition::Bottom, .. }]
        ));
    }
}
