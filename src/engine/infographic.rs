//! Vector Synthesis Engine: lays out structured data geometrically and emits a
//! standalone SVG document. No external process is involved.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::{artifact_name, RenderEngine, RenderResult};
use crate::error::Result;
use crate::spec::RenderSpec;
use crate::theme::Palette;

/// Layout templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Left-to-right sequence of numbered step markers
    Steps,
    /// One row per item
    List,
    /// Two headed columns of paired entries
    Comparison,
}

impl Template {
    /// Unrecognized names fall back to [`Template::Steps`]
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_lowercase()).as_deref() {
            Some("list") | Some("rows") => Template::List,
            Some("comparison") | Some("versus") | Some("compare") => Template::Comparison,
            _ => Template::Steps,
        }
    }
}

/// One labelled entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    pub label: String,
    pub description: Option<String>,
    pub value: Option<String>,
}

/// Structured content pulled leniently from `data`
#[derive(Debug, Clone, Default)]
pub struct InfographicData {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub items: Vec<Item>,
    pub pairs: Vec<(String, String)>,
    pub left_title: String,
    pub right_title: String,
}

impl InfographicData {
    pub fn from_map(data: &Map<String, Value>) -> Self {
        let items = data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(item_from_value).collect())
            .unwrap_or_default();

        let pairs = data
            .get("pairs")
            .and_then(Value::as_array)
            .map(|pairs| pairs.iter().filter_map(pair_from_value).collect())
            .unwrap_or_default();

        Self {
            title: text_field(data, "title"),
            subtitle: text_field(data, "subtitle"),
            items,
            pairs,
            left_title: text_field(data, "left_title").unwrap_or_else(|| "Before".to_string()),
            right_title: text_field(data, "right_title").unwrap_or_else(|| "After".to_string()),
        }
    }
}

fn text_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn item_from_value(value: &Value) -> Option<Item> {
    match value {
        Value::Object(obj) => {
            let label = ["label", "title", "name"]
                .iter()
                .find_map(|key| text_field(obj, key))?;
            Some(Item {
                label,
                description: text_field(obj, "description"),
                value: text_field(obj, "value"),
            })
        }
        other => value_text(other).map(|label| Item {
            label,
            ..Item::default()
        }),
    }
}

fn pair_from_value(value: &Value) -> Option<(String, String)> {
    match value {
        Value::Object(obj) => Some((
            text_field(obj, "left").unwrap_or_default(),
            text_field(obj, "right").unwrap_or_default(),
        )),
        Value::Array(arr) if arr.len() == 2 => Some((
            value_text(&arr[0]).unwrap_or_default(),
            value_text(&arr[1]).unwrap_or_default(),
        )),
        _ => None,
    }
}

/// Escape text for embedding in XML content or attributes.
///
/// Characters XML 1.0 cannot carry at all (most C0 controls, U+FFFE, U+FFFF) are dropped.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\t' | '\n' | '\r' => escaped.push(ch),
            '\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => {}
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Geometry of one step marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMarker {
    pub cx: f64,
    pub cy: f64,
    pub r: f64,
}

/// Computed geometry for the steps template
#[derive(Debug, Clone, PartialEq)]
pub struct StepLayout {
    pub padding: f64,
    pub slot_width: f64,
    pub markers: Vec<StepMarker>,
}

impl StepLayout {
    pub fn compute(width: u32, height: u32, count: usize) -> Self {
        let (w, h) = (width as f64, height as f64);
        let padding = w * 0.06;
        let slot_width = if count == 0 {
            0.0
        } else {
            (w - 2.0 * padding) / count as f64
        };
        let r = (slot_width * 0.3).min(h * 0.12);
        let markers = (0..count)
            .map(|i| StepMarker {
                cx: padding + slot_width * (i as f64 + 0.5),
                cy: h * 0.5,
                r,
            })
            .collect();

        Self {
            padding,
            slot_width,
            markers,
        }
    }
}

/// Render a complete SVG document
pub fn render_svg(
    template: Template,
    data: &InfographicData,
    palette: &Palette,
    width: u32,
    height: u32,
) -> String {
    let (w, h) = (width as f64, height as f64);
    let mut svg = String::new();
    svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\" font-family=\"Helvetica, Arial, sans-serif\">\n",
        width, height, width, height
    ));
    svg.push_str(&format!(
        "  <rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"{}\"/>\n",
        width, height, palette.background
    ));

    if let Some(title) = &data.title {
        svg.push_str(&format!(
            "  <text class=\"title\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"700\" text-anchor=\"middle\" fill=\"{}\">{}</text>\n",
            w / 2.0,
            h * 0.12,
            h * 0.06,
            palette.text,
            escape_xml(title)
        ));
    }
    if let Some(subtitle) = &data.subtitle {
        svg.push_str(&format!(
            "  <text class=\"subtitle\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" text-anchor=\"middle\" fill=\"{}\">{}</text>\n",
            w / 2.0,
            h * 0.18,
            h * 0.03,
            palette.secondary,
            escape_xml(subtitle)
        ));
    }

    match template {
        Template::Steps => render_steps(&mut svg, data, palette, width, height),
        Template::List => render_list(&mut svg, data, palette, width, height),
        Template::Comparison => render_comparison(&mut svg, data, palette, width, height),
    }

    svg.push_str("</svg>\n");
    svg
}

fn render_steps(svg: &mut String, data: &InfographicData, palette: &Palette, width: u32, height: u32) {
    let h = height as f64;
    let layout = StepLayout::compute(width, height, data.items.len());
    let label_size = (h * 0.035).min(layout.slot_width * 0.12).max(8.0);

    for pair in layout.markers.windows(2) {
        svg.push_str(&format!(
            "  <line class=\"connector\" x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"{:.1}\"/>\n",
            pair[0].cx + pair[0].r,
            pair[0].cy,
            pair[1].cx - pair[1].r,
            pair[1].cy,
            palette.secondary,
            (h * 0.006).max(1.0)
        ));
    }

    for (index, (marker, item)) in layout.markers.iter().zip(&data.items).enumerate() {
        svg.push_str("  <g class=\"step\">\n");
        svg.push_str(&format!(
            "    <circle class=\"step-marker\" cx=\"{:.1}\" cy=\"{:.1}\" r=\"{:.1}\" fill=\"{}\"/>\n",
            marker.cx, marker.cy, marker.r, palette.primary
        ));
        svg.push_str(&format!(
            "    <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"700\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
            marker.cx,
            marker.cy,
            marker.r * 0.8,
            palette.background,
            index + 1
        ));
        if let Some(value) = &item.value {
            svg.push_str(&format!(
                "    <text class=\"value\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" text-anchor=\"middle\" fill=\"{}\">{}</text>\n",
                marker.cx,
                marker.cy - marker.r - h * 0.03,
                label_size,
                palette.accent,
                escape_xml(value)
            ));
        }
        let label_y = marker.cy + marker.r + h * 0.07;
        svg.push_str(&format!(
            "    <text class=\"label\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"600\" text-anchor=\"middle\" fill=\"{}\">{}</text>\n",
            marker.cx,
            label_y,
            label_size,
            palette.text,
            escape_xml(&item.label)
        ));
        if let Some(description) = &item.description {
            svg.push_str(&format!(
                "    <text class=\"description\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" text-anchor=\"middle\" fill=\"{}\">{}</text>\n",
                marker.cx,
                label_y + label_size * 1.5,
                label_size * 0.75,
                palette.secondary,
                escape_xml(description)
            ));
        }
        svg.push_str("  </g>\n");
    }
}

fn render_list(svg: &mut String, data: &InfographicData, palette: &Palette, width: u32, height: u32) {
    let (w, h) = (width as f64, height as f64);
    let padding = w * 0.06;
    let top = if data.subtitle.is_some() { h * 0.24 } else { h * 0.2 };
    let count = data.items.len().max(1) as f64;
    let row_height = ((h - top - padding) / count).min(h * 0.14);
    let gap = row_height * 0.15;
    let font = (row_height * 0.32).max(8.0);

    for (index, item) in data.items.iter().enumerate() {
        let y = top + row_height * index as f64;
        let row_h = row_height - gap;
        let badge_r = row_h * 0.32;
        let text_x = padding + row_h;

        svg.push_str("  <g class=\"item-row\">\n");
        svg.push_str(&format!(
            "    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" fill=\"{}\" fill-opacity=\"0.12\"/>\n",
            padding,
            y,
            w - 2.0 * padding,
            row_h,
            row_h * 0.2,
            palette.primary
        ));
        svg.push_str(&format!(
            "    <circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"{:.1}\" fill=\"{}\"/>\n",
            padding + row_h * 0.5,
            y + row_h * 0.5,
            badge_r,
            palette.primary
        ));
        svg.push_str(&format!(
            "    <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"700\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
            padding + row_h * 0.5,
            y + row_h * 0.5,
            badge_r,
            palette.background,
            index + 1
        ));

        let label_y = if item.description.is_some() {
            y + row_h * 0.42
        } else {
            y + row_h * 0.5
        };
        svg.push_str(&format!(
            "    <text class=\"label\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"600\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
            text_x,
            label_y,
            font,
            palette.text,
            escape_xml(&item.label)
        ));
        if let Some(description) = &item.description {
            svg.push_str(&format!(
                "    <text class=\"description\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
                text_x,
                y + row_h * 0.75,
                font * 0.7,
                palette.secondary,
                escape_xml(description)
            ));
        }
        if let Some(value) = &item.value {
            svg.push_str(&format!(
                "    <text class=\"value\" x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"700\" text-anchor=\"end\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
                w - padding - row_h * 0.3,
                y + row_h * 0.5,
                font,
                palette.accent,
                escape_xml(value)
            ));
        }
        svg.push_str("  </g>\n");
    }
}

fn render_comparison(
    svg: &mut String,
    data: &InfographicData,
    palette: &Palette,
    width: u32,
    height: u32,
) {
    let (w, h) = (width as f64, height as f64);
    let padding = w * 0.06;
    let column_width = (w - 3.0 * padding) / 2.0;
    let columns = [
        (padding, &data.left_title, &palette.primary),
        (2.0 * padding + column_width, &data.right_title, &palette.secondary),
    ];
    let header_y = h * 0.24;
    let header_h = h * 0.09;

    for (x, title, color) in columns {
        svg.push_str(&format!(
            "  <rect class=\"column-header\" x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"{:.1}\" fill=\"{}\"/>\n",
            x,
            header_y,
            column_width,
            header_h,
            header_h * 0.2,
            color
        ));
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" font-weight=\"700\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
            x + column_width / 2.0,
            header_y + header_h / 2.0,
            header_h * 0.45,
            palette.background,
            escape_xml(title)
        ));
    }

    let top = header_y + header_h * 1.3;
    let count = data.pairs.len().max(1) as f64;
    let row_height = ((h - top - padding) / count).min(h * 0.12);
    let font = (row_height * 0.35).max(8.0);

    for (index, (left, right)) in data.pairs.iter().enumerate() {
        let y = top + row_height * index as f64;
        svg.push_str("  <g class=\"pair-row\">\n");
        for (x, text) in [(columns[0].0, left), (columns[1].0, right)] {
            svg.push_str(&format!(
                "    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"8\" fill=\"{}\" fill-opacity=\"0.1\"/>\n",
                x,
                y,
                column_width,
                row_height * 0.85,
                palette.text
            ));
            svg.push_str(&format!(
                "    <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{:.1}\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>\n",
                x + column_width / 2.0,
                y + row_height * 0.425,
                font,
                palette.text,
                escape_xml(text)
            ));
        }
        svg.push_str("  </g>\n");
    }

    // divider between the columns
    svg.push_str(&format!(
        "  <line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"2\" stroke-dasharray=\"8 6\"/>\n",
        w / 2.0,
        header_y,
        w / 2.0,
        h - padding,
        palette.accent
    ));
}

/// Deterministic SVG renderer
#[derive(Debug, Default)]
pub struct InfographicEngine;

impl InfographicEngine {
    pub fn new() -> Self {
        Self
    }

    async fn try_render(&self, spec: &RenderSpec, output_dir: &Path) -> Result<PathBuf> {
        let template = Template::parse(spec.template_name());
        let palette = Palette::named(&spec.theme);
        let data = InfographicData::from_map(&spec.data);

        info!(
            "📐 Synthesizing {:?} infographic ({} items, theme {})",
            template,
            data.items.len(),
            palette.name
        );
        let svg = render_svg(template, &data, &palette, spec.width, spec.height);

        tokio::fs::create_dir_all(output_dir).await?;
        let output_path = output_dir.join(artifact_name(self.name(), "svg"));
        tokio::fs::write(&output_path, svg).await?;
        Ok(output_path)
    }
}

#[async_trait]
impl RenderEngine for InfographicEngine {
    fn name(&self) -> &'static str {
        "infographic"
    }

    async fn render(&self, spec: &RenderSpec, output_dir: &Path) -> RenderResult {
        match self.try_render(spec, output_dir).await {
            Ok(path) => {
                info!("✅ Infographic written: {}", path.display());
                RenderResult::ok(path)
            }
            Err(e) => {
                error!("❌ Infographic render failed: {}", e);
                RenderResult::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecDefaults;
    use crate::spec::SubmitRequest;
    use serde_json::json;

    fn data(value: Value) -> InfographicData {
        InfographicData::from_map(value.as_object().unwrap())
    }

    fn parse_svg(svg: &str) {
        usvg::Tree::from_str(svg, &usvg::Options::default()).expect("well-formed svg");
    }

    #[test]
    fn test_steps_layout_left_to_right_without_overlap() {
        for count in 1..=12 {
            let layout = StepLayout::compute(1920, 1080, count);
            assert_eq!(layout.markers.len(), count);
            for pair in layout.markers.windows(2) {
                assert!(pair[0].cx < pair[1].cx);
                assert!(pair[0].cx + pair[0].r < pair[1].cx - pair[1].r);
            }
            let first = layout.markers.first().unwrap();
            let last = layout.markers.last().unwrap();
            assert!(first.cx - first.r >= layout.padding);
            assert!(last.cx + last.r <= 1920.0 - layout.padding);
        }
    }

    #[test]
    fn test_steps_document_has_one_marker_per_item() {
        let content = data(json!({
            "title": "Pipeline",
            "items": [
                {"label": "Plan", "description": "scope"},
                {"label": "Build", "value": 42},
                "Ship"
            ]
        }));
        let svg = render_svg(Template::Steps, &content, &Palette::default(), 1280, 720);

        assert_eq!(svg.matches("class=\"step-marker\"").count(), 3);
        parse_svg(&svg);
    }

    #[test]
    fn test_list_rows() {
        let content = data(json!({"items": [{"label": "A"}, {"label": "B"}]}));
        let svg = render_svg(Template::List, &content, &Palette::named("dark"), 1920, 1080);
        assert_eq!(svg.matches("class=\"item-row\"").count(), 2);
        parse_svg(&svg);
    }

    #[test]
    fn test_comparison_pairs() {
        let content = data(json!({
            "left_title": "Old",
            "right_title": "New",
            "pairs": [{"left": "slow", "right": "fast"}, ["manual", "automatic"]]
        }));
        let svg = render_svg(Template::Comparison, &content, &Palette::default(), 1920, 1080);
        assert_eq!(svg.matches("class=\"pair-row\"").count(), 2);
        assert!(svg.contains(">Old<"));
        parse_svg(&svg);
    }

    #[test]
    fn test_user_text_is_escaped() {
        let content = data(json!({
            "title": "<script>alert('x')</script> & co",
            "items": [{"label": "a \"quoted\" <b>"}]
        }));
        let svg = render_svg(Template::Steps, &content, &Palette::default(), 800, 600);
        assert!(!svg.contains("<script>"));
        assert!(svg.contains("&lt;script&gt;"));
        assert!(svg.contains("&amp; co"));
        parse_svg(&svg);
    }

    #[test]
    fn test_control_characters_are_dropped() {
        assert_eq!(escape_xml("a\u{1}b\u{b}c\u{ffff}"), "abc");
        assert_eq!(escape_xml("tab\there\nnext"), "tab\there\nnext");

        let content = data(json!({
            "title": "bell\u{7}",
            "items": [{"label": "a\u{1}b", "description": "form\u{c}feed"}]
        }));
        for template in [Template::Steps, Template::List, Template::Comparison] {
            let svg = render_svg(template, &content, &Palette::default(), 800, 600);
            assert!(svg.contains("bell"));
            parse_svg(&svg);
        }
    }

    #[test]
    fn test_unknown_template_defaults_to_steps() {
        assert_eq!(Template::parse(Some("radial")), Template::Steps);
        assert_eq!(Template::parse(None), Template::Steps);
        assert_eq!(Template::parse(Some("LIST")), Template::List);
        assert_eq!(Template::parse(Some("versus")), Template::Comparison);
    }

    #[tokio::test]
    async fn test_render_writes_svg_artifact() {
        let out = tempfile::TempDir::new().unwrap();
        let engine = InfographicEngine::new();
        let spec = SubmitRequest::new(
            "infographic",
            json!({"template": "list", "items": [{"label": "A"}, {"label": "B"}]}),
        )
        .into_spec(&SpecDefaults::default())
        .unwrap();

        let result = engine.render(&spec, out.path()).await;
        assert!(result.success, "{:?}", result.error);

        let path = result.output_path.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("infographic-"));
        let svg = std::fs::read_to_string(path).unwrap();
        assert_eq!(svg.matches("class=\"item-row\"").count(), 2);
    }

    #[tokio::test]
    async fn test_render_fails_on_unwritable_output() {
        let out = tempfile::TempDir::new().unwrap();
        let blocker = out.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let spec = SubmitRequest::new("infographic", json!({"items": ["A"]}))
            .into_spec(&SpecDefaults::default())
            .unwrap();
        let result = InfographicEngine::new().render(&spec, &blocker).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("IO error"));
    }
}
