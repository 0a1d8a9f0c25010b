//! Scene program DSL interpreted by the motion harness page.
//!
//! A program is a flat list of nodes drawn back to front on a canvas. Each node
//! is a shape with a static style and any number of keyframed [`Track`]s.

use serde::{Deserialize, Serialize};

use crate::anim::{Ease, Property, Track};
use crate::error::{RenderError, Result};

/// Complete animation handed to the harness page as `program.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneProgram {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Seconds
    pub duration: f64,
    pub background: String,
    pub nodes: Vec<Node>,
}

impl SceneProgram {
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(RenderError::InvalidSpec("scene has no nodes".into()));
        }
        for node in &self.nodes {
            for track in &node.tracks {
                if track.keyframes.windows(2).any(|w| w[1].t < w[0].t) {
                    return Err(RenderError::InvalidSpec(format!(
                        "keyframes out of order on {:?} track",
                        track.property
                    )));
                }
            }
        }
        Ok(())
    }

    /// Nodes of a given shape kind, in draw order
    pub fn nodes_of(&self, kind: &str) -> impl Iterator<Item = &Node> {
        let kind = kind.to_string();
        self.nodes.iter().filter(move |n| n.shape.kind() == kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

/// Direction a rect grows in as its `progress` track goes from 0 to 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grow {
    #[default]
    Right,
    Up,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShape {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub size: f64,
    #[serde(default)]
    pub align: Align,
    #[serde(default = "default_weight")]
    pub weight: u16,
    /// Blinking caret after the revealed characters
    #[serde(default)]
    pub cursor: bool,
}

/// Number animated from `from` to `to` by the node's `progress` track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterShape {
    pub x: f64,
    pub y: f64,
    pub from: f64,
    pub to: f64,
    pub decimals: u32,
    pub prefix: String,
    pub suffix: String,
    pub size: f64,
    #[serde(default)]
    pub align: Align,
}

fn default_weight() -> u16 {
    400
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        radius: f64,
        #[serde(default)]
        grow: Grow,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Polyline {
        points: Vec<[f64; 2]>,
    },
    /// Angles in degrees, 0 at three o'clock, clockwise
    Arc {
        cx: f64,
        cy: f64,
        r: f64,
        start_angle: f64,
        sweep: f64,
        /// Filled pie wedge instead of a stroked arc
        #[serde(default)]
        wedge: bool,
    },
    Text(TextShape),
    Counter(CounterShape),
    /// Full-frame film grain
    Noise {
        amount: f64,
    },
    /// Full-frame horizontal scanlines
    Scanlines {
        spacing: f64,
    },
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Rect { .. } => "rect",
            Shape::Circle { .. } => "circle",
            Shape::Line { .. } => "line",
            Shape::Polyline { .. } => "polyline",
            Shape::Arc { .. } => "arc",
            Shape::Text(_) => "text",
            Shape::Counter(_) => "counter",
            Shape::Noise { .. } => "noise",
            Shape::Scanlines { .. } => "scanlines",
        }
    }

    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Shape::Rect {
            x,
            y,
            width,
            height,
            radius: 0.0,
            grow: Grow::Right,
        }
    }

    pub fn rounded(x: f64, y: f64, width: f64, height: f64, radius: f64) -> Self {
        Shape::Rect {
            x,
            y,
            width,
            height,
            radius,
            grow: Grow::Right,
        }
    }

    /// Bar anchored at its bottom edge that grows upwards
    pub fn bar(x: f64, bottom: f64, width: f64, height: f64) -> Self {
        Shape::Rect {
            x,
            y: bottom - height,
            width,
            height,
            radius: 0.0,
            grow: Grow::Up,
        }
    }

    pub fn circle(cx: f64, cy: f64, r: f64) -> Self {
        Shape::Circle { cx, cy, r }
    }

    pub fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Shape::Line { x1, y1, x2, y2 }
    }

    pub fn arc(cx: f64, cy: f64, r: f64, start_angle: f64, sweep: f64) -> Self {
        Shape::Arc {
            cx,
            cy,
            r,
            start_angle,
            sweep,
            wedge: false,
        }
    }

    pub fn wedge(cx: f64, cy: f64, r: f64, start_angle: f64, sweep: f64) -> Self {
        Shape::Arc {
            cx,
            cy,
            r,
            start_angle,
            sweep,
            wedge: true,
        }
    }

    pub fn text(x: f64, y: f64, text: impl Into<String>, size: f64) -> Self {
        Shape::Text(TextShape {
            x,
            y,
            text: text.into(),
            size,
            align: Align::Center,
            weight: default_weight(),
            cursor: false,
        })
    }

    pub fn heading(x: f64, y: f64, text: impl Into<String>, size: f64) -> Self {
        Shape::Text(TextShape {
            x,
            y,
            text: text.into(),
            size,
            align: Align::Center,
            weight: 700,
            cursor: false,
        })
    }

    pub fn text_aligned(x: f64, y: f64, text: impl Into<String>, size: f64, align: Align) -> Self {
        Shape::Text(TextShape {
            x,
            y,
            text: text.into(),
            size,
            align,
            weight: default_weight(),
            cursor: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default)]
    pub stroke_width: f64,
    /// Base opacity, multiplied with any opacity track
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            stroke_width: 0.0,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub shape: Shape,
    #[serde(default)]
    pub style: Style,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<Track>,
}

impl Node {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            style: Style::default(),
            tracks: Vec::new(),
        }
    }

    pub fn fill(mut self, color: &str) -> Self {
        self.style.fill = Some(color.to_string());
        self
    }

    pub fn stroke(mut self, color: &str, width: f64) -> Self {
        self.style.stroke = Some(color.to_string());
        self.style.stroke_width = width;
        self
    }

    pub fn opacity(mut self, opacity: f64) -> Self {
        self.style.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn fade_in(self, start: f64, length: f64) -> Self {
        self.track(Track::tween(Property::Opacity, start, length, 0.0, 1.0, Ease::OutCubic))
    }

    /// Visible only within `[start, end]`, with symmetric fades
    pub fn visible_between(self, start: f64, end: f64, fade: f64) -> Self {
        let end = end.max(start);
        let fade = fade.clamp(0.0, (end - start) / 2.0);
        let shown = (start + fade).min(end);
        let hiding = (end - fade).clamp(shown, end);
        self.track(
            Track::new(Property::Opacity)
                .key(start, 0.0, Ease::Linear)
                .key(shown, 1.0, Ease::OutCubic)
                .key(hiding, 1.0, Ease::Linear)
                .key(end, 0.0, Ease::InQuad),
        )
    }

    /// Animate the shape-specific reveal from 0 to 1
    pub fn reveal(self, start: f64, length: f64, ease: Ease) -> Self {
        self.track(Track::tween(Property::Progress, start, length, 0.0, 1.0, ease))
    }

    pub fn slide_x(self, start: f64, length: f64, from: f64) -> Self {
        self.track(Track::tween(Property::OffsetX, start, length, from, 0.0, Ease::OutCubic))
    }

    pub fn slide_y(self, start: f64, length: f64, from: f64, ease: Ease) -> Self {
        self.track(Track::tween(Property::OffsetY, start, length, from, 0.0, ease))
    }

    pub fn pop(self, start: f64, length: f64) -> Self {
        self.track(Track::tween(Property::Scale, start, length, 0.0, 1.0, Ease::OutBack))
    }

    pub fn track_for(&self, property: Property) -> Option<&Track> {
        self.tracks.iter().find(|t| t.property == property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_serializes_with_kind_tag() {
        let node = Node::new(Shape::bar(10.0, 100.0, 20.0, 40.0)).fill("#fff");
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["shape"]["kind"], "rect");
        assert_eq!(json["shape"]["grow"], "up");
        assert_eq!(json["shape"]["y"], 60.0);
        assert_eq!(json["style"]["fill"], "#fff");
        assert!(json.get("tracks").is_none());

        let text = serde_json::to_value(Shape::heading(0.0, 0.0, "Hi", 40.0)).unwrap();
        assert_eq!(text["kind"], "text");
        assert_eq!(text["weight"], 700);
    }

    #[test]
    fn test_visible_between_envelope() {
        let node = Node::new(Shape::circle(0.0, 0.0, 1.0)).visible_between(1.0, 3.0, 0.5);
        let opacity = node.track_for(Property::Opacity).unwrap();

        assert_eq!(opacity.sample(0.5), 0.0);
        assert_eq!(opacity.sample(2.0), 1.0);
        assert_eq!(opacity.sample(3.5), 0.0);
    }

    #[test]
    fn test_visible_between_tiny_slots_stay_ordered() {
        let slot = 0.1 / 61.0;
        for i in 0..61 {
            let start = slot * i as f64;
            let node = Node::new(Shape::circle(0.0, 0.0, 1.0)).visible_between(start, start + slot, 0.15);
            let keys = &node.track_for(Property::Opacity).unwrap().keyframes;
            assert!(keys.windows(2).all(|w| w[0].t <= w[1].t), "slot {}", i);
        }
    }

    #[test]
    fn test_validate_rejects_empty_scene() {
        let program = SceneProgram {
            width: 100,
            height: 100,
            fps: 30,
            duration: 1.0,
            background: "#000".into(),
            nodes: vec![],
        };
        assert!(program.validate().is_err());
    }
}
