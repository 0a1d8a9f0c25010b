//! Typed effect descriptors and effect selection from spec data

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{RenderError, Result};

/// Every effect name accepted in `data.effect`
pub const EFFECT_NAMES: [&str; 21] = [
    "items",
    "bar_chart",
    "line_chart",
    "pie_chart",
    "staircase",
    "kinetic_text",
    "counter",
    "progress_ring",
    "progress_bar",
    "countdown",
    "highlight",
    "text_transition",
    "timeline",
    "callout",
    "split_screen",
    "picture_in_picture",
    "texture",
    "typewriter",
    "checklist",
    "ticker",
    "quote",
];

/// A list entry given either as a bare string or as an object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Plain(String),
    Detailed {
        #[serde(alias = "title", alias = "name")]
        label: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_true")]
        checked: bool,
    },
}

impl Entry {
    pub fn label(&self) -> &str {
        match self {
            Entry::Plain(label) => label,
            Entry::Detailed { label, .. } => label,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Entry::Plain(_) => None,
            Entry::Detailed { description, .. } => description.as_deref(),
        }
    }

    pub fn checked(&self) -> bool {
        match self {
            Entry::Plain(_) => true,
            Entry::Detailed { checked, .. } => *checked,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ItemsEffect {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub items: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: Option<String>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Bar and line charts; `values` is shorthand for a single unnamed series
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChartEffect {
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub values: Vec<f64>,
}

impl ChartEffect {
    /// Series list with the `values` shorthand folded in
    pub fn all_series(&self) -> Vec<Series> {
        let mut series = self.series.clone();
        if series.is_empty() && !self.values.is_empty() {
            series.push(Series {
                name: None,
                values: self.values.clone(),
                color: None,
            });
        }
        series
    }

    /// Number of categories across all series
    pub fn category_count(&self) -> usize {
        self.all_series()
            .iter()
            .map(|s| s.values.len())
            .max()
            .unwrap_or(0)
            .max(self.labels.len())
    }

    pub fn max_value(&self) -> f64 {
        self.all_series()
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Slice {
    #[serde(alias = "name")]
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PieEffect {
    pub title: Option<String>,
    pub slices: Vec<Slice>,
    pub donut: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StaircaseEffect {
    pub title: Option<String>,
    pub steps: Vec<Entry>,
    /// Zero-based index of the highlighted step
    pub current: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KineticTextEffect {
    pub phrases: Vec<String>,
    /// Split into words when no phrases are given
    pub text: Option<String>,
}

impl KineticTextEffect {
    pub fn phrase_list(&self) -> Vec<String> {
        if !self.phrases.is_empty() {
            return self.phrases.clone();
        }
        self.text
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CounterEffect {
    pub from: f64,
    pub to: f64,
    pub label: Option<String>,
    pub prefix: String,
    pub suffix: String,
    pub decimals: u32,
}

/// Progress ring and progress bar; `value` is a percentage
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressEffect {
    pub value: f64,
    pub label: Option<String>,
}

impl ProgressEffect {
    pub fn fraction(&self) -> f64 {
        (self.value / 100.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CountdownEffect {
    pub from: u32,
    /// Shown after the last number
    pub label: Option<String>,
}

impl Default for CountdownEffect {
    fn default() -> Self {
        Self {
            from: 3,
            label: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightMode {
    #[default]
    Highlight,
    Underline,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HighlightEffect {
    pub text: String,
    pub mode: HighlightMode,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    #[default]
    Slide,
    Wipe,
    Glitch,
    Bounce,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextTransitionEffect {
    pub texts: Vec<String>,
    pub style: TransitionStyle,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineEvent {
    #[serde(alias = "date", alias = "year")]
    pub label: String,
    #[serde(default, alias = "description")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimelineEffect {
    pub title: Option<String>,
    pub events: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalloutStyle {
    #[default]
    Line,
    Box,
}

/// Point in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalloutEffect {
    pub text: String,
    pub target: Point,
    pub style: CalloutStyle,
    /// Box size as a fraction of the frame (box style only)
    pub size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Panel {
    pub title: String,
    pub body: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SplitScreenEffect {
    pub left: Panel,
    pub right: Panel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PictureInPictureEffect {
    pub main: Panel,
    pub inset: Panel,
    pub corner: Corner,
    /// Inset width as a fraction of the frame width
    pub scale: f64,
}

impl Default for PictureInPictureEffect {
    fn default() -> Self {
        Self {
            main: Panel::default(),
            inset: Panel::default(),
            corner: Corner::default(),
            scale: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    Retro,
    Vhs,
    #[default]
    Grain,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextureEffect {
    pub kind: TextureKind,
    pub intensity: f64,
    pub title: Option<String>,
}

impl Default for TextureEffect {
    fn default() -> Self {
        Self {
            kind: TextureKind::default(),
            intensity: 0.5,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TypewriterEffect {
    pub text: String,
    pub cursor: bool,
}

impl Default for TypewriterEffect {
    fn default() -> Self {
        Self {
            text: String::new(),
            cursor: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChecklistEffect {
    pub title: Option<String>,
    pub items: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TickerEffect {
    pub items: Vec<String>,
    pub label: Option<String>,
    /// Pixels per second
    pub speed: f64,
}

impl Default for TickerEffect {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            label: None,
            speed: 240.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuoteEffect {
    pub text: String,
    pub author: Option<String>,
}

/// One self-contained animation routine; exactly one renders per job
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Items(ItemsEffect),
    BarChart(ChartEffect),
    LineChart(ChartEffect),
    PieChart(PieEffect),
    Staircase(StaircaseEffect),
    KineticText(KineticTextEffect),
    Counter(CounterEffect),
    ProgressRing(ProgressEffect),
    ProgressBar(ProgressEffect),
    Countdown(CountdownEffect),
    Highlight(HighlightEffect),
    TextTransition(TextTransitionEffect),
    Timeline(TimelineEffect),
    Callout(CalloutEffect),
    SplitScreen(SplitScreenEffect),
    PictureInPicture(PictureInPictureEffect),
    Texture(TextureEffect),
    Typewriter(TypewriterEffect),
    Checklist(ChecklistEffect),
    Ticker(TickerEffect),
    Quote(QuoteEffect),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Items(_) => "items",
            Effect::BarChart(_) => "bar_chart",
            Effect::LineChart(_) => "line_chart",
            Effect::PieChart(_) => "pie_chart",
            Effect::Staircase(_) => "staircase",
            Effect::KineticText(_) => "kinetic_text",
            Effect::Counter(_) => "counter",
            Effect::ProgressRing(_) => "progress_ring",
            Effect::ProgressBar(_) => "progress_bar",
            Effect::Countdown(_) => "countdown",
            Effect::Highlight(_) => "highlight",
            Effect::TextTransition(_) => "text_transition",
            Effect::Timeline(_) => "timeline",
            Effect::Callout(_) => "callout",
            Effect::SplitScreen(_) => "split_screen",
            Effect::PictureInPicture(_) => "picture_in_picture",
            Effect::Texture(_) => "texture",
            Effect::Typewriter(_) => "typewriter",
            Effect::Checklist(_) => "checklist",
            Effect::Ticker(_) => "ticker",
            Effect::Quote(_) => "quote",
        }
    }

    /// Select the effect for a spec's `data`.
    ///
    /// `data.effect` names the effect explicitly. Otherwise the effect is inferred
    /// from the single effect sub-object present; several present is an error and
    /// none present falls back to the `items` list scene.
    pub fn select(data: &Map<String, Value>) -> Result<Self> {
        let name = match data.get("effect") {
            Some(Value::String(name)) => {
                if !EFFECT_NAMES.contains(&name.as_str()) {
                    return Err(RenderError::InvalidSpec(format!("unknown effect: {}", name)));
                }
                name.as_str()
            }
            Some(other) => {
                return Err(RenderError::InvalidSpec(format!(
                    "effect must be a string, got {}",
                    other
                )))
            }
            None => infer_name(data)?,
        };

        let params = match data.get(name) {
            Some(sub @ Value::Object(_)) => sub.clone(),
            _ => Value::Object(data.clone()),
        };
        Self::from_params(name, params)
    }

    fn from_params(name: &str, params: Value) -> Result<Self> {
        let effect = match name {
            "items" => Effect::Items(parse(name, params)?),
            "bar_chart" => Effect::BarChart(parse(name, params)?),
            "line_chart" => Effect::LineChart(parse(name, params)?),
            "pie_chart" => Effect::PieChart(parse(name, params)?),
            "staircase" => Effect::Staircase(parse(name, params)?),
            "kinetic_text" => Effect::KineticText(parse(name, params)?),
            "counter" => Effect::Counter(parse(name, params)?),
            "progress_ring" => Effect::ProgressRing(parse(name, params)?),
            "progress_bar" => Effect::ProgressBar(parse(name, params)?),
            "countdown" => Effect::Countdown(parse(name, params)?),
            "highlight" => Effect::Highlight(parse(name, params)?),
            "text_transition" => Effect::TextTransition(parse(name, params)?),
            "timeline" => Effect::Timeline(parse(name, params)?),
            "callout" => Effect::Callout(parse(name, params)?),
            "split_screen" => Effect::SplitScreen(parse(name, params)?),
            "picture_in_picture" => Effect::PictureInPicture(parse(name, params)?),
            "texture" => Effect::Texture(parse(name, params)?),
            "typewriter" => Effect::Typewriter(parse(name, params)?),
            "checklist" => Effect::Checklist(parse(name, params)?),
            "ticker" => Effect::Ticker(parse(name, params)?),
            "quote" => Effect::Quote(parse(name, params)?),
            other => return Err(RenderError::InvalidSpec(format!("unknown effect: {}", other))),
        };
        Ok(effect)
    }
}

fn infer_name(data: &Map<String, Value>) -> Result<&'static str> {
    let present: Vec<&'static str> = EFFECT_NAMES
        .iter()
        .copied()
        .filter(|name| *name != "items")
        .filter(|name| matches!(data.get(*name), Some(Value::Object(_))))
        .collect();

    match present.as_slice() {
        [] => Ok("items"),
        [single] => Ok(*single),
        _ => Err(RenderError::AmbiguousEffect(
            present.iter().map(|s| s.to_string()).collect(),
        )),
    }
}

fn parse<T: DeserializeOwned>(name: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| RenderError::InvalidSpec(format!("{} parameters: {}", name, e)))
}
