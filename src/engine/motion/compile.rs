//! Effect → scene program compilation.
//!
//! Geometry is derived from the frame size and, for charts, from the data values.
//! Timings scale with the requested duration so short clips stay complete.

use crate::anim::{Ease, Property, Track};
use crate::error::{RenderError, Result};
use crate::spec::RenderSpec;
use crate::theme::Palette;

use super::effects::*;
use super::scene::{Align, CounterShape, Node, SceneProgram, Shape, TextShape};

/// Frame and timing context shared by every effect routine
#[derive(Debug, Clone)]
pub struct SceneContext {
    pub width: f64,
    pub height: f64,
    pub duration: f64,
    pub palette: Palette,
}

impl SceneContext {
    pub fn from_spec(spec: &RenderSpec) -> Self {
        Self {
            width: spec.width as f64,
            height: spec.height as f64,
            duration: spec.duration,
            palette: Palette::named(&spec.theme),
        }
    }

    /// Length of intro animations
    fn intro(&self) -> f64 {
        (self.duration * 0.15).clamp(0.1, 0.6)
    }

    /// Delay between consecutive elements of a list
    fn stagger(&self, count: usize) -> f64 {
        (self.duration * 0.5 / count.max(1) as f64).min(0.35)
    }

    fn text(&self) -> &str {
        &self.palette.text
    }
}

/// Compile an effect into a complete scene program
pub fn compile(effect: &Effect, spec: &RenderSpec) -> Result<SceneProgram> {
    let ctx = SceneContext::from_spec(spec);

    let nodes = match effect {
        Effect::Items(e) => items(&ctx, e)?,
        Effect::BarChart(e) => bar_chart(&ctx, e)?,
        Effect::LineChart(e) => line_chart(&ctx, e)?,
        Effect::PieChart(e) => pie_chart(&ctx, e)?,
        Effect::Staircase(e) => staircase(&ctx, e)?,
        Effect::KineticText(e) => kinetic_text(&ctx, e)?,
        Effect::Counter(e) => counter(&ctx, e),
        Effect::ProgressRing(e) => progress_ring(&ctx, e),
        Effect::ProgressBar(e) => progress_bar(&ctx, e),
        Effect::Countdown(e) => countdown(&ctx, e),
        Effect::Highlight(e) => highlight(&ctx, e)?,
        Effect::TextTransition(e) => text_transition(&ctx, e)?,
        Effect::Timeline(e) => timeline(&ctx, e)?,
        Effect::Callout(e) => callout(&ctx, e)?,
        Effect::SplitScreen(e) => split_screen(&ctx, e)?,
        Effect::PictureInPicture(e) => picture_in_picture(&ctx, e),
        Effect::Texture(e) => texture(&ctx, e),
        Effect::Typewriter(e) => typewriter(&ctx, e)?,
        Effect::Checklist(e) => checklist(&ctx, e)?,
        Effect::Ticker(e) => ticker(&ctx, e)?,
        Effect::Quote(e) => quote(&ctx, e)?,
    };

    let program = SceneProgram {
        width: spec.width,
        height: spec.height,
        fps: spec.fps,
        duration: spec.duration,
        background: ctx.palette.background.clone(),
        nodes,
    };
    program.validate()?;
    Ok(program)
}

fn require(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(RenderError::InvalidSpec(message.to_string()))
    }
}

/// Approximate rendered width of a line of text
pub fn text_width(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * 0.55
}

/// Greedy word wrap to at most `max_chars` per line
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn title(ctx: &SceneContext, text: &str) -> Node {
    let size = ctx.height * 0.07;
    Node::new(Shape::heading(ctx.width / 2.0, ctx.height * 0.12, text, size))
        .fill(ctx.text())
        .fade_in(0.0, ctx.intro())
        .slide_y(0.0, ctx.intro(), -size * 0.5, Ease::OutCubic)
}

fn label(ctx: &SceneContext, x: f64, y: f64, text: &str, size: f64, align: Align) -> Node {
    Node::new(Shape::text_aligned(x, y, text, size, align)).fill(ctx.text())
}

fn items(ctx: &SceneContext, effect: &ItemsEffect) -> Result<Vec<Node>> {
    require(
        effect.title.is_some() || !effect.items.is_empty(),
        "items scene needs a title or items",
    )?;

    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }
    if let Some(subtitle) = &effect.subtitle {
        nodes.push(
            Node::new(Shape::text(ctx.width / 2.0, ctx.height * 0.2, subtitle, ctx.height * 0.035))
                .fill(&ctx.palette.secondary)
                .fade_in(ctx.intro() * 0.5, ctx.intro()),
        );
    }

    let count = effect.items.len();
    let row = (ctx.height * 0.62 / count.max(1) as f64).min(ctx.height * 0.12);
    let size = (row * 0.38).max(12.0);
    let x = ctx.width * 0.15;
    let stagger = ctx.stagger(count);

    for (i, entry) in effect.items.iter().enumerate() {
        let y = ctx.height * 0.3 + row * i as f64;
        let start = ctx.intro() + stagger * i as f64;

        nodes.push(
            Node::new(Shape::circle(x, y, size * 0.25))
                .fill(ctx.palette.series_color(i))
                .pop(start, 0.4),
        );
        nodes.push(
            label(ctx, x + size, y, entry.label(), size, Align::Left)
                .fade_in(start, 0.4)
                .slide_x(start, 0.4, -40.0),
        );
        if let Some(description) = entry.description() {
            nodes.push(
                label(ctx, x + size, y + size * 0.9, description, size * 0.6, Align::Left)
                    .opacity(0.75)
                    .fade_in(start + 0.15, 0.4),
            );
        }
    }
    Ok(nodes)
}

/// Plot area shared by bar and line charts: (left, top, right, bottom)
fn plot_area(ctx: &SceneContext) -> (f64, f64, f64, f64) {
    (
        ctx.width * 0.1,
        ctx.height * 0.22,
        ctx.width * 0.9,
        ctx.height * 0.82,
    )
}

fn chart_frame(ctx: &SceneContext, effect: &ChartEffect, name: &str) -> Result<Vec<Node>> {
    require(
        effect.category_count() > 0 && effect.max_value() > 0.0,
        &format!("{} needs at least one positive value", name),
    )?;

    let (left, _, right, bottom) = plot_area(ctx);
    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }
    nodes.push(
        Node::new(Shape::line(left, bottom, right, bottom))
            .stroke(ctx.text(), 2.0)
            .opacity(0.6)
            .reveal(0.0, ctx.intro(), Ease::OutCubic),
    );

    let group = (right - left) / effect.category_count() as f64;
    let size = (ctx.height * 0.03).max(10.0);
    for (i, text) in effect.labels.iter().enumerate() {
        nodes.push(
            label(ctx, left + group * (i as f64 + 0.5), bottom + size * 1.2, text, size, Align::Center)
                .fade_in(ctx.intro(), 0.4),
        );
    }

    let series = effect.all_series();
    if series.len() > 1 {
        for (s, entry) in series.iter().enumerate() {
            let name = entry.name.clone().unwrap_or_else(|| format!("Series {}", s + 1));
            let x = right - ctx.width * 0.18;
            let y = ctx.height * 0.2 + s as f64 * size * 1.4;
            let color = series_color(ctx, entry, s);
            nodes.push(Node::new(Shape::rect(x, y - size * 0.4, size * 0.8, size * 0.8)).fill(&color));
            nodes.push(label(ctx, x + size * 1.2, y, &name, size * 0.9, Align::Left));
        }
    }
    Ok(nodes)
}

fn series_color(ctx: &SceneContext, series: &Series, index: usize) -> String {
    series
        .color
        .clone()
        .unwrap_or_else(|| ctx.palette.series_color(index).to_string())
}

fn bar_chart(ctx: &SceneContext, effect: &ChartEffect) -> Result<Vec<Node>> {
    let mut nodes = chart_frame(ctx, effect, "bar_chart")?;

    let (left, top, right, bottom) = plot_area(ctx);
    let series = effect.all_series();
    let categories = effect.category_count();
    let max = effect.max_value();
    let group = (right - left) / categories as f64;
    let bar_width = group * 0.7 / series.len() as f64;
    let stagger = ctx.stagger(categories);
    let size = (ctx.height * 0.028).max(10.0);

    for c in 0..categories {
        let start = ctx.intro() + stagger * c as f64;
        for (s, entry) in series.iter().enumerate() {
            let value = entry.values.get(c).copied().unwrap_or(0.0).max(0.0);
            let height = value / max * (bottom - top);
            let x = left + group * c as f64 + group * 0.15 + bar_width * s as f64;

            nodes.push(
                Node::new(Shape::bar(x, bottom, bar_width * 0.9, height))
                    .fill(&series_color(ctx, entry, s))
                    .reveal(start, 0.8, Ease::OutCubic),
            );
            nodes.push(
                label(ctx, x + bar_width * 0.45, bottom - height - size, &format_value(value), size, Align::Center)
                    .fade_in(start + 0.6, 0.3),
            );
        }
    }
    Ok(nodes)
}

fn line_chart(ctx: &SceneContext, effect: &ChartEffect) -> Result<Vec<Node>> {
    let mut nodes = chart_frame(ctx, effect, "line_chart")?;

    let (left, top, right, bottom) = plot_area(ctx);
    let categories = effect.category_count();
    let max = effect.max_value();
    let group = (right - left) / categories as f64;
    let draw = (ctx.duration * 0.5).max(0.3);

    for (s, entry) in effect.all_series().iter().enumerate() {
        let color = series_color(ctx, entry, s);
        let points: Vec<[f64; 2]> = entry
            .values
            .iter()
            .enumerate()
            .map(|(c, v)| {
                let x = left + group * (c as f64 + 0.5);
                let y = bottom - v.max(0.0) / max * (bottom - top);
                [x, y]
            })
            .collect();

        let steps = points.len().max(1) as f64;
        for (c, [x, y]) in points.iter().copied().enumerate() {
            nodes.push(
                Node::new(Shape::circle(x, y, (ctx.height * 0.008).max(3.0)))
                    .fill(&color)
                    .pop(ctx.intro() + draw * c as f64 / steps, 0.3),
            );
        }
        nodes.push(
            Node::new(Shape::Polyline { points })
                .stroke(&color, (ctx.height * 0.005).max(2.0))
                .reveal(ctx.intro(), draw, Ease::InOutQuad),
        );
    }
    Ok(nodes)
}

fn pie_chart(ctx: &SceneContext, effect: &PieEffect) -> Result<Vec<Node>> {
    let total: f64 = effect.slices.iter().map(|s| s.value.max(0.0)).sum();
    require(total > 0.0, "pie_chart needs slices with positive values")?;

    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }

    let cx = ctx.width * 0.38;
    let cy = ctx.height * 0.56;
    let r = ctx.width.min(ctx.height) * 0.3;
    let stagger = ctx.stagger(effect.slices.len());
    let size = (ctx.height * 0.032).max(10.0);
    let mut angle = -90.0;

    for (i, slice) in effect.slices.iter().enumerate() {
        let sweep = slice.value.max(0.0) / total * 360.0;
        let color = slice
            .color
            .clone()
            .unwrap_or_else(|| ctx.palette.series_color(i).to_string());
        let start = ctx.intro() + stagger * i as f64;

        let shape = if effect.donut {
            Node::new(Shape::arc(cx, cy, r * 0.8, angle, sweep)).stroke(&color, r * 0.35)
        } else {
            Node::new(Shape::wedge(cx, cy, r, angle, sweep)).fill(&color)
        };
        nodes.push(shape.reveal(start, 0.6, Ease::OutCubic));
        angle += sweep;

        let lx = ctx.width * 0.7;
        let ly = ctx.height * 0.35 + size * 1.6 * i as f64;
        let percent = slice.value.max(0.0) / total * 100.0;
        nodes.push(
            Node::new(Shape::rect(lx, ly - size * 0.4, size * 0.8, size * 0.8))
                .fill(&color)
                .fade_in(start, 0.4),
        );
        nodes.push(
            label(ctx, lx + size * 1.2, ly, &format!("{} ({:.0}%)", slice.label, percent), size, Align::Left)
                .fade_in(start, 0.4),
        );
    }
    Ok(nodes)
}

fn staircase(ctx: &SceneContext, effect: &StaircaseEffect) -> Result<Vec<Node>> {
    require(!effect.steps.is_empty(), "staircase needs at least one step")?;

    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }

    let count = effect.steps.len();
    let left = ctx.width * 0.1;
    let step_width = ctx.width * 0.8 / count as f64;
    let bottom = ctx.height * 0.88;
    let rise = ctx.height * 0.55 / count as f64;
    let stagger = ctx.stagger(count);
    let size = (ctx.height * 0.03).max(10.0);

    for (i, step) in effect.steps.iter().enumerate() {
        let height = rise * (i + 1) as f64;
        let x = left + step_width * i as f64;
        let start = ctx.intro() + stagger * i as f64;
        let (color, opacity) = match effect.current {
            Some(current) if i == current => (&ctx.palette.accent, 1.0),
            Some(current) if i > current => (&ctx.palette.secondary, 0.45),
            _ => (&ctx.palette.primary, 1.0),
        };

        nodes.push(
            Node::new(Shape::bar(x, bottom, step_width * 0.96, height))
                .fill(color)
                .opacity(opacity)
                .reveal(start, 0.6, Ease::OutCubic),
        );
        nodes.push(
            label(ctx, x + step_width * 0.48, bottom - height - size, step.label(), size, Align::Center)
                .fade_in(start + 0.4, 0.3),
        );
    }

    if let Some(current) = effect.current.filter(|c| *c < count) {
        let x = left + step_width * (current as f64 + 0.48);
        let y = bottom - rise * (current + 1) as f64 - size * 2.6;
        let at = ctx.intro() + stagger * count as f64;
        nodes.push(
            Node::new(Shape::circle(x, y, size * 0.5))
                .fill(&ctx.palette.accent)
                .pop(at, 0.5),
        );
    }
    Ok(nodes)
}

fn kinetic_text(ctx: &SceneContext, effect: &KineticTextEffect) -> Result<Vec<Node>> {
    let phrases = effect.phrase_list();
    require(!phrases.is_empty(), "kinetic_text needs phrases or text")?;

    let slot = ctx.duration / phrases.len() as f64;
    let size = ctx.height * 0.12;
    let fade = (slot / 4.0).min(0.25);

    Ok(phrases
        .iter()
        .enumerate()
        .map(|(i, phrase)| {
            let start = slot * i as f64;
            let color = if i % 2 == 0 {
                &ctx.palette.primary
            } else {
                &ctx.palette.accent
            };
            Node::new(Shape::heading(ctx.width / 2.0, ctx.height / 2.0, phrase, size))
                .fill(color)
                .visible_between(start, start + slot, fade)
                .track(Track::tween(Property::Scale, start, slot * 0.3, 0.6, 1.0, Ease::OutBack))
        })
        .collect())
}

fn counter_node(ctx: &SceneContext, y: f64, shape: CounterShape, start: f64, length: f64) -> Node {
    Node::new(Shape::Counter(CounterShape { y, ..shape }))
        .fill(ctx.text())
        .reveal(start, length, Ease::OutCubic)
}

fn counter(ctx: &SceneContext, effect: &CounterEffect) -> Vec<Node> {
    let size = ctx.height * 0.2;
    let shape = CounterShape {
        x: ctx.width / 2.0,
        y: 0.0,
        from: effect.from,
        to: effect.to,
        decimals: effect.decimals.min(6),
        prefix: effect.prefix.clone(),
        suffix: effect.suffix.clone(),
        size,
        align: Align::Center,
    };

    let mut nodes = vec![counter_node(
        ctx,
        ctx.height * 0.46,
        shape,
        ctx.intro(),
        (ctx.duration * 0.7).max(0.2),
    )];
    if let Some(text) = &effect.label {
        nodes.push(
            label(ctx, ctx.width / 2.0, ctx.height * 0.66, text, size * 0.25, Align::Center)
                .fade_in(ctx.intro(), 0.5),
        );
    }
    nodes
}

fn percent_counter(ctx: &SceneContext, effect: &ProgressEffect, size: f64) -> CounterShape {
    CounterShape {
        x: ctx.width / 2.0,
        y: 0.0,
        from: 0.0,
        to: effect.fraction() * 100.0,
        decimals: 0,
        prefix: String::new(),
        suffix: "%".to_string(),
        size,
        align: Align::Center,
    }
}

fn progress_ring(ctx: &SceneContext, effect: &ProgressEffect) -> Vec<Node> {
    let cx = ctx.width / 2.0;
    let cy = ctx.height / 2.0;
    let r = ctx.width.min(ctx.height) * 0.28;
    let thickness = r * 0.12;
    let fill_time = (ctx.duration * 0.6).max(0.2);

    let mut nodes = vec![
        Node::new(Shape::arc(cx, cy, r, -90.0, 360.0))
            .stroke(&ctx.palette.secondary, thickness)
            .opacity(0.25),
        Node::new(Shape::arc(cx, cy, r, -90.0, 360.0 * effect.fraction()))
            .stroke(&ctx.palette.primary, thickness)
            .reveal(ctx.intro(), fill_time, Ease::InOutCubic),
        counter_node(ctx, cy, percent_counter(ctx, effect, r * 0.45), ctx.intro(), fill_time),
    ];
    if let Some(text) = &effect.label {
        nodes.push(
            label(ctx, cx, cy + r + thickness * 2.5, text, r * 0.16, Align::Center)
                .fade_in(ctx.intro(), 0.5),
        );
    }
    nodes
}

fn progress_bar(ctx: &SceneContext, effect: &ProgressEffect) -> Vec<Node> {
    let x = ctx.width * 0.15;
    let y = ctx.height * 0.52;
    let width = ctx.width * 0.7;
    let height = ctx.height * 0.06;
    let fill_time = (ctx.duration * 0.6).max(0.2);

    let mut nodes = vec![
        Node::new(Shape::rounded(x, y, width, height, height / 2.0))
            .fill(&ctx.palette.secondary)
            .opacity(0.25),
        Node::new(Shape::rounded(x, y, width * effect.fraction(), height, height / 2.0))
            .fill(&ctx.palette.primary)
            .reveal(ctx.intro(), fill_time, Ease::InOutCubic),
        counter_node(
            ctx,
            y - height * 1.4,
            percent_counter(ctx, effect, height * 1.4),
            ctx.intro(),
            fill_time,
        ),
    ];
    if let Some(text) = &effect.label {
        nodes.push(
            label(ctx, ctx.width / 2.0, y + height * 2.2, text, height * 0.6, Align::Center)
                .fade_in(ctx.intro(), 0.5),
        );
    }
    nodes
}

fn countdown(ctx: &SceneContext, effect: &CountdownEffect) -> Vec<Node> {
    let from = effect.from.clamp(1, 60);
    let mut frames: Vec<String> = (1..=from).rev().map(|n| n.to_string()).collect();
    if let Some(text) = &effect.label {
        frames.push(text.clone());
    }

    let slot = ctx.duration / frames.len() as f64;
    let cx = ctx.width / 2.0;
    let cy = ctx.height / 2.0;
    let r = ctx.width.min(ctx.height) * 0.3;
    let mut nodes = Vec::new();

    for (i, text) in frames.iter().enumerate() {
        let start = slot * i as f64;
        let end = start + slot;
        let fade = (slot / 6.0).min(0.15);
        let is_number = i < from as usize;

        if is_number {
            nodes.push(
                Node::new(Shape::arc(cx, cy, r, -90.0, 360.0))
                    .stroke(&ctx.palette.accent, r * 0.06)
                    .visible_between(start, end, fade)
                    .reveal(start, slot, Ease::Linear),
            );
        }
        nodes.push(
            Node::new(Shape::heading(cx, cy, text, if is_number { r * 0.9 } else { r * 0.45 }))
                .fill(ctx.text())
                .visible_between(start, end, fade)
                .track(Track::tween(Property::Scale, start, slot * 0.4, 1.4, 1.0, Ease::OutBack)),
        );
    }
    nodes
}

fn highlight(ctx: &SceneContext, effect: &HighlightEffect) -> Result<Vec<Node>> {
    require(!effect.text.trim().is_empty(), "highlight needs text")?;

    let size = ctx.height * 0.09;
    let width = text_width(&effect.text, size);
    let x0 = ctx.width / 2.0 - width / 2.0;
    let cy = ctx.height / 2.0;
    let color = effect.color.as_deref().unwrap_or(&ctx.palette.accent);
    let start = ctx.intro() + 0.3;
    let sweep = (ctx.duration * 0.3).clamp(0.3, 1.0);

    let mark = match effect.mode {
        HighlightMode::Highlight => {
            let pad = size * 0.2;
            Node::new(Shape::rect(x0 - pad, cy - size * 0.6, width + pad * 2.0, size * 1.2))
                .fill(color)
                .opacity(0.45)
        }
        HighlightMode::Underline => {
            let y = cy + size * 0.65;
            Node::new(Shape::line(x0, y, x0 + width, y)).stroke(color, size * 0.12)
        }
    };

    Ok(vec![
        mark.reveal(start, sweep, Ease::InOutCubic),
        Node::new(Shape::heading(ctx.width / 2.0, cy, &effect.text, size))
            .fill(ctx.text())
            .fade_in(0.0, ctx.intro()),
    ])
}

fn text_transition(ctx: &SceneContext, effect: &TextTransitionEffect) -> Result<Vec<Node>> {
    require(!effect.texts.is_empty(), "text_transition needs texts")?;

    let slot = ctx.duration / effect.texts.len() as f64;
    let size = ctx.height * 0.1;
    let cx = ctx.width / 2.0;
    let cy = ctx.height / 2.0;
    let fade = (slot / 5.0).min(0.2);
    let enter = (slot * 0.4).min(0.9);
    let mut nodes = Vec::new();

    for (i, text) in effect.texts.iter().enumerate() {
        let start = slot * i as f64;
        let end = start + slot;
        let node = Node::new(Shape::heading(cx, cy, text, size))
            .fill(ctx.text())
            .visible_between(start, end, fade);

        let node = match effect.style {
            TransitionStyle::Slide => node.slide_x(start, enter, ctx.width * 0.25),
            TransitionStyle::Wipe => {
                node.track(Track::tween(Property::Clip, start, enter, 0.0, 1.0, Ease::InOutCubic))
            }
            TransitionStyle::Bounce => node.slide_y(start, enter, -ctx.height * 0.4, Ease::OutBounce),
            TransitionStyle::Glitch => {
                let shake = ctx.height * 0.02;
                nodes.push(
                    Node::new(Shape::heading(cx + shake, cy, text, size))
                        .fill(&ctx.palette.accent)
                        .opacity(0.7)
                        .visible_between(start, start + enter, 0.05)
                        .track(
                            Track::new(Property::Jitter)
                                .key(start, shake * 2.0, Ease::Linear)
                                .key(start + enter, 0.0, Ease::Linear),
                        ),
                );
                node.track(
                    Track::new(Property::Jitter)
                        .key(start, shake, Ease::Linear)
                        .key(start + enter, 0.0, Ease::InQuad),
                )
            }
        };
        nodes.push(node);
    }
    Ok(nodes)
}

fn timeline(ctx: &SceneContext, effect: &TimelineEffect) -> Result<Vec<Node>> {
    require(!effect.events.is_empty(), "timeline needs events")?;

    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }

    let left = ctx.width * 0.08;
    let right = ctx.width * 0.92;
    let y = ctx.height * 0.55;
    let axis_time = (ctx.duration * 0.3).clamp(0.3, 1.5);
    nodes.push(
        Node::new(Shape::line(left, y, right, y))
            .stroke(&ctx.palette.secondary, (ctx.height * 0.006).max(2.0))
            .reveal(0.0, axis_time, Ease::InOutCubic),
    );

    let count = effect.events.len();
    let spacing = (right - left) / count as f64;
    let stagger = ctx.stagger(count);
    let size = (ctx.height * 0.032).max(10.0);

    for (i, event) in effect.events.iter().enumerate() {
        let x = left + spacing * (i as f64 + 0.5);
        let at = axis_time * (i as f64 + 0.5) / count as f64 + stagger * 0.5;
        let above = i % 2 == 0;
        let direction = if above { -1.0 } else { 1.0 };

        nodes.push(
            Node::new(Shape::circle(x, y, size * 0.45))
                .fill(&ctx.palette.primary)
                .pop(at, 0.4),
        );
        nodes.push(
            Node::new(Shape::heading(x, y + direction * size * 1.6, &event.label, size))
                .fill(ctx.text())
                .fade_in(at + 0.1, 0.4),
        );
        if let Some(text) = &event.title {
            nodes.push(
                label(ctx, x, y + direction * size * 2.8, text, size * 0.75, Align::Center)
                    .opacity(0.8)
                    .fade_in(at + 0.2, 0.4),
            );
        }
    }
    Ok(nodes)
}

fn callout(ctx: &SceneContext, effect: &CalloutEffect) -> Result<Vec<Node>> {
    require(!effect.text.trim().is_empty(), "callout needs text")?;

    let tx = effect.target.x.clamp(0.0, 1.0) * ctx.width;
    let ty = effect.target.y.clamp(0.0, 1.0) * ctx.height;
    let size = (ctx.height * 0.045).max(12.0);
    let color = &ctx.palette.accent;
    let start = ctx.intro();

    let nodes = match effect.style {
        CalloutStyle::Line => {
            let lx = if effect.target.x < 0.5 {
                tx + ctx.width * 0.2
            } else {
                tx - ctx.width * 0.2
            };
            let ly = if effect.target.y < 0.5 {
                ty + ctx.height * 0.2
            } else {
                ty - ctx.height * 0.2
            };
            let align = if lx > tx { Align::Left } else { Align::Right };
            let gap = if lx > tx { size * 0.4 } else { -size * 0.4 };

            vec![
                Node::new(Shape::circle(tx, ty, size * 0.4))
                    .fill(color)
                    .pop(0.0, start),
                Node::new(Shape::circle(tx, ty, size * 0.9))
                    .stroke(color, 3.0)
                    .track(
                        Track::new(Property::Scale)
                            .key(start, 0.4, Ease::Linear)
                            .key(start + 0.8, 1.4, Ease::OutCubic),
                    )
                    .track(
                        Track::new(Property::Opacity)
                            .key(start, 1.0, Ease::Linear)
                            .key(start + 0.8, 0.0, Ease::OutCubic),
                    ),
                Node::new(Shape::line(tx, ty, lx, ly))
                    .stroke(color, 3.0)
                    .reveal(start, 0.5, Ease::OutCubic),
                label(ctx, lx + gap, ly, &effect.text, size, align).fade_in(start + 0.4, 0.4),
            ]
        }
        CalloutStyle::Box => {
            let fraction = effect.size.unwrap_or(0.2).clamp(0.05, 0.9);
            let bw = ctx.width * fraction;
            let bh = ctx.height * fraction;
            let below = ty + bh / 2.0 + size * 1.2;
            let label_y = if below < ctx.height * 0.95 {
                below
            } else {
                ty - bh / 2.0 - size * 1.2
            };

            vec![
                Node::new(Shape::rect(tx - bw / 2.0, ty - bh / 2.0, bw, bh))
                    .stroke(color, (size * 0.12).max(3.0))
                    .pop(start, 0.5),
                Node::new(Shape::heading(tx, label_y, &effect.text, size))
                    .fill(ctx.text())
                    .fade_in(start + 0.4, 0.4),
            ]
        }
    };
    Ok(nodes)
}

fn panel_nodes(ctx: &SceneContext, panel: &Panel, x: f64, width: f64, color: &str, from: f64) -> Vec<Node> {
    let size = ctx.height * 0.06;
    let cx = x + width / 2.0;
    let mut nodes = vec![
        Node::new(Shape::rect(x, 0.0, width, ctx.height))
            .fill(panel.color.as_deref().unwrap_or(color))
            .slide_x(0.0, ctx.intro(), from),
        Node::new(Shape::heading(cx, ctx.height * 0.42, &panel.title, size))
            .fill(&ctx.palette.background)
            .fade_in(ctx.intro(), 0.4),
    ];
    if let Some(body) = &panel.body {
        let max_chars = ((width * 0.8) / (size * 0.45 * 0.55)).max(8.0) as usize;
        for (i, line) in wrap_text(body, max_chars).iter().enumerate() {
            nodes.push(
                Node::new(Shape::text(cx, ctx.height * 0.52 + size * 0.7 * i as f64, line, size * 0.45))
                    .fill(&ctx.palette.background)
                    .fade_in(ctx.intro() + 0.2, 0.4),
            );
        }
    }
    nodes
}

fn split_screen(ctx: &SceneContext, effect: &SplitScreenEffect) -> Result<Vec<Node>> {
    require(
        !effect.left.title.is_empty() && !effect.right.title.is_empty(),
        "split_screen needs left and right titles",
    )?;

    let half = ctx.width / 2.0;
    let mut nodes = panel_nodes(ctx, &effect.left, 0.0, half, &ctx.palette.primary, -half);
    nodes.extend(panel_nodes(ctx, &effect.right, half, half, &ctx.palette.secondary, half));
    nodes.push(
        Node::new(Shape::line(half, 0.0, half, ctx.height))
            .stroke(&ctx.palette.background, 6.0)
            .reveal(ctx.intro(), 0.5, Ease::InOutCubic),
    );
    Ok(nodes)
}

fn picture_in_picture(ctx: &SceneContext, effect: &PictureInPictureEffect) -> Vec<Node> {
    let margin = ctx.width * 0.04;
    let iw = ctx.width * effect.scale.clamp(0.1, 0.5);
    let ih = iw * ctx.height / ctx.width;
    let (ix, iy) = match effect.corner {
        Corner::TopLeft => (margin, margin),
        Corner::TopRight => (ctx.width - margin - iw, margin),
        Corner::BottomLeft => (margin, ctx.height - margin - ih),
        Corner::BottomRight => (ctx.width - margin - iw, ctx.height - margin - ih),
    };
    let main_color = effect.main.color.as_deref().unwrap_or(&ctx.palette.primary);
    let inset_color = effect.inset.color.as_deref().unwrap_or(&ctx.palette.secondary);
    let at = ctx.intro() + 0.3;

    let mut nodes = vec![
        Node::new(Shape::rect(0.0, 0.0, ctx.width, ctx.height))
            .fill(main_color)
            .fade_in(0.0, ctx.intro()),
        Node::new(Shape::heading(ctx.width / 2.0, ctx.height * 0.4, &effect.main.title, ctx.height * 0.08))
            .fill(&ctx.palette.background)
            .fade_in(ctx.intro(), 0.4),
        Node::new(Shape::rounded(ix, iy, iw, ih, iw * 0.03))
            .fill(inset_color)
            .stroke(&ctx.palette.background, 4.0)
            .pop(at, 0.5),
        Node::new(Shape::heading(ix + iw / 2.0, iy + ih / 2.0, &effect.inset.title, ih * 0.14))
            .fill(&ctx.palette.background)
            .fade_in(at + 0.3, 0.3),
    ];
    if let Some(body) = &effect.main.body {
        nodes.push(
            Node::new(Shape::text(ctx.width / 2.0, ctx.height * 0.5, body, ctx.height * 0.04))
                .fill(&ctx.palette.background)
                .fade_in(ctx.intro() + 0.2, 0.4),
        );
    }
    nodes
}

fn texture(ctx: &SceneContext, effect: &TextureEffect) -> Vec<Node> {
    let intensity = effect.intensity.clamp(0.0, 1.0);
    let size = ctx.height * 0.1;
    let cx = ctx.width / 2.0;
    let cy = ctx.height / 2.0;
    let mut nodes = Vec::new();

    if effect.kind == TextureKind::Retro {
        nodes.push(
            Node::new(Shape::rect(0.0, 0.0, ctx.width, ctx.height))
                .fill("#704214")
                .opacity(0.15 + 0.25 * intensity),
        );
    }

    if let Some(text) = &effect.title {
        if effect.kind == TextureKind::Vhs {
            let offset = 4.0 + 6.0 * intensity;
            for (color, dx) in [("#ff0040", -offset), ("#00e5ff", offset)] {
                nodes.push(
                    Node::new(Shape::heading(cx + dx, cy, text, size))
                        .fill(color)
                        .opacity(0.6)
                        .track(Track::new(Property::Jitter).key(0.0, offset * 0.5, Ease::Linear)),
                );
            }
        }
        nodes.push(
            Node::new(Shape::heading(cx, cy, text, size))
                .fill(ctx.text())
                .fade_in(0.0, ctx.intro()),
        );
    }

    match effect.kind {
        TextureKind::Grain => {
            nodes.push(Node::new(Shape::Noise { amount: intensity }).opacity(0.5));
        }
        TextureKind::Vhs => {
            nodes.push(Node::new(Shape::Scanlines { spacing: 4.0 }).fill("#000000").opacity(0.2 + 0.3 * intensity));
            nodes.push(Node::new(Shape::Noise { amount: intensity * 0.4 }).opacity(0.4));
        }
        TextureKind::Retro => {
            nodes.push(Node::new(Shape::Noise { amount: intensity * 0.6 }).opacity(0.4));
            nodes.push(Node::new(Shape::Scanlines { spacing: 6.0 }).fill("#000000").opacity(0.1));
        }
    }
    nodes
}

fn typewriter(ctx: &SceneContext, effect: &TypewriterEffect) -> Result<Vec<Node>> {
    require(!effect.text.is_empty(), "typewriter needs text")?;

    let size = ctx.height * 0.06;
    let chars = effect.text.chars().count() as f64;
    let typing = (chars * 0.06).min(ctx.duration * 0.75).max(0.1);

    let node = Node::new(Shape::Text(TextShape {
        x: ctx.width * 0.1,
        y: ctx.height / 2.0,
        text: effect.text.clone(),
        size,
        align: Align::Left,
        weight: 500,
        cursor: effect.cursor,
    }))
    .fill(ctx.text())
    .reveal(ctx.intro() * 0.5, typing, Ease::Linear);
    Ok(vec![node])
}

fn checklist(ctx: &SceneContext, effect: &ChecklistEffect) -> Result<Vec<Node>> {
    require(!effect.items.is_empty(), "checklist needs items")?;

    let mut nodes = Vec::new();
    if let Some(text) = &effect.title {
        nodes.push(title(ctx, text));
    }

    let count = effect.items.len();
    let row = (ctx.height * 0.62 / count as f64).min(ctx.height * 0.12);
    let boxed = row * 0.5;
    let x = ctx.width * 0.2;
    let stagger = ctx.stagger(count);

    for (i, item) in effect.items.iter().enumerate() {
        let cy = ctx.height * 0.3 + row * i as f64;
        let start = ctx.intro() + stagger * i as f64;

        nodes.push(
            Node::new(Shape::rounded(x, cy - boxed / 2.0, boxed, boxed, boxed * 0.15))
                .stroke(ctx.text(), 3.0)
                .fade_in(start, 0.3),
        );
        if item.checked() {
            let points = vec![
                [x + boxed * 0.2, cy],
                [x + boxed * 0.42, cy + boxed * 0.22],
                [x + boxed * 0.82, cy - boxed * 0.25],
            ];
            nodes.push(
                Node::new(Shape::Polyline { points })
                    .stroke(&ctx.palette.accent, (boxed * 0.14).max(3.0))
                    .reveal(start + 0.3, 0.35, Ease::OutCubic),
            );
        }
        nodes.push(
            label(ctx, x + boxed * 1.6, cy, item.label(), boxed * 0.8, Align::Left)
                .opacity(if item.checked() { 1.0 } else { 0.6 })
                .fade_in(start, 0.4),
        );
    }
    Ok(nodes)
}

fn ticker(ctx: &SceneContext, effect: &TickerEffect) -> Result<Vec<Node>> {
    require(!effect.items.is_empty(), "ticker needs items")?;

    let band_y = ctx.height * 0.86;
    let band_h = ctx.height * 0.1;
    let size = band_h * 0.45;
    let text = effect.items.join("   •   ");
    let width = text_width(&text, size);
    let distance = ctx.width + width;
    let speed = effect.speed.max(10.0);

    let mut nodes = vec![
        Node::new(Shape::rect(0.0, band_y, ctx.width, band_h)).fill(&ctx.palette.primary),
        Node::new(Shape::text_aligned(ctx.width, band_y + band_h / 2.0, &text, size, Align::Left))
            .fill(&ctx.palette.background)
            .track(Track::tween(Property::OffsetX, 0.0, distance / speed, 0.0, -distance, Ease::Linear)),
    ];
    if let Some(tag) = &effect.label {
        let tag_w = text_width(tag, size) + size * 2.0;
        nodes.push(Node::new(Shape::rect(0.0, band_y, tag_w, band_h)).fill(&ctx.palette.accent));
        nodes.push(
            Node::new(Shape::heading(tag_w / 2.0, band_y + band_h / 2.0, tag, size))
                .fill(&ctx.palette.background),
        );
    }
    Ok(nodes)
}

fn quote(ctx: &SceneContext, effect: &QuoteEffect) -> Result<Vec<Node>> {
    require(!effect.text.trim().is_empty(), "quote needs text")?;

    let size = ctx.height * 0.06;
    let max_chars = ((ctx.width * 0.7) / (size * 0.55)).max(10.0) as usize;
    let lines = wrap_text(&effect.text, max_chars);
    let line_height = size * 1.3;
    let top = ctx.height / 2.0 - line_height * (lines.len() as f64 - 1.0) / 2.0;
    let stagger = ctx.stagger(lines.len()).min(0.25);

    let mut nodes = vec![Node::new(Shape::heading(
        ctx.width * 0.14,
        ctx.height * 0.3,
        "\u{201C}",
        ctx.height * 0.35,
    ))
    .fill(&ctx.palette.accent)
    .opacity(0.35)
    .fade_in(0.0, ctx.intro())];

    for (i, line) in lines.iter().enumerate() {
        let start = ctx.intro() + stagger * i as f64;
        nodes.push(
            Node::new(Shape::text(ctx.width / 2.0, top + line_height * i as f64, line, size))
                .fill(ctx.text())
                .fade_in(start, 0.5)
                .slide_y(start, 0.5, size * 0.4, Ease::OutCubic),
        );
    }

    if let Some(author) = &effect.author {
        let y = top + line_height * lines.len() as f64 + size * 0.4;
        let at = ctx.intro() + stagger * lines.len() as f64 + 0.3;
        nodes.push(
            Node::new(Shape::Text(TextShape {
                x: ctx.width / 2.0,
                y,
                text: author.clone(),
                size: size * 0.6,
                align: Align::Center,
                weight: 600,
                cursor: false,
            }))
            .fill(&ctx.palette.accent)
            .fade_in(at, 0.5),
        );
    }
    Ok(nodes)
}

fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}
