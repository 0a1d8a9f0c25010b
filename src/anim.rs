//! Animation primitives shared by the scene program and composition payloads.
//!
//! The browser harness pages implement the same curves, so any change to
//! [`Ease::apply`] or [`Track::sample`] must be mirrored there.

use serde::{Deserialize, Serialize};

/// Easing functions used to map normalized animation progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    /// Linear interpolation.
    #[default]
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    OutCubic,
    InOutCubic,
    /// Overshoots slightly before settling.
    OutBack,
    OutBounce,
}

impl Ease {
    /// Apply this easing function to normalized progress `t` in `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => t * t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
            Self::OutBack => {
                let c1 = 1.70158;
                let c3 = c1 + 1.0;
                1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
            }
            Self::OutBounce => {
                let n1 = 7.5625;
                let d1 = 2.75;
                if t < 1.0 / d1 {
                    n1 * t * t
                } else if t < 2.0 / d1 {
                    let t = t - 1.5 / d1;
                    n1 * t * t + 0.75
                } else if t < 2.5 / d1 {
                    let t = t - 2.25 / d1;
                    n1 * t * t + 0.9375
                } else {
                    let t = t - 2.625 / d1;
                    n1 * t * t + 0.984375
                }
            }
        }
    }
}

/// Animatable node properties
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Opacity,
    OffsetX,
    OffsetY,
    Scale,
    Rotation,
    /// Shape-specific reveal amount in [0, 1] (bar growth, line draw, arc sweep, text reveal)
    Progress,
    /// Horizontal wipe fraction in [0, 1]
    Clip,
    /// Random displacement amplitude in pixels
    Jitter,
}

impl Property {
    /// Value a node has when it carries no track for this property
    pub fn resting_value(self) -> f64 {
        match self {
            Property::Opacity | Property::Scale | Property::Progress | Property::Clip => 1.0,
            Property::OffsetX | Property::OffsetY | Property::Rotation | Property::Jitter => 0.0,
        }
    }
}

/// A value at a point in time (seconds), reached with `ease` from the previous keyframe
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub t: f64,
    pub value: f64,
    #[serde(default)]
    pub ease: Ease,
}

impl Keyframe {
    pub fn new(t: f64, value: f64, ease: Ease) -> Self {
        Self { t, value, ease }
    }
}

/// Keyframed animation of one property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub property: Property,
    pub keyframes: Vec<Keyframe>,
}

impl Track {
    pub fn new(property: Property) -> Self {
        Self {
            property,
            keyframes: Vec::new(),
        }
    }

    pub fn key(mut self, t: f64, value: f64, ease: Ease) -> Self {
        self.keyframes.push(Keyframe::new(t, value, ease));
        self
    }

    /// Animate from `from` to `to` over `[start, start + length]`
    pub fn tween(property: Property, start: f64, length: f64, from: f64, to: f64, ease: Ease) -> Self {
        Self::new(property)
            .key(start, from, Ease::Linear)
            .key(start + length.max(1e-3), to, ease)
    }

    /// Sample the track at time `t`; holds the first/last value outside the keyed range
    pub fn sample(&self, t: f64) -> f64 {
        let (first, last) = match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return self.property.resting_value(),
        };
        if t <= first.t {
            return first.value;
        }
        if t >= last.t {
            return last.value;
        }

        for pair in self.keyframes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if t >= a.t && t <= b.t {
                let span = b.t - a.t;
                if span <= f64::EPSILON {
                    return b.value;
                }
                let progress = b.ease.apply((t - a.t) / span);
                return a.value + (b.value - a.value) * progress;
            }
        }
        last.value
    }
}

/// Frame-based fade in / hold / fade out visibility window
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpacityWindow {
    pub start: u32,
    pub fade_in_end: u32,
    pub fade_out_start: u32,
    pub end: u32,
}

impl OpacityWindow {
    /// Build a window from seconds, clamped to `[0, total_frames]`
    pub fn from_seconds(start: f64, end: f64, fade: f64, fps: u32, total_frames: u32) -> Self {
        let to_frame = |secs: f64| ((secs.max(0.0) * fps as f64).round() as u32).min(total_frames);
        let start_f = to_frame(start);
        let end_f = to_frame(end).max(start_f);
        let fade_f = ((fade.max(0.0) * fps as f64).round() as u32).min((end_f - start_f) / 2);

        Self {
            start: start_f,
            fade_in_end: start_f + fade_f,
            fade_out_start: end_f - fade_f,
            end: end_f,
        }
    }

    pub fn opacity_at(&self, frame: u32) -> f64 {
        if frame < self.start || frame > self.end || self.start == self.end {
            return 0.0;
        }
        if frame < self.fade_in_end {
            return (frame - self.start) as f64 / (self.fade_in_end - self.start) as f64;
        }
        if frame > self.fade_out_start {
            return (self.end - frame) as f64 / (self.end - self.fade_out_start) as f64;
        }
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ease_endpoints() {
        for ease in [
            Ease::Linear,
            Ease::InQuad,
            Ease::OutQuad,
            Ease::InOutQuad,
            Ease::OutCubic,
            Ease::InOutCubic,
            Ease::OutBack,
            Ease::OutBounce,
        ] {
            assert!(ease.apply(0.0).abs() < 1e-9, "{:?}", ease);
            assert!((ease.apply(1.0) - 1.0).abs() < 1e-9, "{:?}", ease);
        }
        assert!(Ease::OutBack.apply(0.7) > 1.0);
    }

    #[test]
    fn test_track_sampling() {
        let track = Track::new(Property::Opacity)
            .key(1.0, 0.0, Ease::Linear)
            .key(2.0, 1.0, Ease::Linear)
            .key(3.0, 0.5, Ease::Linear);

        assert_eq!(track.sample(0.0), 0.0);
        assert!((track.sample(1.5) - 0.5).abs() < 1e-9);
        assert!((track.sample(2.5) - 0.75).abs() < 1e-9);
        assert_eq!(track.sample(10.0), 0.5);
        assert_eq!(Track::new(Property::Scale).sample(1.0), 1.0);
    }

    #[test]
    fn test_opacity_window() {
        let window = OpacityWindow::from_seconds(1.0, 3.0, 0.5, 30, 150);
        assert_eq!(window.start, 30);
        assert_eq!(window.fade_in_end, 45);
        assert_eq!(window.fade_out_start, 75);
        assert_eq!(window.end, 90);

        assert_eq!(window.opacity_at(0), 0.0);
        assert!((window.opacity_at(37) - 7.0 / 15.0).abs() < 1e-9);
        assert_eq!(window.opacity_at(60), 1.0);
        assert_eq!(window.opacity_at(91), 0.0);
    }

    #[test]
    fn test_opacity_window_clamped_to_total() {
        let window = OpacityWindow::from_seconds(4.0, 10.0, 1.0, 30, 150);
        assert_eq!(window.end, 150);
        assert!(window.fade_out_start <= window.end);
    }
}
