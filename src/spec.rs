//! Render specifications and the submission boundary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SpecDefaults;
use crate::error::{RenderError, Result};

/// Longest clip a spec may request, in seconds
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Immutable description of one artifact to render
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderSpec {
    /// Name of the registered engine that renders this spec
    pub engine: String,

    /// Optional visual template identifier
    pub template: Option<String>,

    /// Engine- and template-specific semantic fields
    pub data: Map<String, Value>,

    pub width: u32,
    pub height: u32,

    /// Requested length in seconds
    pub duration: f64,

    pub fps: u32,
    pub theme: String,
}

/// Raw submission as received from an outer layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitRequest {
    pub engine: Option<String>,
    pub data: Option<Value>,
    pub template: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub fps: Option<u32>,
    pub theme: Option<String>,
}

impl SubmitRequest {
    pub fn new(engine: impl Into<String>, data: Value) -> Self {
        Self {
            engine: Some(engine.into()),
            data: Some(data),
            ..Self::default()
        }
    }

    /// Parse a submission from JSON, rejecting unknown fields
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RenderError::InvalidSpec(e.to_string()))
    }

    /// Validate the submission and fill in defaults
    pub fn into_spec(self, defaults: &SpecDefaults) -> Result<RenderSpec> {
        let engine = self
            .engine
            .filter(|e| !e.trim().is_empty())
            .ok_or(RenderError::MissingField("engine"))?;

        let data = match self.data {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => return Err(RenderError::MissingField("data")),
            Some(other) => {
                return Err(RenderError::InvalidSpec(format!(
                    "data must be an object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let spec = RenderSpec {
            engine,
            template: self.template,
            data,
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            duration: self.duration.unwrap_or(defaults.duration),
            fps: self.fps.unwrap_or(defaults.fps),
            theme: self.theme.unwrap_or_else(|| defaults.theme.clone()),
        };

        spec.validate()?;
        Ok(spec)
    }
}

impl RenderSpec {
    /// Check dimensional invariants
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidSpec(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(RenderError::InvalidSpec("fps must be positive".into()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(RenderError::InvalidSpec(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        if self.duration > MAX_DURATION_SECS {
            return Err(RenderError::InvalidSpec(format!(
                "duration must be at most {}s, got {}",
                MAX_DURATION_SECS, self.duration
            )));
        }
        Ok(())
    }

    /// Template from the spec itself or, failing that, from `data.template`
    pub fn template_name(&self) -> Option<&str> {
        self.template
            .as_deref()
            .or_else(|| self.data.get("template").and_then(Value::as_str))
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Total frame count for the requested duration and frame rate
    pub fn total_frames(&self) -> u32 {
        ((self.duration * self.fps as f64).round() as u32).max(1)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_defaults() {
        let spec = SubmitRequest::new("infographic", json!({"title": "Hello"}))
            .into_spec(&SpecDefaults::default())
            .unwrap();

        assert_eq!(spec.engine, "infographic");
        assert_eq!(spec.width, 1920);
        assert_eq!(spec.height, 1080);
        assert_eq!(spec.fps, 30);
        assert_eq!(spec.theme, "default");
        assert_eq!(spec.total_frames(), 150);
    }

    #[test]
    fn test_missing_fields() {
        let missing_engine = SubmitRequest {
            data: Some(json!({})),
            ..SubmitRequest::default()
        };
        assert_eq!(
            missing_engine.into_spec(&SpecDefaults::default()).unwrap_err().to_string(),
            "Missing required field: engine"
        );

        let missing_data = SubmitRequest {
            engine: Some("motion".into()),
            ..SubmitRequest::default()
        };
        assert_eq!(
            missing_data.into_spec(&SpecDefaults::default()).unwrap_err().to_string(),
            "Missing required field: data"
        );
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = SubmitRequest::from_json(r#"{"engine":"motion","data":{},"priority":5}"#)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidSpec(_)));
    }

    #[test]
    fn test_invalid_dimensions() {
        let request = SubmitRequest {
            width: Some(0),
            ..SubmitRequest::new("motion", json!({}))
        };
        assert!(matches!(
            request.into_spec(&SpecDefaults::default()),
            Err(RenderError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_unrepresentable_duration_rejected() {
        let request = SubmitRequest {
            duration: Some(1e19),
            ..SubmitRequest::new("motion", json!({}))
        };
        let err = request.into_spec(&SpecDefaults::default()).unwrap_err();
        assert!(err.to_string().contains("duration must be at most"));

        let request = SubmitRequest {
            duration: Some(MAX_DURATION_SECS),
            ..SubmitRequest::new("motion", json!({}))
        };
        assert!(request.into_spec(&SpecDefaults::default()).is_ok());
    }

    #[test]
    fn test_template_from_data() {
        let spec = SubmitRequest::new("infographic", json!({"template": "list"}))
            .into_spec(&SpecDefaults::default())
            .unwrap();
        assert_eq!(spec.template_name(), Some("list"));
    }
}
