use std::future::Future;
use std::time::Duration;

/// Result type for render pipeline operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Error types for the render pipeline
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Ambiguous effect: {}", .0.join(", "))]
    AmbiguousEffect(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{stage} timed out after {:.1}s", .limit.as_secs_f64())]
    Timeout { stage: String, limit: Duration },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Output verification failed: {0}")]
    Verification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse failure taxonomy surfaced to callers and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Timeout,
    Execution,
    Verification,
}

impl RenderError {
    pub fn execution(message: impl Into<String>) -> Self {
        RenderError::Execution(message.into())
    }

    pub fn timeout(stage: impl Into<String>, limit: Duration) -> Self {
        RenderError::Timeout {
            stage: stage.into(),
            limit,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RenderError::MissingField(_)
            | RenderError::UnknownEngine(_)
            | RenderError::InvalidSpec(_)
            | RenderError::AmbiguousEffect(_)
            | RenderError::Config(_) => ErrorCategory::Configuration,
            RenderError::Timeout { .. } => ErrorCategory::Timeout,
            RenderError::Verification(_) => ErrorCategory::Verification,
            RenderError::Execution(_) | RenderError::Io(_) | RenderError::Json(_) => {
                ErrorCategory::Execution
            }
        }
    }
}

/// Bound a suspension point, converting an expired wait into a labelled timeout error.
pub async fn with_timeout<T, F>(stage: &str, limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::timeout(stage, limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RenderError::UnknownEngine("nonexistent".into()).to_string(),
            "Unknown engine: nonexistent"
        );
        assert_eq!(
            RenderError::MissingField("data").to_string(),
            "Missing required field: data"
        );
        let timeout = RenderError::timeout("Wait for render done", Duration::from_millis(1500));
        assert_eq!(timeout.to_string(), "Wait for render done timed out after 1.5s");
        assert_eq!(timeout.category(), ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("Sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().starts_with("Sleep"));
    }

    #[test]
    fn test_with_timeout_returns_value_in_time() {
        let value = tokio_test::block_on(with_timeout("Quick", Duration::from_secs(1), async {
            Ok::<_, RenderError>(7)
        }));
        assert_eq!(tokio_test::assert_ok!(value), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_passes_inner_error() {
        let result: Result<()> = with_timeout("Quick", Duration::from_secs(1), async {
            Err(RenderError::execution("boom"))
        })
        .await;

        assert_eq!(result.unwrap_err().category(), ErrorCategory::Execution);
    }
}
