//! Error types for the render module.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for render service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by a render service collaborator.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service could not be reached at all (connect/DNS/timeout).
    #[error("Render service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with an explicit error message.
    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected response from render service: {0}")]
    InvalidResponse(String),

    #[error("Invalid render request: {0}")]
    InvalidRequest(#[from] reel_core::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether this failure means the service was never reached.
    pub fn is_unreachable(&self) -> bool {
        match self {
            ServiceError::Unreachable(_) => true,
            ServiceError::Http(e) => e.is_connect() || e.is_timeout(),
            other => reel_core::is_unreachable_message(&other.to_string()),
        }
    }
}

/// Terminal failure of a render job. `Display` is the user-facing message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderFailure {
    /// Submission failed before a job was created
    #[error("{0}")]
    Submission(String),

    /// The job did not finish within the overall deadline
    #[error("Rendering timed out after {}. The video may be too complex or the render service is overloaded. Please try again.", humanize(*.deadline))]
    Timeout { deadline: Duration },

    /// Too many consecutive status checks failed
    #[error("Lost connection to render service after {failures} failed attempts. Please check your connection and try again.")]
    Exhausted { failures: u32 },

    /// The service reported that the job failed
    #[error("{0}")]
    Service(String),
}

/// User-facing message when the service cannot be reached during submission.
pub const UNREACHABLE_MESSAGE: &str =
    "Could not reach the render service. This may be a network issue or the server timed out. Please try again.";

impl RenderFailure {
    /// Build a submission failure, rewriting transport errors into guidance.
    pub fn from_submission(error: &ServiceError) -> Self {
        if error.is_unreachable() {
            RenderFailure::Submission(UNREACHABLE_MESSAGE.to_string())
        } else {
            RenderFailure::Submission(error.to_string())
        }
    }

    /// Taxonomy tag used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            RenderFailure::Submission(_) => "submission-failure",
            RenderFailure::Timeout { .. } => "timeout",
            RenderFailure::Exhausted { .. } => "exhausted",
            RenderFailure::Service(_) => "failed",
        }
    }
}

/// Render a duration the way people say it ("5 minutes", "90 seconds").
pub fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", minutes)
        }
    } else if secs == 1 {
        "1 second".to_string()
    } else if secs > 0 {
        format!("{} seconds", secs)
    } else {
        format!("{} ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_deadline() {
        let failure = RenderFailure::Timeout {
            deadline: Duration::from_secs(300),
        };
        assert_eq!(
            failure.to_string(),
            "Rendering timed out after 5 minutes. The video may be too complex or the render service is overloaded. Please try again."
        );
    }

    #[test]
    fn test_exhausted_message_names_ceiling() {
        let failure = RenderFailure::Exhausted { failures: 5 };
        assert!(failure.to_string().contains("after 5 failed attempts"));
        assert!(failure.to_string().contains("check your connection"));
    }

    #[test]
    fn test_submission_translation() {
        let unreachable = ServiceError::Unreachable("connection refused".to_string());
        assert_eq!(
            RenderFailure::from_submission(&unreachable).to_string(),
            UNREACHABLE_MESSAGE
        );

        let literal = ServiceError::InvalidResponse("TypeError: Failed to fetch".to_string());
        assert_eq!(
            RenderFailure::from_submission(&literal).to_string(),
            UNREACHABLE_MESSAGE
        );

        let rejected = ServiceError::Rejected("Function not found: render-fn".to_string());
        assert_eq!(
            RenderFailure::from_submission(&rejected).to_string(),
            "Function not found: render-fn"
        );
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_secs(60)), "1 minute");
        assert_eq!(humanize(Duration::from_secs(90)), "90 seconds");
        assert_eq!(humanize(Duration::from_millis(250)), "250 ms");
    }
}
