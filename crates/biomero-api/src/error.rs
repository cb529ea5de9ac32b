use thiserror::Error;

/// Errors raised while talking to the server or reading configuration.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload: {0}")]
    Payload(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The server refused the request for this user (HTTP 403).
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Status { status: 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_forbidden() {
        let err = ApiError::Status {
            status: 403,
            message: "Unauthorized request".into(),
        };
        assert!(err.is_forbidden());
        assert_eq!(err.to_string(), "server returned 403: Unauthorized request");
        assert!(!ApiError::validation("No items selected").is_forbidden());
        assert_eq!(
            ApiError::validation("No items selected").to_string(),
            "No items selected"
        );
    }
}
