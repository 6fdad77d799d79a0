use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Authentication failed for {user}: {reason}")]
    Authentication { user: String, reason: String },

    #[error("Cannot parse timestamp from '{value}': {reason}")]
    Parse { value: String, reason: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Upload of {path} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Unsupported media type: {path}")]
    UnsupportedMedia { path: String },

    #[error("Source platform error: {0}")]
    Source(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn missing_setting(key: &str) -> Self {
        Self::Config(format!("required setting {} is not set", key))
    }

    pub fn authentication(user: &str, reason: &str) -> Self {
        Self::Authentication {
            user: user.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(value: &str, reason: &str) -> Self {
        Self::Parse {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn unsupported_media(path: &str) -> Self {
        Self::UnsupportedMedia {
            path: path.to_string(),
        }
    }

    /// Errors that would fail identically on every attempt. Only used to
    /// annotate log output; the retry policy retries everything.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Validation { .. }
                | AppError::Authentication { .. }
                | AppError::Parse { .. }
                | AppError::UnsupportedMedia { .. }
        )
    }
}
