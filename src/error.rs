use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskpilotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl TaskpilotError {
    /// HTTP status a handler should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskpilotError::TaskNotFound(_)
            | TaskpilotError::RecordingNotFound(_)
            | TaskpilotError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
            TaskpilotError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskpilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_map_to_404() {
        assert_eq!(
            TaskpilotError::TaskNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TaskpilotError::RecordingNotFound("a.webm".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TaskpilotError::ConfigNotFound("id".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_maps_to_400_and_io_to_500() {
        assert_eq!(
            TaskpilotError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(
            TaskpilotError::from(io).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
