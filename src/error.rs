use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImporterError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ImporterError {
    fn from(err: serde_json::Error) -> Self {
        ImporterError::Serialization(err.to_string())
    }
}

/// Failure reported by a metrics service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {}", .errors.join(", "))]
    Api { status: u16, errors: Vec<String> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ImporterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = ImporterError::Config("Config is not provided.".to_string());
        assert_eq!(err.to_string(), "configuration error: Config is not provided.");
    }

    #[test]
    fn test_api_error_joins_messages() {
        let err = ServiceError::Api {
            status: 403,
            errors: vec!["Forbidden".to_string(), "bad key".to_string()],
        };
        assert_eq!(err.to_string(), "API error (403): Forbidden, bad key");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_is_classified() {
        assert!(ServiceError::NotFound("cpu".to_string()).is_not_found());
        assert!(!ServiceError::Transport("reset".to_string()).is_not_found());
    }
}
