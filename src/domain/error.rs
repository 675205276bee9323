use std::fmt;

#[derive(Debug, Clone)]
pub enum AppError {
    Internal(String),
    ParseError(String),
    IoError(String),
    ConfigError(String),
    SourceError(String),
    NetworkError(String),
    ApiError { status: u16, body: String },
    SchemaError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppError::SourceError(msg) => write!(f, "Source error: {}", msg),
            AppError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppError::ApiError { status, body } => write!(f, "API Error {}: {}", status, body),
            AppError::SchemaError(msg) => write!(f, "Schema error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl AppError {
    /// HTTP status carried by an application-level rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the backend rejected a create because the resource already exists.
    pub fn is_duplicate(&self) -> bool {
        match self {
            AppError::ApiError { status: 409, .. } => true,
            AppError::ApiError { status, body } if (400..500).contains(status) => {
                let lower = body.to_lowercase();
                lower.contains("already exists") || lower.contains("duplicate")
            }
            _ => false,
        }
    }

    /// Connection failures, 5xx and 429 are worth another attempt; other 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::NetworkError(_) => true,
            AppError::ApiError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_duplicate() {
        let err = AppError::ApiError {
            status: 409,
            body: "conflict".to_string(),
        };
        assert!(err.is_duplicate());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_bad_request_mentioning_existing_field_is_duplicate() {
        let err = AppError::ApiError {
            status: 400,
            body: "field 'amount' already exists on object".to_string(),
        };
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_server_errors_are_transient() {
        let unavailable = AppError::ApiError {
            status: 503,
            body: String::new(),
        };
        let throttled = AppError::ApiError {
            status: 429,
            body: String::new(),
        };
        assert!(unavailable.is_transient());
        assert!(throttled.is_transient());
        assert!(!unavailable.is_duplicate());
        assert!(AppError::NetworkError("reset".to_string()).is_transient());
    }
}
