//! Error types for fleet services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidParameter(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Invalid-parameter error naming the offending field
    pub fn invalid_parameter(field: &str, detail: impl std::fmt::Display) -> Self {
        Self::InvalidParameter(format!("{}: {}", field, detail))
    }
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FleetError::InvalidParameter("x".into()).status_code(), 400);
        assert_eq!(FleetError::NotFound("x".into()).status_code(), 404);
        assert_eq!(FleetError::Conflict("x".into()).status_code(), 409);
        assert_eq!(FleetError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_invalid_parameter_names_field() {
        let err = FleetError::invalid_parameter("vrrp.priority", "want [1,255]");
        assert_eq!(err.to_string(), "Invalid parameter: vrrp.priority: want [1,255]");
    }
}
