use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    OrderingViolation,
    Persistence,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("finish earlier steps first: {0}")]
    OrderingViolation(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::OrderingViolation(_) => ErrorKind::OrderingViolation,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(detail)
            | Self::InvalidTransition(detail)
            | Self::OrderingViolation(detail)
            | Self::Persistence(detail) => detail,
        }
    }
}
