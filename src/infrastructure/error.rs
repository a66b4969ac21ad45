use crate::domain::error::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Another routine is already active: {0}")]
    ActiveRunConflict(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<InfraError> for EngineError {
    fn from(error: InfraError) -> Self {
        match error {
            InfraError::ActiveRunConflict(run_id) => EngineError::InvalidTransition(format!(
                "run {run_id} is still active; finish or abandon it first"
            )),
            other => EngineError::Persistence(other.to_string()),
        }
    }
}
