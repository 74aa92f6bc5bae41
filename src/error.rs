use crate::session::SessionState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("sensor backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid input buffer: {0}")]
    InvalidInput(String),
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sensor read attempted while session is {0:?}")]
    SessionNotOpen(SessionState),
    #[error("session is closed, a new session is required")]
    SessionClosed,
    #[error("buffer release contract violated: {0}")]
    ContractViolation(String),
}
