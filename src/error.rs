//! Core error types
//!
//! Library code returns `DetectorError`; only the binary/bootstrap boundary
//! (`main.rs`, `config.rs` loading) uses `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("configuration rejected: {0}")]
    InvalidConfig(String),

    #[error("start() called while detector state is {0:?}, must be Stopped")]
    InvalidStartState(crate::detector::state_machine::State),

    #[error("stop() called while detector state is {0:?}, must be Running or Error")]
    InvalidStopState(crate::detector::state_machine::State),

    #[error("required collaborator missing at start: {0}")]
    MissingCollaborator(&'static str),

    #[error("state transition timed out after {0:?}")]
    TransitionTimeout(std::time::Duration),

    #[error("stream consumer error: {0}")]
    Stream(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
