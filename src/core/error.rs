use std::io;
use thiserror::Error;

use crate::core::model::SourceKind;

#[derive(Error, Debug)]
pub enum TandemError {
    #[error(
        "agent conflict: {kind} opinion on {key} is held by '{existing}', refusing '{attempted}'"
    )]
    AgentConflict {
        kind: SourceKind,
        key: String,
        existing: String,
        attempted: String,
    },
    #[error("malformed statement: {0}")]
    MalformedStatement(String),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("propagation overflow: notification fixed point not reached within {limit} rounds (depth {depth})")]
    PropagationOverflow { depth: usize, limit: usize },
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("listener error: {0}")]
    ListenerError(String),
}
