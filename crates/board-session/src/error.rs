//! Session error types

use chess_core::TreeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Move tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Board not open: {0}")]
    BoardNotOpen(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// A handle went stale under the caller. Re-read the cursor and retry.
    pub fn is_stale(&self) -> bool {
        matches!(self, SessionError::Tree(e) if e.is_stale())
    }
}
