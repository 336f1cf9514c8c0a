//! Move tree error types

use thiserror::Error;

use crate::arena::NodeId;

#[derive(Error, Debug)]
pub enum TreeError {
    /// The handle's generation no longer matches its slot. Routine after a
    /// reset: callers should re-fetch the cursor and carry on.
    #[error("Stale handle: {0}")]
    StaleHandle(NodeId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Cycle detected at node {0}")]
    CycleDetected(NodeId),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("PGN error: {0}")]
    Pgn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    /// True for errors that only mean "your handle is out of date".
    pub fn is_stale(&self) -> bool {
        matches!(self, TreeError::StaleHandle(_))
    }
}
