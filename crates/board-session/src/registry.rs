//! Open boards by id. Each board owns its own session and tree.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chess_core::{ChessMoveTree, ProjectionConfig};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::SessionError;
use crate::session::GameSession;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<GameSession>>>,
    projection: ProjectionConfig,
    next_game_id: AtomicI64,
}

impl SessionRegistry {
    pub fn new(projection: ProjectionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            projection,
            next_game_id: AtomicI64::new(1),
        }
    }

    /// Game id for a board opened without a stored game.
    pub fn allocate_game_id(&self) -> i64 {
        self.next_game_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Open `board_id` on a fresh standard-start tree, or return the session
    /// already open under that id.
    pub async fn open(&self, board_id: &str) -> Arc<GameSession> {
        // check and insert under one write lock so concurrent opens agree
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(board_id.to_string()).or_insert_with(|| {
            let tree = ChessMoveTree::standard(self.allocate_game_id());
            info!(board = board_id, "Board opened");
            Arc::new(GameSession::new(board_id, tree, self.projection))
        });
        Arc::clone(session)
    }

    /// Open `board_id` on `tree`, replacing any session under that id.
    pub async fn open_with(&self, board_id: &str, tree: ChessMoveTree) -> Arc<GameSession> {
        let session = Arc::new(GameSession::new(board_id, tree, self.projection));
        let previous = self
            .sessions
            .write()
            .await
            .insert(board_id.to_string(), Arc::clone(&session));
        if let Some(previous) = previous {
            previous.cancel_analysis().await;
        }
        info!(board = board_id, "Board opened");
        session
    }

    pub async fn get(&self, board_id: &str) -> Option<Arc<GameSession>> {
        self.sessions.read().await.get(board_id).cloned()
    }

    pub async fn require(&self, board_id: &str) -> Result<Arc<GameSession>, SessionError> {
        self.get(board_id)
            .await
            .ok_or_else(|| SessionError::BoardNotOpen(board_id.to_string()))
    }

    /// Close `board_id`, cancelling its analysis. The tree is dropped once the
    /// last outstanding `Arc` goes.
    pub async fn close(&self, board_id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(board_id)
            .ok_or_else(|| SessionError::BoardNotOpen(board_id.to_string()))?;
        session.cancel_analysis().await;
        info!(board = board_id, "Board closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
