//! One open board: a move tree, its cursor, and at most one live analysis.
//!
//! The tree sits behind a `RwLock`. Appends take the write lock for the whole
//! allocate-and-link step, so projections never see a half-linked node.
//! Rules and engine work run on copied FEN strings outside the lock.

use std::sync::Arc;

use chess_core::persistence::{self, NodeRow};
use chess_core::pgn::{self, ImportedGame};
use chess_core::projection::{self, MoveGroup, ProjectionConfig, TableRow};
use chess_core::traversal::{self, MoveRecord};
use chess_core::{
    Annotation, ChessMoveTree, Evaluation, GameMetadata, MoveGenerator, NodeId, Position, ShakmatyRules,
    TreeError,
};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{Engine, SearchLimits};
use crate::error::SessionError;

/// What became of one analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Recorded { node: NodeId, evaluation: Evaluation },
    /// A newer request replaced this one before it finished
    Superseded,
    /// The analysed node no longer exists (reset or reload in between)
    Stale(NodeId),
}

#[derive(Default)]
struct AnalysisSlot {
    request: u64,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct GameSession {
    board_id: String,
    tree: RwLock<ChessMoveTree>,
    metadata: RwLock<GameMetadata>,
    rules: Box<dyn MoveGenerator + Send + Sync>,
    projection: ProjectionConfig,
    analysis: Mutex<AnalysisSlot>,
}

impl GameSession {
    pub fn new(board_id: impl Into<String>, tree: ChessMoveTree, projection: ProjectionConfig) -> Self {
        Self {
            board_id: board_id.into(),
            tree: RwLock::new(tree),
            metadata: RwLock::new(GameMetadata::default()),
            rules: Box::new(ShakmatyRules),
            projection,
            analysis: Mutex::new(AnalysisSlot::default()),
        }
    }

    pub fn with_rules(mut self, rules: impl MoveGenerator + Send + Sync + 'static) -> Self {
        self.rules = Box::new(rules);
        self
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub async fn metadata(&self) -> GameMetadata {
        self.metadata.read().await.clone()
    }

    pub async fn set_metadata(&self, metadata: GameMetadata) {
        *self.metadata.write().await = metadata;
    }

    /// Run `f` against a consistent view of the tree.
    pub async fn read<R>(&self, f: impl FnOnce(&ChessMoveTree) -> R) -> R {
        let tree = self.tree.read().await;
        f(&tree)
    }

    pub async fn cursor(&self) -> NodeId {
        self.tree.read().await.cursor()
    }

    /// FEN at the cursor, copied out.
    pub async fn cursor_fen(&self) -> Result<(NodeId, String), SessionError> {
        let tree = self.tree.read().await;
        let cursor = tree.cursor();
        Ok((cursor, tree.node(cursor)?.position().fen().to_string()))
    }

    // ---- Editing ----

    /// Play `notation` (UCI or SAN) from the cursor.
    pub async fn make_move(&self, notation: &str) -> Result<NodeId, SessionError> {
        let (from, fen) = self.cursor_fen().await?;
        let played = self.rules.play(&fen, notation)?;

        let mut tree = self.tree.write().await;
        let variant = tree.node(from)?.position().variant().map(str::to_string);
        let mut position = Position::new(played.fen.clone());
        if let Some(variant) = variant {
            position = position.with_variant(variant);
        }
        let node = tree.append_move(from, played.to_new_move(), position)?;
        debug!(board = %self.board_id, node = %node, san = %played.san, "Move played");
        Ok(node)
    }

    pub async fn annotate(&self, node: NodeId, annotation: Annotation) -> Result<(), SessionError> {
        Ok(self.tree.write().await.annotate(node, annotation)?)
    }

    pub async fn set_comment(&self, node: NodeId, text: &str) -> Result<(), SessionError> {
        Ok(self.tree.write().await.set_comment(node, text)?)
    }

    pub async fn promote(&self, node: NodeId) -> Result<(), SessionError> {
        Ok(self.tree.write().await.promote_to_main_line(node)?)
    }

    /// Start over from `start`. Every handle issued so far goes stale.
    pub async fn reset(&self, start: Position) -> Result<(), SessionError> {
        self.tree.write().await.reset(start)?;
        *self.metadata.write().await = GameMetadata::default();
        Ok(())
    }

    // ---- Navigation ----

    pub async fn undo(&self) -> Result<NodeId, SessionError> {
        Ok(self.tree.write().await.step_back()?)
    }

    pub async fn redo(&self, variation: usize) -> Result<NodeId, SessionError> {
        Ok(self.tree.write().await.step_forward(variation)?)
    }

    pub async fn jump(&self, node: NodeId) -> Result<(), SessionError> {
        Ok(self.tree.write().await.set_cursor(node)?)
    }

    pub async fn to_start(&self) -> NodeId {
        self.tree.write().await.to_start()
    }

    pub async fn to_end(&self) -> NodeId {
        self.tree.write().await.to_end()
    }

    // ---- Projections ----

    pub async fn records(&self) -> Vec<MoveRecord> {
        self.read(traversal::walk).await
    }

    pub async fn table_rows(&self) -> Vec<TableRow> {
        let config = self.projection;
        self.read(|tree| projection::project_table_rows(tree, &config)).await
    }

    pub async fn move_groups(&self) -> Vec<MoveGroup> {
        let config = self.projection;
        self.read(|tree| projection::project_move_groups(tree, &config)).await
    }

    // ---- Storage ----

    pub async fn save_rows(&self) -> Result<Vec<NodeRow>, SessionError> {
        Ok(self.read(persistence::to_rows).await?)
    }

    pub async fn save_rows_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(&self.save_rows().await?)?)
    }

    /// Replace the tree with stored rows. Rows are validated before anything
    /// is touched; on success older handles go stale.
    pub async fn load_rows(&self, rows: &[NodeRow]) -> Result<(), SessionError> {
        let game_id = self.tree.read().await.game_id();
        let loaded = persistence::from_rows(game_id, rows)?;
        self.tree.write().await.reload_from(&loaded)?;
        info!(board = %self.board_id, rows = rows.len(), "Loaded stored rows");
        Ok(())
    }

    pub async fn load_rows_json(&self, json: &str) -> Result<(), SessionError> {
        let rows: Vec<NodeRow> = serde_json::from_str(json)?;
        self.load_rows(&rows).await
    }

    /// Replace the tree with the first game in `pgn`.
    pub async fn import_pgn(&self, pgn_text: &str) -> Result<(), SessionError> {
        let game_id = self.tree.read().await.game_id();
        let game = pgn::import_first_game(pgn_text, game_id)?;
        self.load_game(game).await
    }

    pub async fn load_game(&self, game: ImportedGame) -> Result<(), SessionError> {
        self.tree.write().await.reload_from(&game.tree)?;
        *self.metadata.write().await = game.metadata;
        info!(board = %self.board_id, "Game loaded");
        Ok(())
    }

    pub async fn export_pgn(&self) -> Result<String, SessionError> {
        let metadata = self.metadata().await;
        Ok(self.read(|tree| pgn::export_pgn(tree, &metadata)).await?)
    }

    // ---- Analysis ----

    /// Evaluate the cursor position in the background. Any analysis still
    /// running for this session is cancelled, and a result whose node has
    /// gone stale is dropped instead of recorded.
    pub async fn analyze_cursor<E>(
        self: &Arc<Self>,
        engine: Arc<Mutex<E>>,
        limits: SearchLimits,
    ) -> Result<JoinHandle<Result<AnalysisOutcome, SessionError>>, SessionError>
    where
        E: Engine + 'static,
    {
        let (node, fen) = self.cursor_fen().await?;
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let token = {
            let mut slot = self.analysis.lock().await;
            slot.request += 1;
            if let Some(previous) = slot.cancel.replace(cancel_tx) {
                let _ = previous.send(());
            }
            slot.request
        };
        debug!(board = %self.board_id, node = %node, token, "Analysis requested");

        let session = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let result = {
                let mut engine = engine.lock().await;
                let result = tokio::select! {
                    result = engine.evaluate(&fen, limits) => Some(result),
                    _ = &mut cancel_rx => None,
                };
                if result.is_none() {
                    engine.stop().await?;
                }
                result
            };

            let Some(result) = result else {
                debug!(board = %session.board_id, token, "Analysis cancelled");
                return Ok(AnalysisOutcome::Superseded);
            };
            session.finish_analysis(token, node, result?).await
        }))
    }

    /// Drop any running analysis without starting a new one.
    pub async fn cancel_analysis(&self) {
        let mut slot = self.analysis.lock().await;
        slot.request += 1;
        if let Some(cancel) = slot.cancel.take() {
            let _ = cancel.send(());
        }
    }

    async fn finish_analysis(
        &self,
        token: u64,
        node: NodeId,
        evaluation: Evaluation,
    ) -> Result<AnalysisOutcome, SessionError> {
        let mut slot = self.analysis.lock().await;
        if slot.request != token {
            warn!(board = %self.board_id, token, "Discarding superseded analysis");
            return Ok(AnalysisOutcome::Superseded);
        }
        slot.cancel = None;

        let mut tree = self.tree.write().await;
        match tree.record_evaluation(node, evaluation.clone()) {
            Ok(()) => {
                debug!(board = %self.board_id, node = %node, score = evaluation.score, "Evaluation recorded");
                Ok(AnalysisOutcome::Recorded { node, evaluation })
            }
            Err(TreeError::StaleHandle(_)) | Err(TreeError::NotFound(_)) => {
                warn!(board = %self.board_id, node = %node, "Discarding analysis for stale node");
                Ok(AnalysisOutcome::Stale(node))
            }
            Err(e) => Err(e.into()),
        }
    }
}
