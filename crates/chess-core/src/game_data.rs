use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::arena::NodeId;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: Option<String>,
    pub time_control: Option<String>,
    pub eco: Option<String>,
    pub event: Option<String>,
    pub site: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Centipawns,
    Mate,
}

/// One engine (or annotator) opinion about a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Centipawns, or moves to mate (negative = side to move gets mated)
    pub score: i32,
    pub kind: ScoreKind,
    pub depth: u32,
    pub engine: String,
    pub best_move: Option<String>,
}

/// A board state. The FEN is fixed at creation; evaluations only accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    fen: String,
    evaluations: Vec<Evaluation>,
    variant: Option<String>,
}

impl Position {
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            evaluations: Vec::new(),
            variant: None,
        }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_START_FEN)
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_evaluations(mut self, evaluations: Vec<Evaluation>) -> Self {
        self.evaluations = evaluations;
        self
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub(crate) fn push_evaluation(&mut self, evaluation: Evaluation) {
        self.evaluations.push(evaluation);
    }

    /// Side to move, from the second FEN field.
    pub fn side_to_move(&self) -> Option<Color> {
        match self.fen.split_whitespace().nth(1)? {
            "w" => Some(Color::White),
            "b" => Some(Color::Black),
            _ => None,
        }
    }

    /// Full-move counter, if the FEN carries one.
    pub fn fullmove_number(&self) -> Option<u32> {
        self.fen.split_whitespace().nth(5)?.parse().ok()
    }
}

/// Serialized as `{"type": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Annotation {
    Comment(String),
    Arrow { from: String, to: String, color: String },
    Highlight { square: String, color: String },
    Nag(u8),
}

/// Clock data for a single move, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTracking {
    pub spent_ms: Option<u64>,
    pub left_ms: Option<u64>,
}

impl TimeTracking {
    pub fn is_empty(&self) -> bool {
        self.spent_ms.is_none() && self.left_ms.is_none()
    }
}

/// A move as recorded in the tree. Only annotations (and clock data missing at
/// creation) change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMove {
    ply: u32,
    san: String,
    uci: String,
    game_id: i64,
    annotations: Vec<Annotation>,
    time: TimeTracking,
}

impl GameMove {
    pub fn ply(&self) -> u32 {
        self.ply
    }

    pub fn san(&self) -> &str {
        &self.san
    }

    pub fn uci(&self) -> &str {
        &self.uci
    }

    pub fn game_id(&self) -> i64 {
        self.game_id
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn time(&self) -> TimeTracking {
        self.time
    }

    /// Full move number this ply belongs to.
    pub fn move_number(&self) -> u32 {
        move_number(self.ply)
    }

    pub fn is_white(&self) -> bool {
        self.ply % 2 == 1
    }

    /// Concatenated comment text, if any.
    pub fn comment(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::Comment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Same move by UCI, or by SAN when neither side is missing it.
    pub fn matches(&self, mv: &NewMove) -> bool {
        (!self.uci.is_empty() && self.uci == mv.uci) || (!self.san.is_empty() && self.san == mv.san)
    }

    pub(crate) fn annotations_mut(&mut self) -> &mut Vec<Annotation> {
        &mut self.annotations
    }

    pub(crate) fn time_mut(&mut self) -> &mut TimeTracking {
        &mut self.time
    }
}

/// `ceil(ply / 2)`
pub fn move_number(ply: u32) -> u32 {
    ply.div_ceil(2)
}

/// Caller-supplied move data for an append. Ply and game id come from the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMove {
    pub san: String,
    pub uci: String,
    pub annotations: Vec<Annotation>,
    pub time: TimeTracking,
}

impl NewMove {
    pub fn new(san: impl Into<String>, uci: impl Into<String>) -> Self {
        Self {
            san: san.into(),
            uci: uci.into(),
            ..Default::default()
        }
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_time(mut self, time: TimeTracking) -> Self {
        self.time = time;
        self
    }

    pub(crate) fn into_game_move(self, ply: u32, game_id: i64) -> GameMove {
        GameMove {
            ply,
            san: self.san,
            uci: self.uci,
            game_id,
            annotations: self.annotations,
            time: self.time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChessTreeNode {
    game_move: Option<GameMove>,
    position: Position,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ChessTreeNode {
    pub(crate) fn root(position: Position) -> Self {
        Self {
            game_move: None,
            position,
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn child(parent: NodeId, game_move: GameMove, position: Position) -> Self {
        Self {
            game_move: Some(game_move),
            position,
            parent: Some(parent),
            children: Vec::new(),
        }
    }

    /// Absent only at the root.
    pub fn game_move(&self) -> Option<&GameMove> {
        self.game_move.as_ref()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Index 0 continues the line; the rest are variations in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// 0 at the root.
    pub fn ply(&self) -> u32 {
        self.game_move.as_ref().map_or(0, GameMove::ply)
    }

    pub(crate) fn game_move_mut(&mut self) -> Option<&mut GameMove> {
        self.game_move.as_mut()
    }

    pub(crate) fn position_mut(&mut self) -> &mut Position {
        &mut self.position
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }
}
