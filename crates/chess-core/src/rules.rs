//! Legal-move collaborator. The tree itself never checks chess rules; callers
//! use a [`MoveGenerator`] to turn user input into (SAN, UCI, FEN) triples.

use shakmaty::{
    fen::Fen,
    san::{San, SanPlus},
    uci::UciMove,
    CastlingMode, Chess, EnPassantMode, Move, Position,
};

use crate::error::TreeError;
use crate::game_data::NewMove;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    pub san: String,
    pub uci: String,
}

/// A move applied to a FEN: notation plus the resulting position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub san: String,
    pub uci: String,
    pub fen: String,
}

impl PlayedMove {
    pub fn to_new_move(&self) -> NewMove {
        NewMove::new(self.san.clone(), self.uci.clone())
    }
}

pub trait MoveGenerator {
    /// All legal moves in the position.
    fn legal_moves(&self, fen: &str) -> Result<Vec<LegalMove>, TreeError>;

    /// Apply a move given in UCI or SAN.
    fn play(&self, fen: &str, notation: &str) -> Result<PlayedMove, TreeError>;
}

/// Standard chess rules via shakmaty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl MoveGenerator for ShakmatyRules {
    fn legal_moves(&self, fen: &str) -> Result<Vec<LegalMove>, TreeError> {
        let pos = parse_position(fen)?;
        Ok(pos
            .legal_moves()
            .iter()
            .map(|m| LegalMove {
                san: San::from_move(&pos, *m).to_string(),
                uci: m.to_uci(CastlingMode::Standard).to_string(),
            })
            .collect())
    }

    fn play(&self, fen: &str, notation: &str) -> Result<PlayedMove, TreeError> {
        let mut pos = parse_position(fen)?;
        let mv = resolve_move(&pos, notation)?;
        Ok(apply(&mut pos, mv))
    }
}

pub fn parse_position(fen: &str) -> Result<Chess, TreeError> {
    let parsed: Fen = fen
        .parse()
        .map_err(|e| TreeError::InvalidMove(format!("bad FEN '{fen}': {e}")))?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| TreeError::InvalidMove(format!("illegal position '{fen}': {e}")))
}

pub fn position_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// UCI first (unambiguous), then SAN with or without a check suffix.
pub fn resolve_move(pos: &Chess, notation: &str) -> Result<Move, TreeError> {
    let notation = notation.trim();
    if let Ok(uci) = notation.parse::<UciMove>() {
        if let Ok(mv) = uci.to_move(pos) {
            return Ok(mv);
        }
    }
    let san_plus: SanPlus = notation
        .parse()
        .map_err(|_| TreeError::InvalidMove(format!("unreadable move '{notation}'")))?;
    san_plus
        .san
        .to_move(pos)
        .map_err(|e| TreeError::InvalidMove(format!("illegal move '{notation}': {e}")))
}

/// Play a legal move, reporting SAN with its check/mate suffix.
pub fn apply(pos: &mut Chess, mv: Move) -> PlayedMove {
    let mut san = San::from_move(&*pos, mv).to_string();
    let uci = mv.to_uci(CastlingMode::Standard).to_string();
    pos.play_unchecked(mv);
    if pos.is_checkmate() {
        san.push('#');
    } else if pos.is_check() {
        san.push('+');
    }
    PlayedMove {
        san,
        uci,
        fen: position_fen(pos),
    }
}
