//! Chess game move trees.
//!
//! A game is a rooted tree of positions joined by moves. Child 0 of any node
//! continues its line; further children are variations in the order they were
//! first played. Nodes live in a generational arena, so handles held across a
//! reset or reload are detected as stale instead of aliasing new nodes.

pub mod arena;
pub mod error;
pub mod game_data;
pub mod move_tree;
pub mod persistence;
pub mod pgn;
pub mod projection;
pub mod rules;
pub mod traversal;

pub use arena::NodeId;
pub use error::TreeError;
pub use game_data::{Annotation, Evaluation, GameMetadata, GameMove, NewMove, Position, ScoreKind};
pub use move_tree::{ChessMoveTree, LineStep};
pub use projection::{MoveGroup, ProjectionConfig, TableRow};
pub use rules::{MoveGenerator, ShakmatyRules};
pub use traversal::MoveRecord;
