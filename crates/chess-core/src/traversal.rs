//! Read-only depth-first linearization of the move tree.
//!
//! The walk visits the continuation (child 0) of every node before its
//! variations, so a line's moves come out contiguously. Siblings at index 1..
//! each open a new, one-deeper variation. The stack is explicit; imported
//! games can nest variations far deeper than a comfortable recursion depth.

use std::collections::HashSet;

use serde::Serialize;
use shakmaty::Color;
use tracing::warn;

use crate::arena::NodeId;
use crate::game_data::move_number;
use crate::move_tree::ChessMoveTree;

/// One move as seen by the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub handle: NodeId,
    pub parent: NodeId,
    pub san: String,
    pub ply: u32,
    pub move_number: u32,
    pub is_white: bool,
    pub is_main_line: bool,
    pub depth: u32,
    /// Move number of the main-line move the enclosing variation branches from
    pub parent_move_number: u32,
    /// The node sits at child index > 0
    pub starts_variation: bool,
}

struct Frame {
    id: NodeId,
    is_main_line: bool,
    depth: u32,
    parent_move_number: u32,
    starts_variation: bool,
}

/// Every move in the tree, in depth-first continuation-first order.
///
/// Move numbers and colours count from the root's side to move, so a root
/// with Black to move opens with a black `1...` move rather than a white one.
pub fn walk(tree: &ChessMoveTree) -> Vec<MoveRecord> {
    let black_first = tree
        .node(tree.root())
        .is_ok_and(|root| root.position().side_to_move() == Some(Color::Black));
    let offset = u32::from(black_first);
    let mut records = Vec::with_capacity(tree.len().saturating_sub(1));
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![Frame {
        id: tree.root(),
        is_main_line: true,
        depth: 0,
        parent_move_number: 0,
        starts_variation: false,
    }];

    while let Some(frame) = stack.pop() {
        if !visited.insert(frame.id) {
            warn!(node = %frame.id, "Node revisited during traversal, not descending");
            continue;
        }
        let node = match tree.node(frame.id) {
            Ok(node) => node,
            Err(e) => {
                warn!(node = %frame.id, error = %e, "Skipping unreachable node");
                continue;
            }
        };

        let mut inherited = frame.parent_move_number;
        if let (Some(gm), Some(parent)) = (node.game_move(), node.parent()) {
            let counted = gm.ply() + offset;
            let number = move_number(counted);
            if frame.is_main_line || (frame.starts_variation && frame.depth == 1) {
                inherited = number;
            }
            records.push(MoveRecord {
                handle: frame.id,
                parent,
                san: gm.san().to_string(),
                ply: gm.ply(),
                move_number: number,
                is_white: counted % 2 == 1,
                is_main_line: frame.is_main_line,
                depth: frame.depth,
                parent_move_number: inherited,
                starts_variation: frame.starts_variation,
            });
        }

        // variations pushed first so the continuation pops next
        let children = node.children();
        for &child in children.iter().skip(1).rev() {
            stack.push(Frame {
                id: child,
                is_main_line: false,
                depth: frame.depth + 1,
                parent_move_number: inherited,
                starts_variation: true,
            });
        }
        if let Some(&first) = children.first() {
            stack.push(Frame {
                id: first,
                is_main_line: frame.is_main_line,
                depth: frame.depth,
                parent_move_number: inherited,
                starts_variation: false,
            });
        }
    }

    records
}

/// Split records into (main line, variations), preserving walk order.
pub fn partition(records: Vec<MoveRecord>) -> (Vec<MoveRecord>, Vec<MoveRecord>) {
    records.into_iter().partition(|r| r.is_main_line)
}
