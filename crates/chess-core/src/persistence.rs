//! Flat row form of a move tree, for storage and transport.
//!
//! Rows are emitted parent-first (preorder, continuation first) with an
//! explicit `sort_order` per sibling, so main-line vs variation survives a
//! round trip through any store that does not preserve insertion order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arena::NodeId;
use crate::error::TreeError;
use crate::game_data::{Annotation, Evaluation, NewMove, Position, TimeTracking};
use crate::move_tree::ChessMoveTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: u32,
    pub parent_id: Option<u32>,
    pub ply: u32,
    pub san: String,
    pub uci: String,
    pub fen: String,
    pub variant: Option<String>,
    /// Index among siblings; 0 is the continuation
    pub sort_order: u32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
    #[serde(default)]
    pub time: TimeTracking,
}

/// Flatten `tree` into rows numbered 0.. in preorder. Row 0 is the root.
pub fn to_rows(tree: &ChessMoveTree) -> Result<Vec<NodeRow>, TreeError> {
    let mut rows = Vec::with_capacity(tree.len());
    let mut numbering: HashMap<NodeId, u32> = HashMap::new();
    let mut pending: Vec<(NodeId, u32)> = vec![(tree.root(), 0)];

    while let Some((id, sort_order)) = pending.pop() {
        if numbering.contains_key(&id) {
            return Err(TreeError::CycleDetected(id));
        }
        let node = tree.node(id)?;
        let row_id = rows.len() as u32;
        numbering.insert(id, row_id);

        let parent_id = match node.parent() {
            Some(parent) => Some(
                *numbering
                    .get(&parent)
                    .ok_or_else(|| TreeError::Persistence(format!("parent of {id} not yet written")))?,
            ),
            None => None,
        };
        let position = node.position();
        let (san, uci, annotations, time) = match node.game_move() {
            Some(gm) => (gm.san().to_string(), gm.uci().to_string(), gm.annotations().to_vec(), gm.time()),
            None => (String::new(), String::new(), Vec::new(), TimeTracking::default()),
        };

        rows.push(NodeRow {
            id: row_id,
            parent_id,
            ply: node.ply(),
            san,
            uci,
            fen: position.fen().to_string(),
            variant: position.variant().map(str::to_string),
            sort_order,
            annotations,
            evaluations: position.evaluations().to_vec(),
            time,
        });

        for (index, &child) in node.children().iter().enumerate().rev() {
            pending.push((child, index as u32));
        }
    }

    Ok(rows)
}

/// Rebuild a tree from rows in any parent-first order.
///
/// Siblings are ordered by `sort_order`. The cursor ends at the root.
pub fn from_rows(game_id: i64, rows: &[NodeRow]) -> Result<ChessMoveTree, TreeError> {
    let mut seen: HashSet<u32> = HashSet::new();
    let mut root: Option<&NodeRow> = None;
    let mut children: HashMap<u32, Vec<&NodeRow>> = HashMap::new();

    for row in rows {
        if !seen.insert(row.id) {
            return Err(TreeError::Persistence(format!("duplicate row id {}", row.id)));
        }
        match row.parent_id {
            None if root.is_some() => {
                return Err(TreeError::Persistence(format!("second root row {}", row.id)));
            }
            None => root = Some(row),
            Some(parent) if parent == row.id => {
                return Err(TreeError::CycleDetected(NodeId::new(row.id, 0)));
            }
            Some(parent) if !seen.contains(&parent) => {
                return Err(TreeError::Persistence(format!(
                    "row {} references parent {parent} that has not appeared",
                    row.id
                )));
            }
            Some(parent) => children.entry(parent).or_default().push(row),
        }
    }

    let root = root.ok_or_else(|| TreeError::Persistence("no root row".into()))?;
    if root.ply != 0 {
        return Err(TreeError::InvalidMove(format!("root row {} claims ply {}", root.id, root.ply)));
    }
    if !root.san.is_empty() || !root.uci.is_empty() {
        return Err(TreeError::Persistence(format!("root row {} carries a move", root.id)));
    }
    for siblings in children.values_mut() {
        siblings.sort_by_key(|r| r.sort_order);
        if siblings.windows(2).any(|w| w[0].sort_order == w[1].sort_order) {
            return Err(TreeError::Persistence(format!(
                "duplicate sort order under parent {:?}",
                siblings[0].parent_id
            )));
        }
    }

    let mut tree = ChessMoveTree::new(game_id, row_position(root))?;
    let mut pending: Vec<(u32, NodeId)> = vec![(root.id, tree.root())];
    while let Some((row_id, node)) = pending.pop() {
        let Some(siblings) = children.get(&row_id) else { continue };
        let expected_ply = tree.node(node)?.ply() + 1;
        let mut created = Vec::with_capacity(siblings.len());
        for row in siblings {
            if row.ply != expected_ply {
                return Err(TreeError::InvalidMove(format!(
                    "row {} claims ply {}, parent implies {expected_ply}",
                    row.id, row.ply
                )));
            }
            let mv = NewMove {
                san: row.san.clone(),
                uci: row.uci.clone(),
                annotations: row.annotations.clone(),
                time: row.time,
            };
            // append_move would merge these silently
            if tree.find_child_by_move(node, &mv)?.is_some() {
                return Err(TreeError::Persistence(format!(
                    "row {} repeats a sibling move {}",
                    row.id,
                    if row.san.is_empty() { &row.uci } else { &row.san }
                )));
            }
            let child = tree.append_move(node, mv, row_position(row))?;
            created.push((row.id, child));
        }
        pending.extend(created.into_iter().rev());
    }

    tree.to_start();
    debug!(game_id, rows = rows.len(), "Rebuilt move tree from rows");
    Ok(tree)
}

fn row_position(row: &NodeRow) -> Position {
    let mut position = Position::new(row.fen.clone()).with_evaluations(row.evaluations.clone());
    if let Some(variant) = &row.variant {
        position = position.with_variant(variant.clone());
    }
    position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{MoveGenerator, ShakmatyRules};

    fn play(tree: &mut ChessMoveTree, from: NodeId, san: &str) -> NodeId {
        let fen = tree.node(from).unwrap().position().fen().to_string();
        let played = ShakmatyRules.play(&fen, san).unwrap();
        tree.append_move(from, played.to_new_move(), Position::new(played.fen))
            .unwrap()
    }

    fn sample() -> ChessMoveTree {
        let mut tree = ChessMoveTree::standard(3);
        let root = tree.root();
        let e4 = play(&mut tree, root, "e4");
        play(&mut tree, e4, "e5");
        let c5 = play(&mut tree, e4, "c5");
        tree.set_comment(c5, "Sicilian").unwrap();
        tree.annotate(c5, Annotation::Nag(5)).unwrap();
        play(&mut tree, root, "d4");
        tree
    }

    #[test]
    fn test_rows_are_parent_first() {
        let rows = to_rows(&sample()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].parent_id, None);
        let sans: Vec<&str> = rows.iter().map(|r| r.san.as_str()).collect();
        assert_eq!(sans, vec!["", "e4", "e5", "c5", "d4"]);
        assert_eq!(rows[3].sort_order, 1);
        assert_eq!(rows[4].parent_id, Some(0));
        assert_eq!(rows[4].sort_order, 1);
    }

    #[test]
    fn test_rows_rebuild_same_shape() {
        let tree = sample();
        let mut rows = to_rows(&tree).unwrap();
        // storage may hand siblings back in any order
        rows.swap(2, 3);

        let rebuilt = from_rows(3, &rows).unwrap();
        assert_eq!(to_rows(&rebuilt).unwrap(), to_rows(&tree).unwrap());
        assert_eq!(rebuilt.cursor(), rebuilt.root());
    }

    #[test]
    fn test_rejects_malformed_rows() {
        let rows = to_rows(&sample()).unwrap();

        let mut orphan = rows.clone();
        orphan[1].parent_id = Some(42);
        assert!(matches!(from_rows(1, &orphan), Err(TreeError::Persistence(_))));

        let mut duplicate = rows.clone();
        duplicate[2].id = duplicate[1].id;
        assert!(matches!(from_rows(1, &duplicate), Err(TreeError::Persistence(_))));

        let mut same_order = rows.clone();
        same_order[3].sort_order = 0;
        assert!(matches!(from_rows(1, &same_order), Err(TreeError::Persistence(_))));

        let mut looped = rows.clone();
        looped[1].parent_id = Some(looped[1].id);
        assert!(matches!(from_rows(1, &looped), Err(TreeError::CycleDetected(_))));

        let no_root: Vec<NodeRow> = rows[1..].to_vec();
        assert!(from_rows(1, &no_root).is_err());
    }

    #[test]
    fn test_rejects_rows_with_wrong_ply() {
        let rows = to_rows(&sample()).unwrap();

        let mut skipped = rows.clone();
        skipped[1].ply = 7;
        assert!(matches!(from_rows(1, &skipped), Err(TreeError::InvalidMove(_))));

        let mut deep_root = rows.clone();
        deep_root[0].ply = 1;
        assert!(matches!(from_rows(1, &deep_root), Err(TreeError::InvalidMove(_))));

        let mut moved_root = rows.clone();
        moved_root[0].san = "e4".into();
        assert!(matches!(from_rows(1, &moved_root), Err(TreeError::Persistence(_))));
    }

    #[test]
    fn test_rejects_repeated_sibling_move() {
        let mut rows = to_rows(&sample()).unwrap();
        // a second e4 under the root, ahead of d4
        let mut again = rows[1].clone();
        again.id = 9;
        again.sort_order = 2;
        rows.push(again);
        assert!(matches!(from_rows(1, &rows), Err(TreeError::Persistence(_))));

        // matching by UCI alone is still a repeat
        let last = rows.len() - 1;
        rows[last].san = String::new();
        assert!(matches!(from_rows(1, &rows), Err(TreeError::Persistence(_))));
    }

    #[test]
    fn test_rows_serialize_as_json() {
        let rows = to_rows(&sample()).unwrap();
        let json = serde_json::to_string(&rows).unwrap();
        let back: Vec<NodeRow> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[3].annotations.len(), 2);
        assert_eq!(to_rows(&from_rows(3, &back).unwrap()).unwrap(), rows);
    }
}
