//! Display projections built on top of [`crate::traversal::walk`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::arena::NodeId;
use crate::move_tree::ChessMoveTree;
use crate::traversal::{self, MoveRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Main-line plies per [`MoveGroup`]
    pub window_plies: usize,
    /// Variation lines longer than this are marked collapsible
    pub collapse_after: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            window_plies: 6,
            collapse_after: 5,
        }
    }
}

/// Consecutive moves of one variation at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationRun {
    pub depth: u32,
    pub parent_move_number: u32,
    /// Node the run branches off from
    pub branch_from: NodeId,
    pub moves: Vec<MoveRecord>,
}

impl VariationRun {
    fn first_ply(&self) -> u32 {
        self.moves.first().map_or(0, |m| m.ply)
    }
}

/// A fixed window of the main line plus the variations branching inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveGroup {
    pub index: usize,
    pub first_move_number: u32,
    pub last_move_number: u32,
    pub main_line: Vec<MoveRecord>,
    pub variations: Vec<VariationRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCell {
    pub handle: NodeId,
    pub san: String,
    pub ply: u32,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationLine {
    pub depth: u32,
    pub moves: Vec<MoveCell>,
    pub nested: Vec<VariationLine>,
    pub collapsible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TableRow {
    #[serde(rename_all = "camelCase")]
    Moves {
        move_number: u32,
        white: Option<MoveCell>,
        black: Option<MoveCell>,
    },
    #[serde(rename_all = "camelCase")]
    Variation { move_number: u32, line: VariationLine },
}

/// Chain variation records into runs. A run continues while each record is
/// the child-0 continuation of the previous one.
fn build_runs(variations: Vec<MoveRecord>) -> Vec<VariationRun> {
    let mut runs: Vec<VariationRun> = Vec::new();
    for record in variations {
        if let Some(run) = runs.last_mut() {
            let continues = !record.starts_variation
                && run.depth == record.depth
                && run.moves.last().is_some_and(|m| m.handle == record.parent);
            if continues {
                run.moves.push(record);
                continue;
            }
        }
        runs.push(VariationRun {
            depth: record.depth,
            parent_move_number: record.parent_move_number,
            branch_from: record.parent,
            moves: vec![record],
        });
    }
    runs
}

/// Group runs into trees headed by a depth-1 run, ordered by the main-line
/// point they branch from. Siblings keep insertion order.
fn variation_trees(variations: Vec<MoveRecord>) -> Vec<Vec<VariationRun>> {
    let mut trees: Vec<Vec<VariationRun>> = Vec::new();
    for run in build_runs(variations) {
        match trees.last_mut() {
            Some(current) if run.depth > 1 => current.push(run),
            _ => trees.push(vec![run]),
        }
    }
    trees.sort_by_key(|t| (t[0].parent_move_number, t[0].first_ply()));
    trees
}

pub fn project_move_groups(tree: &ChessMoveTree, config: &ProjectionConfig) -> Vec<MoveGroup> {
    let (main, variations) = traversal::partition(traversal::walk(tree));
    let window = config.window_plies.max(1);

    let mut groups: Vec<MoveGroup> = main
        .chunks(window)
        .enumerate()
        .map(|(index, chunk)| MoveGroup {
            index,
            first_move_number: chunk[0].move_number,
            last_move_number: chunk[chunk.len() - 1].move_number,
            main_line: chunk.to_vec(),
            variations: Vec::new(),
        })
        .collect();

    if groups.is_empty() {
        return groups;
    }

    for runs in variation_trees(variations) {
        let number = runs[0].parent_move_number;
        let slot = groups
            .iter()
            .position(|g| (g.first_move_number..=g.last_move_number).contains(&number))
            .unwrap_or(groups.len() - 1);
        groups[slot].variations.extend(runs);
    }

    groups
}

pub fn project_table_rows(tree: &ChessMoveTree, config: &ProjectionConfig) -> Vec<TableRow> {
    let cursor = tree.cursor();
    let (main, variations) = traversal::partition(traversal::walk(tree));

    let mut by_number: HashMap<u32, Vec<VariationLine>> = HashMap::new();
    for runs in variation_trees(variations) {
        let number = runs[0].parent_move_number;
        if let Some(line) = nest_runs(runs, cursor, config) {
            by_number.entry(number).or_default().push(line);
        }
    }

    let mut rows = Vec::new();
    let mut index = 0;
    while index < main.len() {
        let number = main[index].move_number;
        let mut white = None;
        let mut black = None;
        while index < main.len() && main[index].move_number == number {
            let entry = cell(&main[index], cursor);
            if main[index].is_white {
                white = Some(entry);
            } else {
                black = Some(entry);
            }
            index += 1;
        }
        rows.push(TableRow::Moves {
            move_number: number,
            white,
            black,
        });
        if let Some(lines) = by_number.remove(&number) {
            rows.extend(lines.into_iter().map(|line| TableRow::Variation {
                move_number: number,
                line,
            }));
        }
    }

    rows
}

fn cell(record: &MoveRecord, cursor: NodeId) -> MoveCell {
    MoveCell {
        handle: record.handle,
        san: record.san.clone(),
        ply: record.ply,
        is_current: record.handle == cursor,
    }
}

/// Turn a preorder list of runs (head first) into one nested line.
fn nest_runs(runs: Vec<VariationRun>, cursor: NodeId, config: &ProjectionConfig) -> Option<VariationLine> {
    let mut owner: HashMap<NodeId, usize> = HashMap::new();
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(runs.len());
    let mut lines: Vec<Option<VariationLine>> = Vec::with_capacity(runs.len());

    for (i, run) in runs.into_iter().enumerate() {
        let parent = if i == 0 {
            None
        } else {
            Some(owner.get(&run.branch_from).copied().unwrap_or(0))
        };
        for m in &run.moves {
            owner.insert(m.handle, i);
        }
        parents.push(parent);
        lines.push(Some(VariationLine {
            depth: run.depth,
            collapsible: run.moves.len() > config.collapse_after,
            moves: run.moves.iter().map(|m| cell(m, cursor)).collect(),
            nested: Vec::new(),
        }));
    }

    // children follow their parent in preorder, so fold from the back
    for i in (1..lines.len()).rev() {
        if let (Some(line), Some(parent)) = (lines[i].take(), parents[i]) {
            if let Some(target) = lines[parent].as_mut() {
                target.nested.insert(0, line);
            }
        }
    }

    lines.into_iter().next().flatten()
}
