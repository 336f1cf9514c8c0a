//! The game move tree: arena-backed positions linked by moves, with a cursor.

use shakmaty::fen::Fen;
use shakmaty::Color;
use tracing::{debug, info};

use crate::arena::{Arena, NodeId};
use crate::error::TreeError;
use crate::game_data::{Annotation, ChessTreeNode, Evaluation, NewMove, Position, TimeTracking};

/// One recorded step of a line: the move and the FEN it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineStep {
    pub san: String,
    pub uci: String,
    pub fen: String,
}

impl LineStep {
    pub fn new(san: impl Into<String>, uci: impl Into<String>, fen: impl Into<String>) -> Self {
        Self {
            san: san.into(),
            uci: uci.into(),
            fen: fen.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChessMoveTree {
    game_id: i64,
    arena: Arena<ChessTreeNode>,
    root: NodeId,
    cursor: NodeId,
}

impl ChessMoveTree {
    /// Create a tree rooted at `start`. The root FEN must name a side to move.
    pub fn new(game_id: i64, start: Position) -> Result<Self, TreeError> {
        check_root(&start)?;
        let mut arena = Arena::new();
        let root = arena.allocate(ChessTreeNode::root(start));
        Ok(Self {
            game_id,
            arena,
            root,
            cursor: root,
        })
    }

    pub fn standard(game_id: i64) -> Self {
        let mut arena = Arena::new();
        let root = arena.allocate(ChessTreeNode::root(Position::standard()));
        Self {
            game_id,
            arena,
            root,
            cursor: root,
        }
    }

    pub fn game_id(&self) -> i64 {
        self.game_id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Result<&ChessTreeNode, TreeError> {
        self.arena.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    pub fn cursor_node(&self) -> Result<&ChessTreeNode, TreeError> {
        self.arena.get(self.cursor)
    }

    // ---- Mutation ----

    /// Append `mv` under `parent`, or reuse the matching child if one exists.
    /// Either way the cursor lands on the returned node.
    pub fn append_move(&mut self, parent: NodeId, mv: NewMove, position: Position) -> Result<NodeId, TreeError> {
        let parent_node = self.arena.get(parent)?;

        if let Some(existing) = self.find_child_by_move(parent, &mv)? {
            debug!(parent = %parent, child = %existing, san = %mv.san, "Move already present, reusing node");
            self.cursor = existing;
            return Ok(existing);
        }

        validate_step(parent_node.position(), &mv, &position)?;
        let ply = parent_node.ply() + 1;
        let game_move = mv.into_game_move(ply, self.game_id);

        let child = self.arena.allocate(ChessTreeNode::child(parent, game_move, position));
        if let Err(e) = self.arena.update(parent, |node| node.children_mut().push(child)) {
            // parent was checked above; keep the arena whole regardless
            let _ = self.arena.free(child);
            return Err(e);
        }

        debug!(parent = %parent, child = %child, ply, "Appended move");
        self.cursor = child;
        Ok(child)
    }

    /// Fold a recorded line into successive appends starting at `from`.
    pub fn append_line(&mut self, from: NodeId, steps: &[LineStep]) -> Result<NodeId, TreeError> {
        let mut current = from;
        for step in steps {
            current = self.append_move(
                current,
                NewMove::new(step.san.clone(), step.uci.clone()),
                Position::new(step.fen.clone()),
            )?;
        }
        Ok(current)
    }

    /// Child of `parent` whose move matches by UCI or SAN.
    pub fn find_child_by_move(&self, parent: NodeId, mv: &NewMove) -> Result<Option<NodeId>, TreeError> {
        let node = self.arena.get(parent)?;
        for &child in node.children() {
            let child_node = self.arena.get(child)?;
            if child_node.game_move().is_some_and(|gm| gm.matches(mv)) {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Lookup by a single notation string, tried as UCI then SAN.
    pub fn find_child(&self, parent: NodeId, uci_or_san: &str) -> Result<Option<NodeId>, TreeError> {
        self.find_child_by_move(parent, &NewMove::new(uci_or_san, uci_or_san))
    }

    /// Move `node` to index 0 among its siblings, keeping the others in order.
    pub fn promote_variation(&mut self, node: NodeId) -> Result<(), TreeError> {
        let parent = self
            .arena
            .get(node)?
            .parent()
            .ok_or_else(|| TreeError::NotFound("root has no siblings".into()))?;

        self.arena.update(parent, |p| {
            let children = p.children_mut();
            if let Some(pos) = children.iter().position(|&c| c == node) {
                let promoted = children.remove(pos);
                children.insert(0, promoted);
            }
        })
    }

    /// Promote at every branch point between the root and `node`.
    pub fn promote_to_main_line(&mut self, node: NodeId) -> Result<(), TreeError> {
        for id in self.path_to(node)? {
            self.promote_variation(id)?;
        }
        Ok(())
    }

    pub fn annotate(&mut self, node: NodeId, annotation: Annotation) -> Result<(), TreeError> {
        self.with_move_annotations(node, |annotations| annotations.push(annotation))
    }

    /// Replace all comment annotations with `text` (none if empty).
    pub fn set_comment(&mut self, node: NodeId, text: &str) -> Result<(), TreeError> {
        self.with_move_annotations(node, |annotations| {
            annotations.retain(|a| !matches!(a, Annotation::Comment(_)));
            if !text.is_empty() {
                annotations.push(Annotation::Comment(text.to_string()));
            }
        })
    }

    pub fn clear_annotations(&mut self, node: NodeId) -> Result<(), TreeError> {
        self.with_move_annotations(node, Vec::clear)
    }

    /// Fill clock fields the move does not carry yet. Used while importing.
    pub(crate) fn merge_time(&mut self, node: NodeId, time: TimeTracking) -> Result<(), TreeError> {
        self.arena.update(node, |n| match n.game_move_mut() {
            Some(gm) => {
                let current = gm.time_mut();
                current.spent_ms = current.spent_ms.or(time.spent_ms);
                current.left_ms = current.left_ms.or(time.left_ms);
                Ok(())
            }
            None => Err(TreeError::NotFound("root carries no clock".into())),
        })?
    }

    fn with_move_annotations(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Vec<Annotation>),
    ) -> Result<(), TreeError> {
        self.arena.update(node, |n| match n.game_move_mut() {
            Some(gm) => {
                f(gm.annotations_mut());
                Ok(())
            }
            None => Err(TreeError::NotFound("root carries no move to annotate".into())),
        })?
    }

    pub fn record_evaluation(&mut self, node: NodeId, evaluation: Evaluation) -> Result<(), TreeError> {
        self.arena
            .update(node, |n| n.position_mut().push_evaluation(evaluation))
    }

    /// Drop every node and start over from `start`. All earlier handles go stale.
    pub fn reset(&mut self, start: Position) -> Result<(), TreeError> {
        check_root(&start)?;
        let dropped = self.arena.len();
        self.arena.clear();
        self.root = self.arena.allocate(ChessTreeNode::root(start));
        self.cursor = self.root;
        info!(game_id = self.game_id, dropped, "Move tree reset");
        Ok(())
    }

    /// Replace this tree's content with a copy of `source`, keeping this tree's
    /// arena so handles issued before the reload are reported stale.
    pub fn reload_from(&mut self, source: &ChessMoveTree) -> Result<(), TreeError> {
        let source_root = source.node(source.root)?;
        let mut pending: Vec<(NodeId, Option<usize>)> = vec![(source.root, None)];
        let mut copied = Vec::with_capacity(source.len());

        // collect first so a broken source leaves this tree untouched
        while let Some((id, parent_index)) = pending.pop() {
            let node = source.node(id)?;
            let index = copied.len();
            copied.push((id, parent_index, node));
            for &child in node.children().iter().rev() {
                pending.push((child, Some(index)));
            }
        }

        self.arena.clear();
        self.game_id = source.game_id;
        self.root = self.arena.allocate(ChessTreeNode::root(source_root.position().clone()));
        let mut mapped: Vec<NodeId> = Vec::with_capacity(copied.len());
        let mut source_cursor = self.root;

        for (source_id, parent_index, node) in copied {
            let new_id = match (parent_index, node.game_move()) {
                (Some(parent_index), Some(gm)) => {
                    let parent = mapped[parent_index];
                    let child = self.arena.allocate(ChessTreeNode::child(
                        parent,
                        gm.clone(),
                        node.position().clone(),
                    ));
                    self.arena.update(parent, |p| p.children_mut().push(child))?;
                    child
                }
                _ => self.root,
            };
            if source_id == source.cursor {
                source_cursor = new_id;
            }
            mapped.push(new_id);
        }

        self.cursor = source_cursor;
        info!(game_id = self.game_id, nodes = self.arena.len(), "Move tree reloaded");
        Ok(())
    }

    // ---- Queries ----

    /// Child at `variation` (0 = continuation).
    pub fn next_move(&self, from: NodeId, variation: usize) -> Result<NodeId, TreeError> {
        self.arena
            .get(from)?
            .children()
            .get(variation)
            .copied()
            .ok_or_else(|| TreeError::NotFound(format!("no variation {variation} at node {from}")))
    }

    pub fn previous_move(&self, from: NodeId) -> Result<NodeId, TreeError> {
        self.arena
            .get(from)?
            .parent()
            .ok_or_else(|| TreeError::NotFound("root has no previous move".into()))
    }

    /// Handles from the root (exclusive) down to `node` (inclusive).
    pub fn path_to(&self, node: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = Vec::new();
        let mut current = node;
        loop {
            let n = self.arena.get(current)?;
            let Some(parent) = n.parent() else { break };
            path.push(current);
            if path.len() > self.arena.len() {
                return Err(TreeError::CycleDetected(current));
            }
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// The line reached by always following child 0 from the root.
    pub fn main_line(&self) -> Vec<NodeId> {
        let mut line = Vec::new();
        let mut current = self.root;
        while let Ok(next) = self.next_move(current, 0) {
            if line.len() >= self.arena.len() {
                break;
            }
            line.push(next);
            current = next;
        }
        line
    }

    pub fn is_on_main_line(&self, node: NodeId) -> Result<bool, TreeError> {
        let mut current = node;
        loop {
            let Some(parent) = self.arena.get(current)?.parent() else { return Ok(true) };
            if self.arena.get(parent)?.children().first() != Some(&current) {
                return Ok(false);
            }
            current = parent;
        }
    }

    /// Last node reached from `from` by following child 0.
    pub fn line_end(&self, from: NodeId) -> Result<NodeId, TreeError> {
        let mut current = from;
        let mut steps = 0;
        loop {
            let node = self.arena.get(current)?;
            let Some(&next) = node.children().first() else { return Ok(current) };
            steps += 1;
            if steps > self.arena.len() {
                return Err(TreeError::CycleDetected(current));
            }
            current = next;
        }
    }

    // ---- Cursor transitions ----

    pub fn set_cursor(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.arena.get(id)?;
        self.cursor = id;
        Ok(())
    }

    /// Move the cursor into `variation` of the current node.
    pub fn step_forward(&mut self, variation: usize) -> Result<NodeId, TreeError> {
        let next = self.next_move(self.cursor, variation)?;
        self.cursor = next;
        Ok(next)
    }

    pub fn step_back(&mut self) -> Result<NodeId, TreeError> {
        let prev = self.previous_move(self.cursor)?;
        self.cursor = prev;
        Ok(prev)
    }

    pub fn to_start(&mut self) -> NodeId {
        self.cursor = self.root;
        self.root
    }

    /// Follow child 0 from the cursor until a leaf. Variations are not entered.
    pub fn to_end(&mut self) -> NodeId {
        if let Ok(end) = self.line_end(self.cursor) {
            self.cursor = end;
        }
        self.cursor
    }
}

fn check_root(start: &Position) -> Result<(), TreeError> {
    parse_placement(start)?;
    if start.side_to_move().is_none() {
        return Err(TreeError::InvalidMove(format!(
            "starting FEN has no side to move: {}",
            start.fen()
        )));
    }
    Ok(())
}

/// Structural consistency of a claimed step. Chess legality is the caller's job.
fn validate_step(parent: &Position, mv: &NewMove, position: &Position) -> Result<(), TreeError> {
    if mv.san.is_empty() && mv.uci.is_empty() {
        return Err(TreeError::InvalidMove("move has neither SAN nor UCI".into()));
    }

    let mover = parent
        .side_to_move()
        .ok_or_else(|| TreeError::InvalidMove(format!("parent FEN unreadable: {}", parent.fen())))?;
    parse_placement(position)?;
    let next = position
        .side_to_move()
        .ok_or_else(|| TreeError::InvalidMove(format!("FEN has no side to move: {}", position.fen())))?;
    if next == mover {
        return Err(TreeError::InvalidMove(format!(
            "{} leaves {mover:?} to move again",
            display_move(mv)
        )));
    }

    if let (Some(before), Some(after)) = (parent.fullmove_number(), position.fullmove_number()) {
        let expected = if mover == Color::Black { before + 1 } else { before };
        if after != expected {
            return Err(TreeError::InvalidMove(format!(
                "{} claims move counter {after}, expected {expected}",
                display_move(mv)
            )));
        }
    }

    Ok(())
}

/// Structural FEN parse only. Illegal but well-formed positions pass.
fn parse_placement(position: &Position) -> Result<(), TreeError> {
    position
        .fen()
        .parse::<Fen>()
        .map(|_| ())
        .map_err(|e| TreeError::InvalidMove(format!("unparseable FEN {:?}: {e}", position.fen())))
}

fn display_move(mv: &NewMove) -> &str {
    if mv.san.is_empty() {
        &mv.uci
    } else {
        &mv.san
    }
}
