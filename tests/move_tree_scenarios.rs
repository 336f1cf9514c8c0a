/// Behavioural checks on the move tree and its projections, built with real
/// chess rules wherever the position allows it.
mod common;

use chess_core::projection::{project_move_groups, project_table_rows};
use chess_core::traversal::walk;
use chess_core::{ChessMoveTree, NewMove, NodeId, Position, ProjectionConfig, TableRow, TreeError};

use common::{play, play_line, san};

/// White to move after a black reply "d4" to 1. e4. Not a legal position; the
/// tree only checks side to move and the move counter.
const E4_THEN_D4: &str = "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";

fn every_node(tree: &ChessMoveTree) -> Vec<NodeId> {
    let mut nodes = vec![tree.root()];
    nodes.extend(walk(tree).into_iter().map(|r| r.handle));
    nodes
}

#[test]
fn test_branch_at_move_one_projects_variation_row() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let e4 = play(&mut tree, root, "e4");
    let e5 = play(&mut tree, e4, "e5");
    let d4 = tree
        .append_move(e4, NewMove::new("d4", ""), Position::new(E4_THEN_D4))
        .unwrap();

    assert_eq!(tree.node(root).unwrap().children(), &[e4]);
    assert_eq!(tree.node(e4).unwrap().children(), &[e5, d4]);
    assert_eq!(tree.node(d4).unwrap().ply(), 2);

    let rows = project_table_rows(&tree, &ProjectionConfig::default());
    assert_eq!(rows.len(), 2);
    match &rows[0] {
        TableRow::Moves {
            move_number,
            white,
            black,
        } => {
            assert_eq!(*move_number, 1);
            assert_eq!(white.as_ref().unwrap().san, "e4");
            assert_eq!(black.as_ref().unwrap().san, "e5");
        }
        other => panic!("expected a moves row, got {other:?}"),
    }
    match &rows[1] {
        TableRow::Variation { move_number, line } => {
            assert_eq!(*move_number, 1);
            assert_eq!(line.depth, 1);
            assert_eq!(line.moves.len(), 1);
            assert_eq!(line.moves[0].san, "d4");
            assert!(line.moves[0].is_current);
        }
        other => panic!("expected a variation row, got {other:?}"),
    }
}

#[test]
fn test_double_append_keeps_single_child() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let first = play(&mut tree, root, "e4");
    let second = play(&mut tree, root, "e2e4");

    assert_eq!(first, second);
    assert_eq!(tree.node(root).unwrap().children().len(), 1);
    assert_eq!(tree.cursor(), first);
}

#[test]
fn test_ply_follows_parent_everywhere() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let main = play_line(&mut tree, root, &["d4", "Nf6", "c4", "e6", "Nc3", "Bb4"]);
    play_line(&mut tree, main[1], &["Nf3", "d5", "g3"]);
    play_line(&mut tree, main[2], &["g6", "Nc3", "Bg7"]);
    play_line(&mut tree, root, &["c4", "e5"]);

    assert_eq!(tree.node(root).unwrap().ply(), 0);
    for id in every_node(&tree) {
        let node = tree.node(id).unwrap();
        if let Some(parent) = node.parent() {
            assert_eq!(node.ply(), tree.node(parent).unwrap().ply() + 1);
        }
    }
}

#[test]
fn test_promotion_reclassifies_whole_subtree() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let e4_line = play_line(&mut tree, root, &["e4", "e5", "Nf3"]);
    let c5 = play(&mut tree, e4_line[0], "c5");
    let d4_line = play_line(&mut tree, root, &["d4", "d5", "c4"]);

    let main_flags = |tree: &ChessMoveTree| -> Vec<(NodeId, bool)> {
        walk(tree).into_iter().map(|r| (r.handle, r.is_main_line)).collect()
    };
    let before = main_flags(&tree);
    assert!(before.iter().filter(|(id, _)| d4_line.contains(id)).all(|(_, main)| !main));

    tree.promote_variation(d4_line[0]).unwrap();
    let after = main_flags(&tree);
    for (id, main) in &after {
        if d4_line.contains(id) {
            assert!(main, "{id} should now be main line");
        } else {
            assert!(!main, "{id} should now be a variation");
        }
    }

    // the e4 subtree itself is unchanged
    assert_eq!(tree.node(e4_line[0]).unwrap().children(), &[e4_line[1], c5]);
    assert_eq!(tree.main_line(), d4_line);
}

#[test]
fn test_table_rows_are_deterministic() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let main = play_line(&mut tree, root, &["e4", "c5", "Nf3", "d6", "d4", "cxd4"]);
    play_line(&mut tree, main[1], &["Nc3", "Nc6", "g3"]);
    play_line(&mut tree, main[2], &["e6"]);
    play(&mut tree, main[3], "Bb5+");

    let config = ProjectionConfig::default();
    let first = project_table_rows(&tree, &config);
    assert_eq!(first, project_table_rows(&tree, &config));
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&project_table_rows(&tree, &config)).unwrap()
    );
}

#[test]
fn test_navigation_edges_fail_without_moving() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    assert!(matches!(tree.previous_move(root), Err(TreeError::NotFound(_))));

    let main = play_line(&mut tree, root, &["e4", "e5"]);
    play(&mut tree, main[0], "c5");
    let leaf = main[1];
    assert!(matches!(tree.next_move(leaf, 0), Err(TreeError::NotFound(_))));
    assert!(matches!(tree.next_move(main[0], 2), Err(TreeError::NotFound(_))));

    tree.set_cursor(main[0]).unwrap();
    assert!(tree.step_forward(5).is_err());
    assert_eq!(tree.cursor(), main[0]);

    tree.to_start();
    let end = tree.to_end();
    assert_eq!(end, leaf);
    assert!(tree.node(end).unwrap().children().is_empty());
}

#[test]
fn test_reset_stales_every_old_handle() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let old = play_line(&mut tree, root, &["e4", "e5", "Nf3", "Nc6"]);

    tree.reset(Position::standard()).unwrap();
    let new_root = tree.root();
    let fresh = play(&mut tree, new_root, "d4");

    for id in old.iter().copied().chain([root]) {
        assert!(matches!(tree.node(id), Err(TreeError::StaleHandle(_))), "{id} not stale");
    }
    let cursor = tree.cursor();
    assert!(tree.set_cursor(old[2]).unwrap_err().is_stale());
    assert_eq!(tree.cursor(), cursor);
    assert_eq!(san(&tree, fresh), "d4");
}

#[test]
fn test_move_groups_window_main_line() {
    let mut tree = ChessMoveTree::standard(1);
    let root = tree.root();
    let main = play_line(
        &mut tree,
        root,
        &["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Ba4", "Nf6"],
    );
    play(&mut tree, main[2], "Nf6");
    play(&mut tree, main[6], "b5");

    let groups = project_move_groups(&tree, &ProjectionConfig::default());
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].main_line.len(), 6);
    assert_eq!((groups[0].first_move_number, groups[0].last_move_number), (1, 3));
    assert_eq!(groups[1].main_line.len(), 2);
    assert_eq!(groups[1].first_move_number, 4);

    assert_eq!(groups[0].variations.len(), 1);
    assert_eq!(groups[0].variations[0].parent_move_number, 2);
    assert_eq!(groups[1].variations.len(), 1);
    assert_eq!(groups[1].variations[0].moves[0].san, "b5");
}
