/// PGN import feeding the projections, and export/persistence round trips.
mod common;

use chess_core::persistence::{from_rows, to_rows, NodeRow};
use chess_core::pgn::{export_pgn, import_first_game, import_pgn};
use chess_core::projection::project_table_rows;
use chess_core::{Annotation, Evaluation, ProjectionConfig, ScoreKind, TableRow};

use common::san;

const NESTED: &str = "1. e4 e5 (1... c5 2. Nf3 d6 (2... Nc6 3. Bb5) 3. d4) 2. Nf3 *";

const ANNOTATED: &str = r#"[Event "Club Championship"]
[Site "Leeds"]
[Date "2024.03.02"]
[White "Ada"]
[Black "Grace"]
[Result "0-1"]
[ECO "C20"]
[TimeControl "600+5"]

1. e4 { [%clk 0:10:00] } 1... e5 { [%clk 0:09:58] [%eval 0.21] } 2. Qh5?! { Early queen [%cal Rh5f7,Rh5e5] } 2... Nc6 3. Bc4 g6 $1 (3... Nf6?? 4. Qxf7#) 4. Qf3 Nf6 0-1"#;

#[test]
fn test_nested_variation_rows() {
    let game = import_first_game(NESTED, 1).unwrap();
    let rows = project_table_rows(&game.tree, &ProjectionConfig::default());
    assert_eq!(rows.len(), 3);

    let TableRow::Variation { move_number, line } = &rows[1] else {
        panic!("expected variation row, got {:?}", rows[1]);
    };
    assert_eq!(*move_number, 1);
    let sans: Vec<&str> = line.moves.iter().map(|m| m.san.as_str()).collect();
    assert_eq!(sans, vec!["c5", "Nf3", "d6", "d4"]);
    assert!(!line.collapsible);

    assert_eq!(line.nested.len(), 1);
    let nested = &line.nested[0];
    assert_eq!(nested.depth, 2);
    let sans: Vec<&str> = nested.moves.iter().map(|m| m.san.as_str()).collect();
    assert_eq!(sans, vec!["Nc6", "Bb5"]);

    let TableRow::Moves { move_number, white, black } = &rows[2] else {
        panic!("expected moves row, got {:?}", rows[2]);
    };
    assert_eq!(*move_number, 2);
    assert_eq!(white.as_ref().unwrap().san, "Nf3");
    assert!(black.is_none());
}

#[test]
fn test_long_variation_is_collapsible() {
    let pgn = "1. d4 (1. e4 e5 2. Nf3 Nc6 3. Bb5 a6) 1... d5 *";
    let game = import_first_game(pgn, 1).unwrap();
    let config = ProjectionConfig {
        window_plies: 6,
        collapse_after: 5,
    };
    let rows = project_table_rows(&game.tree, &config);
    let line = rows
        .iter()
        .find_map(|row| match row {
            TableRow::Variation { line, .. } => Some(line),
            _ => None,
        })
        .unwrap();
    assert_eq!(line.moves.len(), 6);
    assert!(line.collapsible);
}

#[test]
fn test_annotated_game_metadata_and_commands() {
    let game = import_first_game(ANNOTATED, 9).unwrap();
    assert_eq!(game.metadata.white, "Ada");
    assert_eq!(game.metadata.eco.as_deref(), Some("C20"));
    assert_eq!(game.metadata.time_control.as_deref(), Some("600+5"));

    let tree = &game.tree;
    let main = tree.main_line();
    assert_eq!(main.len(), 8);

    let e5 = tree.node(main[1]).unwrap();
    assert_eq!(e5.game_move().unwrap().time().left_ms, Some(598_000));
    let eval = &e5.position().evaluations()[0];
    assert_eq!((eval.score, eval.kind), (21, ScoreKind::Centipawns));

    let qh5 = tree.node(main[2]).unwrap().game_move().unwrap();
    assert_eq!(qh5.comment().as_deref(), Some("Early queen"));
    let arrows = qh5
        .annotations()
        .iter()
        .filter(|a| matches!(a, Annotation::Arrow { .. }))
        .count();
    assert_eq!(arrows, 2);
    assert!(qh5.annotations().contains(&Annotation::Nag(6)));

    // 3... Nf6?? 4. Qxf7# sits under 3. Bc4 as the second reply
    let bc4 = main[4];
    let replies = tree.node(bc4).unwrap().children();
    assert_eq!(replies.len(), 2);
    assert_eq!(san(tree, replies[1]), "Nf6");
    let mate = tree.node(replies[1]).unwrap().children()[0];
    assert_eq!(san(tree, mate), "Qxf7#");
}

#[test]
fn test_export_then_import_keeps_tree() {
    let game = import_first_game(ANNOTATED, 1).unwrap();
    let text = export_pgn(&game.tree, &game.metadata).unwrap();
    assert!(text.starts_with("[Event \"Club Championship\"]"));
    assert!(text.contains("(3... Nf6 $4 4. Qxf7#)"));
    assert!(text.contains("e5 {[%clk 0:09:58] [%eval 0.21]}"));

    let again = import_first_game(&text, 1).unwrap();
    assert_eq!(again.metadata, game.metadata);

    type Shape = (Option<u32>, String, u32, Vec<Annotation>, Vec<Evaluation>);
    let shape = |rows: Vec<NodeRow>| -> Vec<Shape> {
        rows.into_iter()
            .map(|r| (r.parent_id, r.san, r.sort_order, r.annotations, r.evaluations))
            .collect()
    };
    assert_eq!(
        shape(to_rows(&again.tree).unwrap()),
        shape(to_rows(&game.tree).unwrap())
    );
}

#[test]
fn test_rows_restore_imported_game() {
    let game = import_first_game(NESTED, 4).unwrap();
    let rows = to_rows(&game.tree).unwrap();
    let json = serde_json::to_string(&rows).unwrap();

    let restored = from_rows(4, &serde_json::from_str::<Vec<NodeRow>>(&json).unwrap()).unwrap();
    assert_eq!(to_rows(&restored).unwrap(), rows);

    let config = ProjectionConfig::default();
    assert_eq!(
        project_table_rows(&restored, &config).len(),
        project_table_rows(&game.tree, &config).len()
    );
}

#[test]
fn test_multi_game_file() {
    let text = format!("{ANNOTATED}\n\n{NESTED}\n");
    let games = import_pgn(&text, 100).unwrap();
    assert_eq!(games.len(), 2);
    assert_eq!(games[0].tree.game_id(), 100);
    assert_eq!(games[1].tree.game_id(), 101);
    assert_eq!(games[1].metadata.white, "");
}

#[test]
fn test_black_to_move_start_fills_black_column() {
    let pgn = r#"[FEN "4k3/8/8/8/8/8/4P3/4K3 b - - 0 1"]
[SetUp "1"]

1... Kd7 2. e4 Ke6 *"#;
    let game = import_first_game(pgn, 1).unwrap();
    let rows = project_table_rows(&game.tree, &ProjectionConfig::default());
    assert_eq!(rows.len(), 2);

    let TableRow::Moves { move_number, white, black } = &rows[0] else {
        panic!("expected moves row, got {:?}", rows[0]);
    };
    assert_eq!(*move_number, 1);
    assert!(white.is_none());
    assert_eq!(black.as_ref().unwrap().san, "Kd7");

    let TableRow::Moves { move_number, white, black } = &rows[1] else {
        panic!("expected moves row, got {:?}", rows[1]);
    };
    assert_eq!(*move_number, 2);
    assert_eq!(white.as_ref().unwrap().san, "e4");
    assert_eq!(black.as_ref().unwrap().san, "Ke6");
}

#[test]
fn test_clock_millis_survive_export() {
    let pgn = "1. e4 { [%clk 0:04:59.05] [%emt 0:00:00.125] } e5 *";
    let game = import_first_game(pgn, 1).unwrap();
    let text = export_pgn(&game.tree, &game.metadata).unwrap();
    assert!(text.contains("[%clk 0:04:59.05] [%emt 0:00:00.125]"));

    let again = import_first_game(&text, 1).unwrap();
    let first = again.tree.main_line()[0];
    let time = again.tree.node(first).unwrap().game_move().unwrap().time();
    assert_eq!((time.left_ms, time.spent_ms), (Some(299_050), Some(125)));
}
