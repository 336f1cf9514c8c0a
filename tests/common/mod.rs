use chess_core::{ChessMoveTree, MoveGenerator, NodeId, Position, ShakmatyRules};

/// Play `notation` from `from` with real chess rules, returning the new node.
pub fn play(tree: &mut ChessMoveTree, from: NodeId, notation: &str) -> NodeId {
    let fen = tree.node(from).unwrap().position().fen().to_string();
    let played = ShakmatyRules.play(&fen, notation).unwrap();
    tree.append_move(from, played.to_new_move(), Position::new(played.fen))
        .unwrap()
}

/// Play a sequence of moves from `from`, returning every node created.
#[allow(dead_code)]
pub fn play_line(tree: &mut ChessMoveTree, from: NodeId, moves: &[&str]) -> Vec<NodeId> {
    let mut current = from;
    moves
        .iter()
        .map(|m| {
            current = play(tree, current, m);
            current
        })
        .collect()
}

#[allow(dead_code)]
pub fn san(tree: &ChessMoveTree, id: NodeId) -> String {
    tree.node(id).unwrap().game_move().unwrap().san().to_string()
}
