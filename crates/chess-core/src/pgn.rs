//! PGN import into move trees, and export back to PGN text.
//!
//! Import drives a pgn-reader [`Visitor`], replaying each SAN on a shakmaty
//! board to obtain UCI and the resulting FEN. Recorded variations become
//! sibling branches instead of replacing the main line. Comment commands
//! (`[%cal]`, `[%csl]`, `[%clk]`, `[%emt]`, `[%eval]`) are lifted into
//! annotations, clock data and evaluations.

use std::ops::ControlFlow;
use std::sync::LazyLock;

use pgn_reader::{Nag, RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use regex::Regex;
use shakmaty::{Chess, Color};
use tracing::{debug, info};

use crate::arena::NodeId;
use crate::error::TreeError;
use crate::game_data::{
    Annotation, Evaluation, GameMetadata, Position, ScoreKind, TimeTracking, STANDARD_START_FEN,
};
use crate::move_tree::ChessMoveTree;
use crate::rules;

static COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[%(\w+)\s+([^\]]*)\]").expect("valid regex"));
static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2})(?:\.(\d{1,3}))?$").expect("valid regex"));

/// One parsed game.
#[derive(Debug, Clone)]
pub struct ImportedGame {
    pub metadata: GameMetadata,
    pub tree: ChessMoveTree,
}

/// Parse every game in `pgn`. Game ids are assigned from `first_game_id` upward.
pub fn import_pgn(pgn: &str, first_game_id: i64) -> Result<Vec<ImportedGame>, TreeError> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut importer = TreeImporter {
        next_game_id: first_game_id,
    };

    let mut games = Vec::new();
    while let Some(game) = reader.read_game(&mut importer)? {
        games.push(game?);
    }

    info!(games = games.len(), "Imported PGN");
    Ok(games)
}

/// Parse only the first game in `pgn`.
pub fn import_first_game(pgn: &str, game_id: i64) -> Result<ImportedGame, TreeError> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut importer = TreeImporter {
        next_game_id: game_id,
    };
    match reader.read_game(&mut importer)? {
        Some(game) => game,
        None => Err(TreeError::Pgn("no game found".into())),
    }
}

struct TreeImporter {
    next_game_id: i64,
}

#[derive(Default)]
struct ImportTags {
    metadata: GameMetadata,
    fen: Option<String>,
}

/// Where the importer stands: a node and its board, plus the node/board just
/// before the last move (the anchor a `(` variation branches from).
struct Cursor {
    node: NodeId,
    board: Chess,
    before: Option<(NodeId, Chess)>,
}

struct ImportState {
    metadata: GameMetadata,
    variant: Option<String>,
    tree: ChessMoveTree,
    at: Cursor,
    stack: Vec<Cursor>,
    plies: usize,
}

impl ImportState {
    fn new(game_id: i64, tags: ImportTags) -> Result<Self, TreeError> {
        let fen = tags.fen.unwrap_or_else(|| STANDARD_START_FEN.to_string());
        let board = rules::parse_position(&fen)?;
        let variant = tags.metadata.variant.clone();

        let mut start = Position::new(rules::position_fen(&board));
        if let Some(v) = &variant {
            start = start.with_variant(v.clone());
        }
        let tree = ChessMoveTree::new(game_id, start)?;

        Ok(Self {
            metadata: tags.metadata,
            variant,
            at: Cursor {
                node: tree.root(),
                board,
                before: None,
            },
            tree,
            stack: Vec::new(),
            plies: 0,
        })
    }

    fn play(&mut self, san_plus: &SanPlus) -> Result<(), TreeError> {
        let mv = san_plus.san.to_move(&self.at.board).map_err(|e| {
            TreeError::InvalidMove(format!("illegal move '{san_plus}' in game {}: {e}", self.tree.game_id()))
        })?;

        let before = (self.at.node, self.at.board.clone());
        let played = rules::apply(&mut self.at.board, mv);
        let mut position = Position::new(played.fen.clone());
        if let Some(v) = &self.variant {
            position = position.with_variant(v.clone());
        }

        self.at.node = self.tree.append_move(self.at.node, played.to_new_move(), position)?;
        self.at.before = Some(before);
        self.plies += 1;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), TreeError> {
        if self.at.node == self.tree.root() {
            debug!(game_id = self.tree.game_id(), "Dropping comment before first move");
            return Ok(());
        }
        let parsed = parse_comment(text);
        for annotation in parsed.annotations {
            self.tree.annotate(self.at.node, annotation)?;
        }
        if !parsed.time.is_empty() {
            self.tree.merge_time(self.at.node, parsed.time)?;
        }
        if let Some(evaluation) = parsed.evaluation {
            self.tree.record_evaluation(self.at.node, evaluation)?;
        }
        Ok(())
    }

    fn begin_variation(&mut self) -> bool {
        let Some((node, board)) = self.at.before.clone() else {
            return false;
        };
        let resume = std::mem::replace(
            &mut self.at,
            Cursor {
                node,
                board,
                before: None,
            },
        );
        self.stack.push(resume);
        true
    }

    fn end_variation(&mut self) {
        if let Some(resume) = self.stack.pop() {
            self.at = resume;
        }
    }

    fn finish(mut self) -> ImportedGame {
        self.tree.to_start();
        debug!(
            game_id = self.tree.game_id(),
            plies = self.plies,
            nodes = self.tree.len(),
            "Finished game"
        );
        ImportedGame {
            metadata: self.metadata,
            tree: self.tree,
        }
    }
}

fn flow(result: Result<(), TreeError>) -> ControlFlow<Result<ImportedGame, TreeError>> {
    match result {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) => ControlFlow::Break(Err(e)),
    }
}

impl Visitor for TreeImporter {
    type Tags = ImportTags;
    type Movetext = ImportState;
    type Output = Result<ImportedGame, TreeError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, ImportTags> {
        ControlFlow::Continue(ImportTags::default())
    }

    fn tag(&mut self, tags: &mut ImportTags, name: &[u8], value: RawTag<'_>) -> ControlFlow<Self::Output> {
        let value = value.decode_utf8_lossy().to_string();
        let meta = &mut tags.metadata;
        match name {
            b"White" => meta.white = value,
            b"Black" => meta.black = value,
            b"Result" => meta.result = value,
            b"Date" => meta.date = Some(value),
            b"TimeControl" => meta.time_control = Some(value),
            b"ECO" => meta.eco = Some(value),
            b"Event" => meta.event = Some(value),
            b"Site" => meta.site = Some(value),
            b"Variant" => meta.variant = Some(value),
            b"FEN" => tags.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: ImportTags) -> ControlFlow<Self::Output, ImportState> {
        let game_id = self.next_game_id;
        self.next_game_id += 1;
        match ImportState::new(game_id, tags) {
            Ok(state) => ControlFlow::Continue(state),
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn san(&mut self, state: &mut ImportState, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        flow(state.play(&san_plus))
    }

    fn nag(&mut self, state: &mut ImportState, nag: Nag) -> ControlFlow<Self::Output> {
        if state.at.node == state.tree.root() {
            return ControlFlow::Continue(());
        }
        flow(state.tree.annotate(state.at.node, Annotation::Nag(nag.0)))
    }

    fn comment(&mut self, state: &mut ImportState, comment: RawComment<'_>) -> ControlFlow<Self::Output> {
        let text = String::from_utf8_lossy(comment.as_bytes()).into_owned();
        flow(state.comment(&text))
    }

    fn begin_variation(&mut self, state: &mut ImportState) -> ControlFlow<Self::Output, Skip> {
        // a variation before any move has nothing to branch from
        ControlFlow::Continue(Skip(!state.begin_variation()))
    }

    fn end_variation(&mut self, state: &mut ImportState) -> ControlFlow<Self::Output> {
        state.end_variation();
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, state: ImportState) -> Self::Output {
        Ok(state.finish())
    }
}

// ---- Comment commands ----

/// A PGN comment split into plain text and embedded commands.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedComment {
    pub annotations: Vec<Annotation>,
    pub time: TimeTracking,
    pub evaluation: Option<Evaluation>,
}

pub fn parse_comment(text: &str) -> ParsedComment {
    let mut parsed = ParsedComment::default();

    for cap in COMMAND_RE.captures_iter(text) {
        let args = cap[2].trim();
        match &cap[1] {
            "cal" => parsed.annotations.extend(parse_arrows(args)),
            "csl" => parsed.annotations.extend(parse_highlights(args)),
            "clk" => parsed.time.left_ms = parse_clock(args),
            "emt" => parsed.time.spent_ms = parse_clock(args),
            "eval" => parsed.evaluation = parse_eval(args),
            _ => {}
        }
    }

    let plain = COMMAND_RE.replace_all(text, "");
    let plain = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    if !plain.is_empty() {
        parsed.annotations.insert(0, Annotation::Comment(plain));
    }
    parsed
}

fn color_name(code: char) -> Option<&'static str> {
    match code {
        'G' => Some("green"),
        'R' => Some("red"),
        'Y' => Some("yellow"),
        'B' => Some("blue"),
        _ => None,
    }
}

fn color_code(name: &str) -> char {
    match name {
        "red" => 'R',
        "yellow" => 'Y',
        "blue" => 'B',
        _ => 'G',
    }
}

fn parse_arrows(args: &str) -> Vec<Annotation> {
    args.split(',')
        .filter_map(|token| {
            let token = token.trim();
            let mut chars = token.chars();
            let color = color_name(chars.next()?)?;
            let squares: String = chars.collect();
            if squares.len() != 4 {
                return None;
            }
            Some(Annotation::Arrow {
                from: squares[..2].to_string(),
                to: squares[2..].to_string(),
                color: color.to_string(),
            })
        })
        .collect()
}

fn parse_highlights(args: &str) -> Vec<Annotation> {
    args.split(',')
        .filter_map(|token| {
            let token = token.trim();
            let mut chars = token.chars();
            let color = color_name(chars.next()?)?;
            let square: String = chars.collect();
            if square.len() != 2 {
                return None;
            }
            Some(Annotation::Highlight {
                square,
                color: color.to_string(),
            })
        })
        .collect()
}

/// `h:mm:ss[.f]` to milliseconds.
fn parse_clock(args: &str) -> Option<u64> {
    let cap = CLOCK_RE.captures(args)?;
    let hours: u64 = cap[1].parse().ok()?;
    let minutes: u64 = cap[2].parse().ok()?;
    let seconds: u64 = cap[3].parse().ok()?;
    let millis: u64 = match cap.get(4) {
        Some(frac) => {
            let digits = frac.as_str();
            digits.parse::<u64>().ok()? * 10u64.pow(3 - digits.len() as u32)
        }
        None => 0,
    };
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

fn format_clock(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let (hours, minutes, seconds) = (total_seconds / 3600, (total_seconds / 60) % 60, total_seconds % 60);
    match ms % 1000 {
        0 => format!("{hours}:{minutes:02}:{seconds:02}"),
        frac => {
            let digits = format!("{frac:03}");
            format!("{hours}:{minutes:02}:{seconds:02}.{}", digits.trim_end_matches('0'))
        }
    }
}

/// `0.35`, `-1.2`, `#3`, `#-2`, optionally followed by `,depth`.
fn format_eval(eval: &Evaluation) -> String {
    let score = match eval.kind {
        ScoreKind::Mate => format!("#{}", eval.score),
        ScoreKind::Centipawns => format!("{:.2}", f64::from(eval.score) / 100.0),
    };
    if eval.depth > 0 {
        format!("{score},{}", eval.depth)
    } else {
        score
    }
}

fn parse_eval(args: &str) -> Option<Evaluation> {
    let mut parts = args.split(',');
    let score = parts.next()?.trim();
    let depth = parts
        .next()
        .and_then(|d| d.trim().parse().ok())
        .unwrap_or(0);

    let (score, kind) = match score.strip_prefix('#') {
        Some(mate) => (mate.parse::<i32>().ok()?, ScoreKind::Mate),
        None => {
            let pawns: f64 = score.parse().ok()?;
            ((pawns * 100.0).round() as i32, ScoreKind::Centipawns)
        }
    };

    Some(Evaluation {
        score,
        kind,
        depth,
        engine: "pgn".to_string(),
        best_move: None,
    })
}

// ---- Export ----

/// Render headers and movetext, variations in parentheses.
pub fn export_pgn(tree: &ChessMoveTree, metadata: &GameMetadata) -> Result<String, TreeError> {
    let root = tree.node(tree.root())?;
    let result = if metadata.result.is_empty() { "*" } else { metadata.result.as_str() };
    let mut out = String::new();

    let mut header = |name: &str, value: &str| {
        out.push_str(&format!("[{name} \"{}\"]\n", escape_tag(value)));
    };
    header("Event", metadata.event.as_deref().unwrap_or("?"));
    header("Site", metadata.site.as_deref().unwrap_or("?"));
    header("Date", metadata.date.as_deref().unwrap_or("????.??.??"));
    header("White", or_unknown(&metadata.white));
    header("Black", or_unknown(&metadata.black));
    header("Result", result);
    if let Some(eco) = &metadata.eco {
        header("ECO", eco);
    }
    if let Some(tc) = &metadata.time_control {
        header("TimeControl", tc);
    }
    if let Some(variant) = &metadata.variant {
        header("Variant", variant);
    }
    if root.position().fen() != STANDARD_START_FEN {
        header("SetUp", "1");
        header("FEN", root.position().fen());
    }

    let mut tokens = Vec::new();
    write_continuation(tree, tree.root(), &mut tokens, true)?;
    tokens.push(result.to_string());

    out.push('\n');
    out.push_str(&tokens.join(" "));
    out.push('\n');
    Ok(out)
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "?"
    } else {
        value
    }
}

fn escape_tag(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Follow child 0 from `from`, emitting each move and then its alternatives.
fn write_continuation(
    tree: &ChessMoveTree,
    from: NodeId,
    tokens: &mut Vec<String>,
    mut force_number: bool,
) -> Result<(), TreeError> {
    let mut current = from;
    loop {
        let node = tree.node(current)?;
        let Some((&main, alternatives)) = node.children().split_first() else {
            return Ok(());
        };

        force_number = write_move(tree, main, tokens, force_number)?;
        for &alt in alternatives {
            let mut inner = Vec::new();
            let force_after = write_move(tree, alt, &mut inner, true)?;
            write_continuation(tree, alt, &mut inner, force_after)?;
            tokens.push(format!("({})", inner.join(" ")));
            force_number = true;
        }
        current = main;
    }
}

/// Returns whether the following move needs an explicit number.
fn write_move(tree: &ChessMoveTree, id: NodeId, tokens: &mut Vec<String>, force_number: bool) -> Result<bool, TreeError> {
    let node = tree.node(id)?;
    let Some(gm) = node.game_move() else {
        return Ok(force_number);
    };
    let parent = node
        .parent()
        .ok_or_else(|| TreeError::NotFound(format!("move node {id} has no parent")))?;
    let before = tree.node(parent)?.position();
    let number = before.fullmove_number().unwrap_or_else(|| gm.move_number());
    let white_moved = match before.side_to_move() {
        Some(side) => side == Color::White,
        None => gm.is_white(),
    };

    if white_moved {
        tokens.push(format!("{number}. {}", gm.san()));
    } else if force_number {
        tokens.push(format!("{number}... {}", gm.san()));
    } else {
        tokens.push(gm.san().to_string());
    }

    let mut text = Vec::new();
    let mut arrows = Vec::new();
    let mut highlights = Vec::new();
    for annotation in gm.annotations() {
        match annotation {
            Annotation::Nag(nag) => tokens.push(format!("${nag}")),
            Annotation::Comment(comment) => text.push(comment.clone()),
            Annotation::Arrow { from, to, color } => arrows.push(format!("{}{from}{to}", color_code(color))),
            Annotation::Highlight { square, color } => highlights.push(format!("{}{square}", color_code(color))),
        }
    }
    if !arrows.is_empty() {
        text.push(format!("[%cal {}]", arrows.join(",")));
    }
    if !highlights.is_empty() {
        text.push(format!("[%csl {}]", highlights.join(",")));
    }
    let time = gm.time();
    if let Some(ms) = time.left_ms {
        text.push(format!("[%clk {}]", format_clock(ms)));
    }
    if let Some(ms) = time.spent_ms {
        text.push(format!("[%emt {}]", format_clock(ms)));
    }
    // one [%eval] per comment; the latest opinion wins
    if let Some(eval) = node.position().evaluations().last() {
        text.push(format!("[%eval {}]", format_eval(eval)));
    }

    if text.is_empty() {
        Ok(false)
    } else {
        tokens.push(format!("{{{}}}", text.join(" ")));
        Ok(true)
    }
}
