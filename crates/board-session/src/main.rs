//! Inspect a game's move tree from the command line.
//!
//! Usage: movetree <file.pgn> [--game N] [--groups] [--rows out.json] [--load rows.json] [--analyze]
//!
//! Prints the table rows (or move groups with `--groups`) as JSON. `--load`
//! replaces the PGN with previously saved rows; `--analyze` evaluates the
//! final main-line position with the configured UCI engine.

use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context};
use board_session::{AnalysisOutcome, SessionConfig, SessionRegistry, UciEngine};
use chess_core::pgn;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BOARD_ID: &str = "cli";

struct Args {
    pgn_path: Option<String>,
    game: usize,
    groups: bool,
    rows_out: Option<String>,
    rows_in: Option<String>,
    analyze: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args {
        pgn_path: None,
        game: 1,
        groups: false,
        rows_out: None,
        rows_in: None,
        analyze: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--game" => {
                parsed.game = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .context("--game expects a number starting at 1")?;
                i += 2;
            }
            "--rows" => {
                parsed.rows_out = Some(args.get(i + 1).cloned().context("--rows expects a path")?);
                i += 2;
            }
            "--load" => {
                parsed.rows_in = Some(args.get(i + 1).cloned().context("--load expects a path")?);
                i += 2;
            }
            "--groups" => {
                parsed.groups = true;
                i += 1;
            }
            "--analyze" => {
                parsed.analyze = true;
                i += 1;
            }
            other if other.starts_with("--") => bail!("unknown option {other}"),
            path => {
                parsed.pgn_path = Some(path.to_string());
                i += 1;
            }
        }
    }

    if parsed.pgn_path.is_none() && parsed.rows_in.is_none() {
        bail!("usage: movetree <file.pgn> [--game N] [--groups] [--rows out.json] [--load rows.json] [--analyze]");
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = SessionConfig::from_env()?;
    let registry = SessionRegistry::new(config.projection);
    let session = registry.open(BOARD_ID).await;

    if let Some(path) = &args.pgn_path {
        let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let mut games = pgn::import_pgn(&text, registry.allocate_game_id())?;
        if args.game > games.len() {
            bail!("{path} holds {} games, asked for game {}", games.len(), args.game);
        }
        let game = games.swap_remove(args.game - 1);
        info!(path = %path, game = args.game, white = %game.metadata.white, black = %game.metadata.black, "Game selected");
        session.load_game(game).await?;
    }

    if let Some(path) = &args.rows_in {
        let json = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        session.load_rows_json(&json).await?;
    }

    if let Some(path) = &args.rows_out {
        fs::write(path, session.save_rows_json().await?).with_context(|| format!("writing {path}"))?;
        info!(path = %path, "Rows saved");
    }

    if args.analyze {
        session.to_start().await;
        session.to_end().await;

        let engine = Arc::new(Mutex::new(UciEngine::spawn(&config.engine).await?));
        let outcome = session
            .analyze_cursor(Arc::clone(&engine), config.engine.limits())
            .await?
            .await??;
        match outcome {
            AnalysisOutcome::Recorded { node, evaluation } => {
                info!(node = %node, score = evaluation.score, kind = ?evaluation.kind, "Final position analysed");
            }
            other => info!(outcome = ?other, "Analysis not recorded"),
        }
        engine.lock().await.quit().await;
    }

    let output = if args.groups {
        serde_json::to_string_pretty(&session.move_groups().await)?
    } else {
        serde_json::to_string_pretty(&session.table_rows().await)?
    };
    println!("{output}");

    registry.close(BOARD_ID).await?;
    Ok(())
}
