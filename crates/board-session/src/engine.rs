//! Engine collaborator: evaluates a copied FEN, never a live tree node.
//!
//! [`UciEngine`] drives any UCI engine over async pipes.

use std::future::Future;

use chess_core::{Evaluation, ScoreKind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::SessionError;

/// How long a single search may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimits {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
}

impl SearchLimits {
    fn go_command(&self) -> String {
        let mut cmd = String::from("go");
        if let Some(depth) = self.depth {
            cmd.push_str(&format!(" depth {depth}"));
        }
        if let Some(nodes) = self.nodes {
            cmd.push_str(&format!(" nodes {nodes}"));
        }
        if self.depth.is_none() && self.nodes.is_none() {
            cmd.push_str(" depth 1");
        }
        cmd
    }
}

pub trait Engine: Send {
    fn name(&self) -> &str;

    /// Search `fen`. Dropping the future abandons the search; call
    /// [`Engine::stop`] afterwards to bring the engine back to idle.
    fn evaluate(
        &mut self,
        fen: &str,
        limits: SearchLimits,
    ) -> impl Future<Output = Result<Evaluation, SessionError>> + Send;

    fn stop(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// A UCI engine process.
pub struct UciEngine {
    name: String,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Partial output line; kept on the struct so an abandoned read loses nothing
    pending: String,
    searching: bool,
}

impl UciEngine {
    /// Spawn the engine and complete the UCI handshake
    pub async fn spawn(config: &EngineConfig) -> Result<Self, SessionError> {
        let mut process = Command::new(&config.path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| SessionError::Engine(format!("Failed to spawn {}: {e}", config.path)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| SessionError::Engine("engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SessionError::Engine("engine stdout unavailable".into()))?;

        let mut engine = Self {
            name: config.path.clone(),
            process,
            stdin,
            stdout,
            pending: String::new(),
            searching: false,
        };

        engine.send("uci").await?;
        loop {
            let line = engine.next_line().await?;
            if let Some(name) = line.strip_prefix("id name ") {
                engine.name = name.trim().to_string();
            } else if line == "uciok" {
                break;
            }
        }

        engine
            .send(&format!("setoption name Threads value {}", config.threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", config.hash_mb))
            .await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        info!(engine = %engine.name, "Engine ready");
        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), SessionError> {
        debug!(cmd, "engine <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to write to engine: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to flush engine stdin: {e}")))?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<String, SessionError> {
        let read = self
            .stdout
            .read_line(&mut self.pending)
            .await
            .map_err(|e| SessionError::Engine(format!("Failed to read from engine: {e}")))?;
        if read == 0 && self.pending.is_empty() {
            return Err(SessionError::Engine("engine closed its output".into()));
        }
        let line = std::mem::take(&mut self.pending);
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "engine >");
        Ok(trimmed)
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), SessionError> {
        while self.next_line().await? != expected {}
        Ok(())
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Engine for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&mut self, fen: &str, limits: SearchLimits) -> Result<Evaluation, SessionError> {
        if self.searching {
            self.stop().await?;
        }
        self.send(&format!("position fen {fen}")).await?;
        self.send(&limits.go_command()).await?;
        self.searching = true;

        let mut info = InfoLine::default();
        loop {
            let line = self.next_line().await?;
            if line.starts_with("info") && line.contains(" pv ") {
                info.update(&line);
            } else if let Some(rest) = line.strip_prefix("bestmove") {
                self.searching = false;
                let best_move = rest
                    .split_whitespace()
                    .next()
                    .filter(|m| *m != "(none)")
                    .map(str::to_string);
                return info.into_evaluation(&self.name, best_move);
            }
        }
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        if !self.searching {
            return Ok(());
        }
        self.send("stop").await?;
        while !self.next_line().await?.starts_with("bestmove") {}
        self.searching = false;
        Ok(())
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Latest score seen in `info ... pv` lines.
#[derive(Debug, Default)]
struct InfoLine {
    depth: u32,
    cp: Option<i32>,
    mate: Option<i32>,
}

impl InfoLine {
    fn update(&mut self, line: &str) {
        if let Some(depth) = parse_field(line, "depth") {
            self.depth = depth;
        }
        if let Some(cp) = parse_field(line, "cp") {
            self.cp = Some(cp);
            self.mate = None;
        }
        if let Some(mate) = parse_field(line, "mate") {
            self.mate = Some(mate);
            self.cp = None;
        }
    }

    fn into_evaluation(self, engine: &str, best_move: Option<String>) -> Result<Evaluation, SessionError> {
        let (score, kind) = match (self.cp, self.mate) {
            (_, Some(mate)) => (mate, ScoreKind::Mate),
            (Some(cp), None) => (cp, ScoreKind::Centipawns),
            (None, None) => return Err(SessionError::Engine("search finished without a score".into())),
        };
        Ok(Evaluation {
            score,
            kind,
            depth: self.depth,
            engine: engine.to_string(),
            best_move,
        })
    }
}

/// Value following `key` in a whitespace-separated info line
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_field::<i32>(line, "cp"), Some(35));
        assert_eq!(parse_field::<u32>(line, "depth"), Some(20));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_field::<i32>(line, "mate"), Some(-3));
        assert_eq!(parse_field::<i32>(line, "cp"), None);
    }

    #[test]
    fn test_info_line_keeps_latest_score() {
        let mut info = InfoLine::default();
        info.update("info depth 10 score cp 20 pv e2e4");
        info.update("info depth 14 score mate 4 pv d1h5");
        let eval = info.into_evaluation("sf", Some("d1h5".into())).unwrap();
        assert_eq!((eval.score, eval.kind, eval.depth), (4, ScoreKind::Mate, 14));
        assert_eq!(eval.best_move.as_deref(), Some("d1h5"));

        assert!(InfoLine::default().into_evaluation("sf", None).is_err());
    }

    #[test]
    fn test_go_command() {
        let limits = SearchLimits {
            depth: Some(18),
            nodes: Some(5000),
        };
        assert_eq!(limits.go_command(), "go depth 18 nodes 5000");
        assert_eq!(SearchLimits::default().go_command(), "go depth 1");
    }
}
