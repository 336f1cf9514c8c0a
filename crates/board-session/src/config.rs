//! Session configuration from environment variables

use std::env;

use chess_core::ProjectionConfig;

use crate::engine::SearchLimits;
use crate::error::SessionError;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to a UCI engine binary
    pub path: String,

    /// Search depth per analysis request
    pub depth: u32,

    /// Optional node budget; sent alongside depth when set
    pub nodes: Option<u64>,

    pub threads: u32,

    pub hash_mb: u32,
}

impl EngineConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            depth: Some(self.depth),
            nodes: self.nodes,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            depth: 18,
            nodes: None,
            threads: 1,
            hash_mb: 64,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    pub projection: ProjectionConfig,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse().ok());

        let engine = EngineConfig {
            path: lookup("ENGINE_PATH").unwrap_or(defaults.engine.path),
            depth: parsed("ENGINE_DEPTH").unwrap_or(defaults.engine.depth),
            nodes: lookup("ENGINE_NODES").and_then(|v| v.trim().parse().ok()),
            threads: parsed("ENGINE_THREADS").unwrap_or(defaults.engine.threads),
            hash_mb: parsed("ENGINE_HASH_MB").unwrap_or(defaults.engine.hash_mb),
        };

        let window_plies = lookup("MOVE_WINDOW_PLIES")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.projection.window_plies);
        if window_plies == 0 {
            return Err(SessionError::Config("MOVE_WINDOW_PLIES must be at least 1"));
        }
        let collapse_after = lookup("VARIATION_COLLAPSE_AFTER")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.projection.collapse_after);

        Ok(Self {
            engine,
            projection: ProjectionConfig {
                window_plies,
                collapse_after,
            },
        })
    }
}
