//! Board sessions over chess move trees.
//!
//! A [`SessionRegistry`] maps open boards to [`GameSession`]s. Each session
//! owns one tree and cursor, and a handle to at most one running engine
//! analysis.

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;

pub use config::{EngineConfig, SessionConfig};
pub use engine::{Engine, SearchLimits, UciEngine};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{AnalysisOutcome, GameSession};
