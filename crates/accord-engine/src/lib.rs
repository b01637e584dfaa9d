//! Trust engine for cross-organization threat intelligence sharing.
//!
//! [`TrustEngine`] ties the other accord crates together: it owns the
//! connection pool and audit sink, builds the configured policy chain for
//! each decision, serializes state transitions per relationship, and
//! anonymizes records at the level the governing relationship allows.
//!
//! The `accord` binary exposes the engine as a JSON-lines command loop on
//! stdin/stdout; see [`commands`].

pub mod commands;
pub mod config;
mod engine;
mod error;

pub use commands::{execute, handle_line, Command};
pub use config::{load_config, Config, ConfigError};
pub use engine::{Outcome, SharedRecord, TrustEngine};
pub use error::EngineError;
