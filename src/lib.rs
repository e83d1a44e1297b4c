#![forbid(unsafe_code)]

//! `agent-conduit` — adapter between a session-protocol client and a
//! headless CLI coding agent.
//!
//! The adapter spawns the agent binary per prompt in stream-JSON mode,
//! translates its line-delimited event stream into protocol notifications
//! without losing ordering or information, and orchestrates a bounded
//! permission-retry protocol when the agent's tool calls are rejected.

pub mod agent_cli;
pub mod config;
pub mod custom;
pub mod errors;
pub mod history;
pub mod mapper;
pub mod orchestrator;
pub mod protocol;
pub mod server;
pub mod stream;

pub use config::ConduitConfig;
pub use errors::{AppError, Result};
