//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Client protocol framing or dispatch failure.
    Protocol(String),
    /// Agent subprocess transport failure: spawn error, stream parse
    /// error, or exit without a terminal result record.
    Agent(String),
    /// Agent-reported terminal failure, carrying the agent's own message.
    AgentReported(String),
    /// Authentication status or login/logout failure.
    Auth(String),
    /// Session history read or write failure.
    History(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Agent(msg) => write!(f, "agent: {msg}"),
            Self::AgentReported(msg) => write!(f, "agent reported: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::History(msg) => write!(f, "history: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
