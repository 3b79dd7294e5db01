//! Error types for miner polling and commands.

use strum::Display;
use thiserror::Error;

/// Poll step that went unanswered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Step {
    Version,
    Summary,
    Stats,
}

/// Failure of a poll cycle or command.
///
/// The transport never fails on its own; an empty reply is reported as
/// [`MinerError::NoResponse`] by the step that needed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MinerError {
    /// No miner address has been configured yet
    #[error("IP not configured")]
    NotConfigured,

    /// Connection failed or nothing was read before the deadline
    #[error("no response ({0})")]
    NoResponse(Step),

    /// The miner answered without the expected success marker
    #[error("miner response: {0}")]
    Rejected(String),

    /// The requested work mode is not one the miner understands
    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

/// Convenient Result type for miner operations.
pub type MinerResult<T> = Result<T, MinerError>;
