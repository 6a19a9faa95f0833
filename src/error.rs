use thiserror::Error;

/// Errors raised by the phase controller, the encoder and the environment.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested action is not in `0..=7`.
    #[error("invalid action {0}, expected a value in 0..=7")]
    InvalidAction(u32),

    /// A call into the simulator failed.
    #[error("simulator unavailable: {0}")]
    SimulatorUnavailable(#[from] SimulatorError),

    /// A phase string could not be parsed.
    #[error("invalid phase string {input:?}: {reason}")]
    InvalidPhase { input: String, reason: &'static str },

    /// `step` was called without a running episode.
    #[error("no episode is running, call reset first")]
    NotRunning,

    /// The configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure reported by a [Simulator](crate::Simulator) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulatorError {
    #[error("failed to start session: {0}")]
    Start(String),
    #[error("failed to advance simulation: {0}")]
    Step(String),
    #[error("failed to close session: {0}")]
    Close(String),
    #[error("query failed: {0}")]
    Query(String),
    /// The session has not been started or was already closed.
    #[error("no active session")]
    NoSession,
}

pub type Result<T> = std::result::Result<T, Error>;
