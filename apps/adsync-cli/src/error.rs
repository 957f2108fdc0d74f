//! CLI error type and exit codes.

use thiserror::Error;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum CliError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A poller definition failed validation or wiring.
    #[error(transparent)]
    Poller(#[from] adsync_poller::PollerError),

    /// The directory transport rejected its configuration or probe.
    #[error(transparent)]
    Connector(#[from] adsync_connector::ConnectorError),

    /// The state backend could not be reached.
    #[error("state store unavailable: {0}")]
    State(String),

    /// One or more pollers failed their cycle.
    #[error("{failed} of {total} pollers failed")]
    RunFailed { failed: usize, total: usize },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Io(_) | CliError::Parse(_) => 2,
            CliError::Poller(_) | CliError::Connector(_) => 3,
            CliError::State(_) => 4,
            CliError::RunFailed { .. } => 1,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
