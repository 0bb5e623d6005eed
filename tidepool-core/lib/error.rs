use std::fmt;

use thiserror::Error;
use tidepool_utils::DurationError;

use crate::{models::SandboxInfo, runtime::RuntimeError};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a tidepool-core operation.
pub type TidepoolResult<T> = Result<T, TidepoolError>;

/// An error that occurred while managing sandboxes.
#[derive(pretty_error_debug::Debug, Error)]
pub enum TidepoolError {
    /// The access token is not of the form `<owner>:<secret>`.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// A request field failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A duration could not be parsed.
    #[error("invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),

    /// The port range is empty.
    #[error("invalid port range: {lower} > {upper}")]
    InvalidPortRange {
        /// The lower bound.
        lower: u16,

        /// The upper bound.
        upper: u16,
    },

    /// Every port in the range is in use.
    #[error("no free port left in range {lower}-{upper}")]
    PortsExhausted {
        /// The lower bound.
        lower: u16,

        /// The upper bound.
        upper: u16,
    },

    /// The requested routing key is served by another sandbox.
    #[error("hostname {key} is already routed to {sandbox}")]
    HostnameTaken {
        /// The requested routing key.
        key: String,

        /// The sandbox currently serving the key.
        sandbox: String,
    },

    /// A sandbox label could not be decoded.
    #[error("malformed sandbox record: {0}")]
    MalformedRecord(#[source] serde_json::Error),

    /// A sandbox label could not be encoded.
    #[error("failed to encode sandbox record: {0}")]
    RecordEncoding(#[source] serde_json::Error),

    /// The container runtime rejected an operation.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A container was created but could not be brought up.
    #[error(transparent)]
    CreateFailed(#[from] CreateFailure),

    /// The task running an operation panicked or was aborted.
    #[error("sandbox task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The outcome of a create whose container could not be started.
///
/// `cause` is the error that aborted the create; `compensation` records what happened while
/// undoing the partial work. The two are never merged so callers always see the root cause.
#[derive(pretty_error_debug::Debug, Error)]
#[error("failed to start sandbox {sandbox}: {cause}")]
pub struct CreateFailure {
    /// The name of the sandbox being created.
    pub sandbox: String,

    /// The error that aborted the create.
    #[source]
    pub cause: RuntimeError,

    /// The result of rolling back the partially created sandbox.
    pub compensation: Compensation,
}

/// The rollback steps taken after a failed create.
#[derive(Debug)]
pub struct Compensation {
    /// The result of removing the created container.
    pub removal: CompensationStep,

    /// The host port handed back to the pool, if one had been allocated.
    pub released_port: Option<u16>,
}

/// The result of a single rollback step.
#[derive(Debug)]
pub enum CompensationStep {
    /// The step had nothing to undo.
    Skipped,

    /// The step completed.
    Succeeded,

    /// The step failed; the object may have leaked.
    Failed(RuntimeError),
}

/// The action that failed on a sandbox during a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxAction {
    /// Forced removal of the container.
    Remove,
}

/// A failure of one action on one sandbox.
#[derive(pretty_error_debug::Debug, Error)]
#[error("{action} {}: {error}", .sandbox.name)]
pub struct SandboxActionError {
    /// The action that failed.
    pub action: SandboxAction,

    /// The sandbox the action was applied to.
    pub sandbox: SandboxInfo,

    /// The runtime error.
    #[source]
    pub error: RuntimeError,
}

/// Every per-sandbox failure of a purge, in the order the sandboxes were selected.
#[derive(pretty_error_debug::Debug, Error)]
#[error("{}", display_joined(.0))]
pub struct PurgeErrors(Vec<SandboxActionError>);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TidepoolError {
    /// Whether the error means the addressed sandbox does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TidepoolError::Runtime(RuntimeError::NotFound(_)))
    }
}

impl PurgeErrors {
    /// Wraps the collected failures, returning `None` when there are none.
    pub fn from_failures(failures: Vec<SandboxActionError>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self(failures))
        }
    }

    /// Iterates over the individual failures.
    pub fn iter(&self) -> impl Iterator<Item = &SandboxActionError> {
        self.0.iter()
    }

    /// The number of failed sandboxes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no failure was collected. Aggregates built by [`PurgeErrors::from_failures`] are
    /// never empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the aggregate, returning the individual failures.
    pub fn into_inner(self) -> Vec<SandboxActionError> {
        self.0
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for SandboxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxAction::Remove => write!(f, "remove"),
        }
    }
}

impl fmt::Display for CompensationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompensationStep::Skipped => write!(f, "skipped"),
            CompensationStep::Succeeded => write!(f, "succeeded"),
            CompensationStep::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn display_joined(failures: &[SandboxActionError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
