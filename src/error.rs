use std::path::{Path, PathBuf};

use thiserror::Error;

/// A boxed, thread-safe error used as the cause of a [`QueryFailure`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The working-copy query for a path could not produce info.
///
/// Raised when the path is not a working copy, its metadata is unreadable, the
/// client could not be run, or its output could not be understood. The display
/// form always names the path and the underlying cause.
#[derive(Debug)]
pub struct QueryFailure {
    path: PathBuf,
    cause: BoxError,
}

impl QueryFailure {
    /// Creates a failure for `path` caused by `cause`.
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<BoxError>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }

    /// The path that was being inspected.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The underlying cause.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to get svn infos for {}: {}",
            self.path.display(),
            self.cause
        )
    }
}

impl std::error::Error for QueryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// The cause of a query failure that happened on an agent.
///
/// Only the message survives the trip over the wire.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RemoteCause(pub String);

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A failure reported by an agent with a code this client does not know.
pub struct RemoteError {
    /// Agent failure code.
    pub code: u64,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned by this crate.
pub enum SvnInfoError {
    /// The working-copy query failed.
    #[error(transparent)]
    Query(#[from] QueryFailure),
    /// A step path is invalid or escapes its workspace.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// An I/O error occurred outside of the query itself (for example while
    /// talking to an agent).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The agent or client did not follow the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The agent returned a failure this client cannot classify.
    #[error("agent error: {0}")]
    Remote(RemoteError),
    /// No step is registered under the requested name.
    #[error("unknown step: {0}")]
    UnknownStep(String),
    /// The caller did not supply a context the step requires.
    #[error("step `{step}` requires context `{context}`")]
    MissingContext {
        /// Name of the step.
        step: &'static str,
        /// Name of the missing context.
        context: &'static str,
    },
    /// A step argument is missing or has the wrong type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SvnInfoError {
    /// Returns `true` for I/O-class failures, including query failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Query(_) | Self::Io(_))
    }

    /// Returns the query failure, if this is one.
    pub fn as_query_failure(&self) -> Option<&QueryFailure> {
        match self {
            Self::Query(failure) => Some(failure),
            _ => None,
        }
    }
}
