//! Error types for callkit.
//!
//! A single [`CallError`] flows through every pipeline. Errors are classified
//! by [`CallError::kind`] into a small [`FailureKind`] taxonomy, which is what
//! the server pipeline uses to pick the status code reported to the peer.
//!
//! # Example
//!
//! ```rust
//! use callkit_core::error::{CallError, FailureKind};
//! use callkit_core::status::Code;
//!
//! let err = CallError::out_of_range("index 12 of 10");
//! assert_eq!(err.kind(), FailureKind::OutOfRange);
//! assert_eq!(err.kind().code(), Code::OutOfRange);
//! ```

use crate::status::{Code, Status};
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Type alias for boxed errors that are Send + Sync.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across callkit.
pub type CallResult<T> = Result<T, CallError>;

/// The error type of every call pipeline.
#[derive(Error, Diagnostic, Debug)]
pub enum CallError {
    /// A usage contract was broken.
    #[error("Contract violation: {message}")]
    #[diagnostic(code(callkit::contract_violation))]
    ContractViolation {
        /// What was violated.
        message: String,
    },

    /// A lifecycle value was read before the call completed.
    #[error("{what} is not available until the call has completed")]
    #[diagnostic(
        code(callkit::not_completed),
        help("Consume the response stream to completion before reading the status or trailers")
    )]
    NotCompleted {
        /// The value that was read too early.
        what: &'static str,
    },

    /// The transport reported a failed status.
    #[error("Call failed with {0}")]
    #[diagnostic(code(callkit::status))]
    Status(Status),

    /// An index or value was outside the valid range.
    #[error("Out of range: {message}")]
    #[diagnostic(code(callkit::out_of_range))]
    OutOfRange {
        /// Description of the violation.
        message: String,
    },

    /// An argument was missing or invalid.
    #[error("Invalid argument: {message}")]
    #[diagnostic(code(callkit::invalid_argument))]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The requested operation is not implemented.
    #[error("Not implemented: {message}")]
    #[diagnostic(code(callkit::unimplemented))]
    Unimplemented {
        /// What is missing.
        message: String,
    },

    /// The operation was cancelled.
    #[error("{operation} was cancelled")]
    #[diagnostic(code(callkit::cancelled))]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// Any other failure.
    #[error("{message}")]
    #[diagnostic(code(callkit::other))]
    Other {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },
}

impl CallError {
    /// Create a contract violation error.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Create an out-of-range error.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unimplemented error.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::Unimplemented {
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a generic error with just a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Create a generic error wrapping a source error.
    pub fn other_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::OutOfRange { .. } => FailureKind::OutOfRange,
            Self::InvalidArgument { .. } | Self::ContractViolation { .. } => {
                FailureKind::InvalidArgument
            }
            Self::Unimplemented { .. } => FailureKind::Unimplemented,
            Self::NotCompleted { .. }
            | Self::Status(_)
            | Self::Cancelled { .. }
            | Self::Other { .. } => FailureKind::Unknown,
        }
    }

    /// Whether this error reports a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Status(status) => status.code == Code::Cancelled,
            _ => false,
        }
    }

    /// The status a server reports for this error.
    ///
    /// The code comes from [`FailureKind::code`]; the message is the error's
    /// display text.
    #[must_use]
    pub fn to_status(&self) -> Status {
        Status::new(self.kind().code(), self.to_string())
    }
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

impl From<std::io::Error> for CallError {
    fn from(err: std::io::Error) -> Self {
        Self::other_with_source(err.to_string(), err)
    }
}

/// Category of a failure, as seen by the server error mapping.
///
/// The categories are checked in priority order: range violations first,
/// then argument violations, then missing implementations. Everything else
/// is [`FailureKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Index or range violation.
    OutOfRange,
    /// Invalid or missing argument.
    InvalidArgument,
    /// Operation not implemented.
    Unimplemented,
    /// Any other failure.
    Unknown,
}

impl FailureKind {
    /// The status code reported for this category.
    #[must_use]
    pub const fn code(self) -> Code {
        match self {
            Self::OutOfRange => Code::OutOfRange,
            Self::InvalidArgument => Code::InvalidArgument,
            Self::Unimplemented => Code::Unimplemented,
            Self::Unknown => Code::Unknown,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "out_of_range"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::Unimplemented => write!(f, "unimplemented"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CallError::out_of_range("i").kind().code(), Code::OutOfRange);
        assert_eq!(
            CallError::invalid_argument("a").kind().code(),
            Code::InvalidArgument
        );
        assert_eq!(
            CallError::contract("null").kind().code(),
            Code::InvalidArgument
        );
        assert_eq!(
            CallError::unimplemented("x").kind().code(),
            Code::Unimplemented
        );
        assert_eq!(CallError::other("boom").kind().code(), Code::Unknown);
        assert_eq!(
            CallError::Status(Status::new(Code::NotFound, "gone"))
                .kind()
                .code(),
            Code::Unknown
        );
    }

    #[test]
    fn test_to_status_uses_display_text() {
        let status = CallError::invalid_argument("name is empty").to_status();
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, "Invalid argument: name is empty");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(CallError::cancelled("read").is_cancelled());
        assert!(CallError::Status(Status::cancelled("peer went away")).is_cancelled());
        assert!(!CallError::other("boom").is_cancelled());
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = CallError::from(io);
        assert_eq!(err.to_string(), "pipe closed");
        assert!(err.source().is_some());
    }
}
