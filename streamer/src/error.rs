//! Error taxonomy shared by the remote client, the lifecycle manager and the session controller.

use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by broadcast and session operations.
///
/// None of these are process-fatal: every variant leaves the component that raised it
/// in an idle or otherwise recoverable state.
#[derive(Debug, Error)]
pub enum Error {
    /// The broadcasting service answered with a non-2xx status or an undecodable body.
    #[error("remote service error {code}: {message}")]
    RemoteService { code: u16, message: String },

    /// The request never produced a response (connect failure, timeout, truncated body).
    #[error("transient failure talking to remote service: {0}")]
    Transient(String),

    /// An operation was attempted in a state that forbids it.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// A required input was missing or empty.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No capture device is available.
    #[error("no camera available")]
    NoCamera,

    /// A fault raised by the publisher library.
    #[error(transparent)]
    RuntimeFault(#[from] Fault),

    /// No usable OAuth access token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A pending operation was cancelled before it ran.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        // `{:#}`-style chain so "error sending request" carries its cause
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Transient(message)
    }
}

/// Category of a publisher-library fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    IllegalArgument,
    IllegalState,
    Socket,
    Io,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalArgument => write!(f, "illegal argument"),
            Self::IllegalState => write!(f, "illegal state"),
            Self::Socket => write!(f, "socket"),
            Self::Io => write!(f, "I/O"),
        }
    }
}

/// An opaque fault reported by the publisher library, either through a callback or as
/// the failure of a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fault: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_operation_and_state() {
        let e = Error::invalid_state("go live", "created");
        assert_eq!(e.to_string(), "cannot go live while created");
    }

    #[test]
    fn fault_converts_into_runtime_fault() {
        let e: Error = Fault::new(FaultKind::Socket, "connection reset").into();
        assert!(matches!(
            e,
            Error::RuntimeFault(Fault {
                kind: FaultKind::Socket,
                ..
            })
        ));
        assert_eq!(e.to_string(), "socket fault: connection reset");
        assert!(!e.is_transient());
    }
}
