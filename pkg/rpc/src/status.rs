use std::fmt;

use common::errors::Error;

/// A coded RPC result, modeled after the standard gRPC status-code set.
///
/// Only a handful of these are produced by the core itself (`Canceled`,
/// `DeadlineExceeded`, `Unauthenticated`, `Internal`); the rest exist so
/// handlers have the full vocabulary to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Canceled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::Canceled => "CANCELED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
        };
        f.write_str(s)
    }
}

/// A terminal RPC result: a `StatusCode` plus a human-readable message.
///
/// This is the type that flows through `RPCState::finishWithTrailers`,
/// the responses half-stream's terminal error slot, and everything a
/// handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, String::new())
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Canceled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unauthenticated, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

/// A context/cancellation-flavored error as seen from the embedding layer,
/// prior to translation into a `Status` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Canceled,
    DeadlineExceeded,
}

/// Maps a context error to its RPC status equivalent, preserving the
/// original message. Anything that isn't a recognized context error is
/// returned unchanged by the caller (this helper only handles the
/// recognized cases, per spec §4.6's table).
pub fn translate_context_error(err: ContextError, message: impl Into<String>) -> Status {
    match err {
        ContextError::Canceled => Status::canceled(message),
        ContextError::DeadlineExceeded => Status::deadline_exceeded(message),
    }
}

/// Wraps an arbitrary plumbing error (not itself a `Status`) as an
/// `UNAUTHENTICATED` status, per §4.4's credential-application policy.
pub fn unauthenticated_wrapping(err: &Error) -> Status {
    Status::unauthenticated(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let s = Status::new(StatusCode::NotFound, "no such widget");
        assert_eq!(s.to_string(), "NOT_FOUND: no such widget");
    }

    #[test]
    fn ok_status_is_ok() {
        assert!(Status::ok().is_ok());
        assert!(!Status::canceled("x").is_ok());
    }

    #[test]
    fn translate_canceled() {
        let s = translate_context_error(ContextError::Canceled, "ctx done");
        assert_eq!(s.code(), StatusCode::Canceled);
        assert_eq!(s.message(), "ctx done");
    }

    #[test]
    fn translate_deadline_exceeded() {
        let s = translate_context_error(ContextError::DeadlineExceeded, "too slow");
        assert_eq!(s.code(), StatusCode::DeadlineExceeded);
    }
}
