//! Error types for the SCTP socket layer.
//!
//! Every failure falls into one of four classes (see [`ErrorClass`]):
//! argument errors and state errors are raised before any system call is
//! made, system-call errors carry the originating OS error, and decode errors
//! report malformed kernel-supplied buffers.

use std::io;

use thiserror::Error;

/// Result type alias for SCTP socket operations.
pub type SctpResult<T> = Result<T, SctpError>;

/// Coarse classification of an [`SctpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Wrong type, missing or out-of-range argument. Detected before any system call.
    Argument,
    /// Operation invalid for the current socket state. Detected before any system call.
    State,
    /// The underlying transport call failed.
    System,
    /// A kernel-supplied buffer was truncated or malformed.
    Decode,
}

/// Error variants for SCTP socket operations.
#[derive(Debug, Error)]
pub enum SctpError {
    /// An argument was missing or out of range.
    #[error("{reason}")]
    InvalidArgument {
        /// Description of the problem.
        reason: String,
    },

    /// A loosely-typed parameter had the wrong type.
    #[error("wrong type for {field}: expected {expected}")]
    TypeMismatch {
        /// Name of the offending field.
        field: String,
        /// Human readable description of the accepted type.
        expected: String,
    },

    /// An address string could not be parsed in the requested family.
    #[error("invalid {family} address: {address:?}")]
    InvalidAddress {
        /// The address string as supplied.
        address: String,
        /// The family it was parsed against.
        family: &'static str,
    },

    /// The socket has already been closed.
    #[error("socket is closed")]
    Closed,

    /// The operation is not valid for the socket's current mode or state.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the problem.
        reason: String,
    },

    /// A system call failed.
    #[error("{call} failed: {source}")]
    Syscall {
        /// Name of the failing call.
        call: &'static str,
        /// The OS error, including its errno.
        #[source]
        source: io::Error,
    },

    /// A notification or ancillary record could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures while decoding kernel-supplied buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended before the fixed layout for `kind` did.
    #[error("truncated {kind} record: need {needed} bytes, have {available}")]
    Truncated {
        /// Record being decoded.
        kind: &'static str,
        /// Bytes the fixed layout requires.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The buffer was long enough but its contents are inconsistent.
    #[error("malformed {kind} record: {reason}")]
    Malformed {
        /// Record being decoded.
        kind: &'static str,
        /// Description of the inconsistency.
        reason: String,
    },
}

impl SctpError {
    /// Builds an [`SctpError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        SctpError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Builds an [`SctpError::TypeMismatch`].
    pub fn type_mismatch(field: impl Into<String>, expected: impl Into<String>) -> Self {
        SctpError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Builds an [`SctpError::InvalidState`].
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        SctpError::InvalidState {
            reason: reason.into(),
        }
    }

    /// Captures `errno` for a failed call.
    pub fn last_os_error(call: &'static str) -> Self {
        SctpError::Syscall {
            call,
            source: io::Error::last_os_error(),
        }
    }

    /// Wraps an OS error returned by a socket call.
    pub fn syscall(call: &'static str, source: io::Error) -> Self {
        SctpError::Syscall { call, source }
    }

    /// Wraps an explicit errno value.
    pub fn from_errno(call: &'static str, errno: i32) -> Self {
        SctpError::Syscall {
            call,
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// Returns the error class.
    pub fn class(&self) -> ErrorClass {
        match self {
            SctpError::InvalidArgument { .. }
            | SctpError::TypeMismatch { .. }
            | SctpError::InvalidAddress { .. } => ErrorClass::Argument,
            SctpError::Closed | SctpError::InvalidState { .. } => ErrorClass::State,
            SctpError::Syscall { .. } => ErrorClass::System,
            SctpError::Decode(_) => ErrorClass::Decode,
        }
    }

    /// Returns the OS error code for system-call failures.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SctpError::Syscall { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True when a non-blocking call found nothing to do (`EAGAIN`/`EWOULDBLOCK`).
    pub fn is_would_block(&self) -> bool {
        matches!(self, SctpError::Syscall { source, .. } if source.kind() == io::ErrorKind::WouldBlock)
    }

    /// True when the kernel has no SCTP support (module not loaded, or not built).
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self.raw_os_error(),
            Some(libc::EPROTONOSUPPORT) | Some(libc::ESOCKTNOSUPPORT) | Some(libc::EAFNOSUPPORT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_alias() {
        let ok: SctpResult<i32> = Ok(7);
        assert!(ok.is_ok());

        let err: SctpResult<i32> = Err(SctpError::Closed);
        assert!(err.is_err());
    }

    #[test]
    fn test_closed_message() {
        assert_eq!(SctpError::Closed.to_string(), "socket is closed");
        assert_eq!(SctpError::Closed.class(), ErrorClass::State);
    }

    #[test]
    fn test_invalid_argument_message_is_verbatim() {
        let err = SctpError::invalid_argument("buffer size must be positive");
        assert_eq!(err.to_string(), "buffer size must be positive");
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn test_type_mismatch() {
        let err = SctpError::type_mismatch("stream", "unsigned 16-bit integer");
        let msg = err.to_string();
        assert!(msg.contains("stream"));
        assert!(msg.contains("16-bit"));
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn test_invalid_address() {
        let err = SctpError::InvalidAddress {
            address: "invalid.ip.address".to_string(),
            family: "IPv4",
        };
        assert!(err.to_string().contains("invalid.ip.address"));
        assert_eq!(err.class(), ErrorClass::Argument);
    }

    #[test]
    fn test_syscall_keeps_errno() {
        let err = SctpError::from_errno("sendmsg", libc::EPIPE);
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
        assert_eq!(err.class(), ErrorClass::System);
        assert!(err.to_string().starts_with("sendmsg failed"));
        assert!(!err.is_would_block());
    }

    #[test]
    fn test_syscall_wraps_io_error() {
        let err = SctpError::syscall("listen", io::Error::from_raw_os_error(libc::EBADF));
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        assert_eq!(err.class(), ErrorClass::System);
    }

    #[test]
    fn test_would_block() {
        let err = SctpError::from_errno("recvmsg", libc::EAGAIN);
        assert!(err.is_would_block());
    }

    #[test]
    fn test_unsupported() {
        assert!(SctpError::from_errno("socket", libc::EPROTONOSUPPORT).is_unsupported());
        assert!(!SctpError::from_errno("socket", libc::EACCES).is_unsupported());
        assert!(!SctpError::Closed.is_unsupported());
    }

    #[test]
    fn test_decode_error_wraps() {
        let err: SctpError = DecodeError::Truncated {
            kind: "assoc-change",
            needed: 20,
            available: 8,
        }
        .into();
        assert_eq!(err.class(), ErrorClass::Decode);
        assert_eq!(
            err.to_string(),
            "truncated assoc-change record: need 20 bytes, have 8"
        );
    }
}
