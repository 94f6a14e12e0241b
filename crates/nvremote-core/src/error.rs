//! Error types for nvremote.
//!
//! Each variant is a distinct failure kind with its own process exit status,
//! so the command-line layer never collapses them into one generic message.

use crate::codec::Value;
use std::time::Duration;
use thiserror::Error;

/// Main error type for RPC, wait and registry operations.
///
/// `Clone` because a single connection failure is fanned out to every
/// pending call and every live subscription.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Wire bytes do not decode to a MessagePack value.
    #[error("Malformed message: {message}")]
    MalformedMessage { message: String },

    /// Well-formed bytes carrying something the protocol does not allow:
    /// a response id with no pending call, or a message of the wrong shape.
    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// The peer executed the call and reported an application-level error.
    #[error("Remote error: {message}")]
    Remote {
        message: String,
        /// Raw error value as sent by the peer.
        value: Value,
    },

    /// The socket closed, reset or could not be reached.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A wait session's deadline elapsed before a qualifying notification.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// API misuse inside this process (e.g. receiving on a spent subscription).
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

/// Result type alias for nvremote operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Wait sessions fail with the same taxonomy; `Timeout` is the wait-specific kind.
pub type WaitError = RpcError;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Transport {
            message: err.to_string(),
        }
    }
}

impl RpcError {
    pub fn malformed(message: impl Into<String>) -> Self {
        RpcError::MalformedMessage {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        RpcError::ProtocolViolation {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        RpcError::Transport {
            message: message.into(),
        }
    }

    /// Build a `Remote` error from the `error` field of a response.
    ///
    /// Neovim reports errors as `[error_type, "message"]`; a bare string is
    /// taken as the message directly. Anything else is rendered as-is.
    pub fn from_remote(value: Value) -> Self {
        let message = match &value {
            Value::String(s) => s.clone(),
            Value::Array(items) => match items.as_slice() {
                [_, Value::String(s)] => s.clone(),
                _ => value.to_string(),
            },
            other => other.to_string(),
        };
        RpcError::Remote { message, value }
    }

    /// Process exit status for this error kind.
    ///
    /// - 1: remote error
    /// - 2: transport error
    /// - 3: malformed message
    /// - 4: protocol violation
    /// - 70: invalid state (EX_SOFTWARE)
    /// - 124: timeout (same as coreutils `timeout`)
    pub fn exit_code(&self) -> i32 {
        match self {
            RpcError::Remote { .. } => 1,
            RpcError::Transport { .. } => 2,
            RpcError::MalformedMessage { .. } => 3,
            RpcError::ProtocolViolation { .. } => 4,
            RpcError::InvalidState { .. } => 70,
            RpcError::Timeout(_) => 124,
        }
    }

    /// Whether this error means the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::MalformedMessage { .. }
                | RpcError::ProtocolViolation { .. }
                | RpcError::Transport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::protocol("response id 7 has no pending call");
        assert_eq!(
            err.to_string(),
            "Protocol violation: response id 7 has no pending call"
        );
    }

    #[test]
    fn test_remote_error_from_string() {
        let err = RpcError::from_remote(Value::from("E123: bad expr"));
        match err {
            RpcError::Remote { message, .. } => assert_eq!(message, "E123: bad expr"),
            other => panic!("Expected Remote, got: {:?}", other),
        }
    }

    #[test]
    fn test_remote_error_from_nvim_error_pair() {
        let value = Value::Array(vec![Value::from(0), Value::from("Vim:E492: Not an editor command")]);
        let err = RpcError::from_remote(value);
        assert_eq!(err.to_string(), "Remote error: Vim:E492: Not an editor command");
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            RpcError::malformed("x"),
            RpcError::protocol("x"),
            RpcError::from_remote(Value::Nil),
            RpcError::transport("x"),
            RpcError::Timeout(Duration::from_millis(50)),
            RpcError::InvalidState {
                message: "x".into(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(RpcError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(RpcError::transport("reset").is_fatal());
        assert!(!RpcError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!RpcError::from_remote(Value::from("E1")).is_fatal());
    }
}
