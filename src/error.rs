//! Error types for the IRC client engine.
//!
//! Three layers of errors exist:
//!
//! - [`ClientError`] — raised synchronously at the API boundary for
//!   validation, precondition, and permission failures. These never touch
//!   the wire.
//! - [`MessageParseError`] / [`ModeParseError`] — recoverable parse
//!   failures. A malformed inbound line is surfaced as a parse-error event
//!   and the session continues.
//! - [`ProtocolError`] — transport-level failures (I/O, decoding, line
//!   length violations).

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors raised synchronously by client facade methods.
///
/// None of these variants imply that anything was written to the server;
/// a command that fails validation produces no side effects.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// A name or argument failed format validation.
    #[error("invalid {what}: {reason}")]
    Validation {
        /// What was being validated ("nickname", "channel name", ...).
        what: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A name exceeded a negotiated length cap.
    #[error("{what} too long: {actual} bytes (max {max})")]
    NameTooLong {
        /// What was being validated.
        what: &'static str,
        /// Negotiated maximum.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// The connection is in the wrong state for this command.
    #[error("connection is {actual:?}, command requires {required:?}")]
    WrongState {
        /// State the command requires.
        required: crate::engine::ConnectionState,
        /// State the connection is actually in.
        actual: crate::engine::ConnectionState,
    },

    /// The server did not advertise support for this facility.
    #[error("server does not support {0}")]
    NotSupported(&'static str),

    /// Joining would exceed the negotiated CHANLIMIT.
    #[error("channel limit reached: {0}")]
    TooManyChannels(usize),

    /// The caller lacks the channel status required for this operation.
    #[error("insufficient channel status: requires {0}")]
    PermissionDenied(&'static str),

    /// The message target is the client itself.
    #[error("target is self")]
    TargetIsSelf,

    /// A required argument was empty.
    #[error("empty argument: {0}")]
    EmptyArgument(&'static str),

    /// The connection target URI used an unrecognized scheme.
    #[error("invalid URI scheme: {0}")]
    InvalidScheme(String),
}

/// Transport-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// Message exceeded maximum allowed length.
    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    /// Failed to parse an IRC message.
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The raw message string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing IRC messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Message was empty.
    #[error("empty message")]
    EmptyMessage,

    /// The command token was missing or malformed.
    #[error("missing command")]
    MissingCommand,

    /// An argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid message prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Failed to parse a mode string.
    #[error("invalid mode string: {string}")]
    InvalidModeString {
        /// The raw mode string.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: ModeParseError,
    },
}

/// Errors encountered when parsing mode strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModeParseError {
    /// A mode that requires a parameter had none left to consume.
    #[error("mode '{mode}' requires a parameter")]
    MissingParameter {
        /// The mode character.
        mode: char,
    },

    /// More parameters were supplied than the mode flags consume.
    #[error("unused mode parameters")]
    UnusedParameters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::MessageTooLong(1024);
        assert_eq!(format!("{}", err), "message too long: 1024 bytes");

        let err = ClientError::NameTooLong {
            what: "nickname",
            max: 16,
            actual: 20,
        };
        assert_eq!(format!("{}", err), "nickname too long: 20 bytes (max 16)");
    }

    #[test]
    fn test_error_source_chaining() {
        let mode_err = ModeParseError::MissingParameter { mode: 'k' };
        let parse_err = MessageParseError::InvalidModeString {
            string: "+k".to_string(),
            cause: mode_err.clone(),
        };

        let source = std::error::Error::source(&parse_err);
        assert!(source.is_some());
        assert_eq!(source.unwrap().to_string(), mode_err.to_string());
    }

    #[test]
    fn test_protocol_error_chaining() {
        let parse_err = MessageParseError::MissingCommand;
        let protocol_err = ProtocolError::InvalidMessage {
            string: ":prefix.only".to_string(),
            cause: parse_err.clone(),
        };

        let source = std::error::Error::source(&protocol_err);
        assert!(source.is_some());
        assert_eq!(source.unwrap().to_string(), parse_err.to_string());
    }
}
