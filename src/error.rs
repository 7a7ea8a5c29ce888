use std::fmt;
use std::io;

use thiserror::Error as ThisError;

use crate::frame;

/// Why a network operation on a connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionErrorKind {
    Timeout,
    Reset,
    Refused,
    Tls,
    Closed,
    Io,
}

impl From<&io::Error> for ConnectionErrorKind {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::Reset,
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::NotConnected => Self::Closed,
            _ => Self::Io,
        }
    }
}

/// Why the pool could not hand out a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustedReason {
    /// Every slot stayed checked out until the acquire timeout elapsed.
    Timeout,
    /// The pool had room but every connect attempt failed.
    ConnectFailed { attempts: u32, last_error: String },
}

impl fmt::Display for ExhaustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedReason::Timeout => write!(f, "timed out waiting for a free connection"),
            ExhaustedReason::ConnectFailed {
                attempts,
                last_error,
            } => write!(f, "{} connect attempts failed, last: {}", attempts, last_error),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    /// Malformed wire data. The connection that produced it must be discarded.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error ({kind}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    #[error("pool exhausted for {endpoint}: {reason}")]
    PoolExhausted {
        endpoint: String,
        reason: ExhaustedReason,
    },

    /// The server rejected the credentials during the handshake.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server answered a typed request with an error reply.
    #[error("server replied with error: {0}")]
    Reply(String),

    /// The key vanished (or changed type) between listing and reading it.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Error::Connection {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` when the connection that produced this error can no longer be used.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::Connection { .. } | Error::Auth(_) | Error::Cancelled
        )
    }

    /// Returns `true` when the caller can retry after re-listing or reconnecting, as opposed
    /// to errors caused by the request itself or by bad credentials.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::PoolExhausted { .. } | Error::KeyNotFound(_)
        )
    }
}

impl From<frame::Error> for Error {
    fn from(err: frame::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}
