//! Errors a [crate::DaemonClient] call can raise: `daemon-error` and
//! `connection-closed` are the two named cases the protocol distinguishes;
//! everything else bubbles up as a plain I/O error (bad framing, protocol
//! mismatch).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// `daemon-error`: the daemon sent back a `STDERR_ERROR` frame while we
    /// were draining its log stream. Carries the server-supplied error type
    /// and message verbatim.
    #[error("daemon reported an error ({kind}): {message}")]
    DaemonError { kind: String, message: String },

    /// `connection-closed`: the socket closed (EOF) mid-operation. Distinct
    /// from a generic I/O error so callers can tell "the daemon hung up" from
    /// "the kernel refused the syscall".
    #[error("daemon closed the connection")]
    ConnectionClosed,

    #[error("path is not valid in the store: {0}")]
    PathNotValid(String),

    #[error("the daemon speaks protocol {0}, which is older than the minimum {1} this client supports")]
    IncompatibleProtocol(
        crate::protocol_version::ProtocolVersion,
        crate::protocol_version::ProtocolVersion,
    ),
}

impl ClientError {
    pub(crate) fn from_io_eof(e: std::io::Error) -> ClientError {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ClientError::ConnectionClosed
        } else {
            ClientError::Io(e)
        }
    }
}
