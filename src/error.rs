use std::io::Error as IoError;
use std::time::Duration;

use crate::packet::SocketOpCode;

use thiserror::Error;

/// The error type for socket.io associated operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport failed to connect, read or write.
    ///
    /// For example, the server unexpectedly closed the connection.
    #[error("transport failure: {0}")]
    Transport(#[from] IoError),

    /// The polling handshake was answered with a status other than `200`.
    #[error("handshake rejected with HTTP status {0}")]
    HandshakeRejected(u16),

    /// The websocket upgrade was answered with a status other than `101`.
    #[error("websocket upgrade rejected with HTTP status {0}")]
    UpgradeRejected(u16),

    /// The handshake response could not be understood.
    ///
    /// For example, the body did not carry a `pingInterval`.
    #[error("malformed handshake response: {0}")]
    MalformedHandshake(&'static str),

    /// The server did not send anything within the handshake timeout.
    #[error("no response from the server within {0:?}")]
    Timeout(Duration),

    /// A packet body did not contain the expected delimiters.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A socket.io message type that is recognized but not implemented.
    #[error("socket.io message type {0:?} is not implemented")]
    UnhandledMessageType(SocketOpCode),

    /// The action requires an established session.
    #[error("not connected")]
    NotConnected,

    /// The URL does not name a host and port to connect to.
    #[error("invalid URL: {0}")]
    InvalidUrl(&'static str),

    /// A value could not be serialized to JSON.
    #[cfg(feature = "serde-serialization")]
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates an `EngineError::MalformedPacket` variant. Mainly
    /// used in combination with string literals.
    ///
    /// ## Example
    /// ```
    /// # use socketio::EngineError;
    /// let e = EngineError::malformed("Body was truncated.");
    /// ```
    pub fn malformed<S: Into<String>>(reason: S) -> EngineError {
        EngineError::MalformedPacket(reason.into())
    }

    /// Tries to get the underlying I/O error, if one is present.
    pub fn io(&self) -> Option<&IoError> {
        match *self {
            EngineError::Transport(ref err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for socket.io operations.
pub type Result<T> = ::std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn io_error_is_exposed() {
        let err = EngineError::from(IoError::new(ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.io().map(|e| e.kind()), Some(ErrorKind::BrokenPipe));
        assert!(EngineError::NotConnected.io().is_none());
    }

    #[test]
    fn display_carries_status() {
        assert!(EngineError::HandshakeRejected(404).to_string().contains("404"));
        assert!(EngineError::UpgradeRejected(400).to_string().contains("400"));
    }
}
