//! Error types for renderlink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Renderlink error types
///
/// Channel-level faults (`ConnectionReset`, `Io`) and `HandshakeRejected`
/// abort the session. Scene-content problems (an object referencing an
/// unknown mesh, an unsupported shader graph) are not errors: the exporter
/// logs them and skips the affected entity.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection mid-message
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Server refused the protocol handshake
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Wire serialization or deserialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Incoming frame announced an implausible payload size
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// Session used in a state that does not permit the operation
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
