use thiserror::Error;

/// Result type for DLZ Creator operations
pub type Result<T> = std::result::Result<T, DlzError>;

/// Errors that can occur when talking to a DLZ Creator pad server
#[derive(Error, Debug)]
pub enum DlzError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed by the server
    #[error("Connection closed")]
    ConnectionClosed,

    /// Action timed out waiting for the connection context
    #[error("Action timeout")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be decoded
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Dotted key did not have the `B.<bank>.<pad>.<attribute>` shape
    #[error("Invalid pad key: {0}")]
    InvalidPadKey(String),

    /// Pad attribute name is not one the model tracks
    #[error("Unknown pad attribute: {0}")]
    UnknownAttribute(String),

    /// No live connection to the pad server
    #[error("Not connected")]
    NotConnected,

    /// Reconnection attempts were exhausted
    #[error("Gave up after {attempts} reconnection attempts")]
    ReconnectExhausted {
        /// Number of reconnection attempts made
        attempts: u32,
    },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
