// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Every failure the client can surface, REST or streaming.
///
/// `IdleTimeout` and `Cancelled` are not errors: they are graceful stream
/// endings and live on [`crate::feed::SessionEnd`].
#[derive(Debug, Error)]
pub enum Error {
    /// Network / DNS / TLS failure while talking to the REST surface.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Well-formed response whose success indicator was false or missing.
    #[error("remote rejected request: {0}")]
    RemoteRejected(String),

    /// Payload did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Streaming handshake failed.
    #[error("stream connect failed: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    /// Socket failed mid-stream.
    #[error("stream read failed: {0}")]
    StreamRead(#[source] tokio_tungstenite::tungstenite::Error),

    /// Remote side closed the socket (close frame or EOF).
    #[error("stream closed by remote")]
    StreamClosed,

    /// Order has no server id yet (never executed).
    #[error("order has not been accepted by the venue")]
    NotAccepted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
