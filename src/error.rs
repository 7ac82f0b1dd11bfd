use std::fmt;

/// Error taxonomy from the error-handling design: every failure path in a feed
/// handler maps to exactly one of these kinds, and the kind — not the error
/// message — decides what the supervising loop does next.
#[derive(Debug)]
pub enum Error {
    /// Cannot open config, cannot resolve hostnames at startup. The process exits.
    Fatal(String),
    /// WebSocket read/write failure or a sink handle reporting no ack. Reconnect.
    ConnectionLost(String),
    /// Malformed JSON, a missing mandatory field, or a non-OK REST status.
    /// The caller drops the affected frame/request and continues.
    Transient(String),
    /// Cooperative shutdown signal observed inside a blocking operation.
    ShutdownRequested,
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fatal(msg) => write!(f, "fatal: {msg}"),
            Error::ConnectionLost(msg) => write!(f, "connection lost: {msg}"),
            Error::Transient(msg) => write!(f, "transient: {msg}"),
            Error::ShutdownRequested => write!(f, "shutdown requested"),
            Error::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::ConnectionLost(value.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Transient(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Transient(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
