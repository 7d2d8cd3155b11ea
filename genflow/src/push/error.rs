//! Error types for the push channel.

use thiserror::Error;

/// Errors raised while connecting to or reading from the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The connection could not be established.
    #[error("Failed to connect to event stream: {0}")]
    Connect(String),

    /// The server answered the stream request with a non-success status.
    #[error("Event stream request failed with HTTP {0}")]
    Http(u16),

    /// The stream broke after it was opened.
    #[error("Event stream interrupted: {0}")]
    Stream(String),

    /// A single event could not be decoded. Never fatal to the channel.
    #[error("Failed to parse event: {0}")]
    Parse(String),
}
