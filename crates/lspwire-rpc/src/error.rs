//! Error types for the framed JSON-RPC client

use std::io;

use thiserror::Error;

use crate::protocol::ResponseError;

/// Result type for lspwire operations
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur while framing, sending, or correlating messages
#[derive(Debug, Error)]
pub enum RpcError {
    /// Content-Length header value is not a positive integer
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// Header block ended without a Content-Length header
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Declared body length exceeds the configured limit
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// Stream ended in the middle of a frame
    #[error("unexpected end of stream: expected {expected} bytes, received {received}")]
    UnexpectedEof { expected: usize, received: usize },

    /// Frame body is not a valid message
    #[error("malformed message body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    /// Stream ended cleanly at a frame boundary
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Underlying stream failure
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Outgoing params or message could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Result payload does not match the caller's expected shape
    #[error("failed to decode result: {0}")]
    Decode(#[source] serde_json::Error),

    /// Peer answered a request with an error object
    #[error("rpc error: code={} msg={}", .0.code, .0.message)]
    Rpc(ResponseError),

    /// Client has been shut down
    #[error("client is closed")]
    Closed,

    /// Client has not been started
    #[error("client not started")]
    NotStarted,

    /// Client was started twice
    #[error("client already started")]
    AlreadyStarted,

    /// No response arrived before the deadline
    #[error("request {method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// Caller cancelled the request while waiting
    #[error("request {method} cancelled")]
    Cancelled { method: String },

    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Language server process could not be spawned
    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    /// Session could not be established
    #[error("session error: {0}")]
    Session(String),
}

impl RpcError {
    /// Whether this error came from decoding the frame stream
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            RpcError::InvalidContentLength(_)
                | RpcError::MissingContentLength
                | RpcError::FrameTooLarge { .. }
                | RpcError::UnexpectedEof { .. }
                | RpcError::MalformedBody(_)
        )
    }

    /// Whether the caller gave up waiting (deadline or explicit cancellation)
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Cancelled { .. })
    }

    /// Whether the client was closed underneath the operation
    pub fn is_closed(&self) -> bool {
        matches!(self, RpcError::Closed)
    }

    /// Gets the error type for logging
    pub fn error_type(&self) -> &'static str {
        match self {
            RpcError::InvalidContentLength(_) => "InvalidContentLength",
            RpcError::MissingContentLength => "MissingContentLength",
            RpcError::FrameTooLarge { .. } => "FrameTooLarge",
            RpcError::UnexpectedEof { .. } => "UnexpectedEof",
            RpcError::MalformedBody(_) => "MalformedBody",
            RpcError::ConnectionClosed => "ConnectionClosed",
            RpcError::Io(_) => "Io",
            RpcError::Serialization(_) => "Serialization",
            RpcError::Decode(_) => "Decode",
            RpcError::Rpc(_) => "Rpc",
            RpcError::Closed => "Closed",
            RpcError::NotStarted => "NotStarted",
            RpcError::AlreadyStarted => "AlreadyStarted",
            RpcError::Timeout { .. } => "Timeout",
            RpcError::Cancelled { .. } => "Cancelled",
            RpcError::Config(_) => "Config",
            RpcError::Spawn { .. } => "Spawn",
            RpcError::Session(_) => "Session",
        }
    }
}
