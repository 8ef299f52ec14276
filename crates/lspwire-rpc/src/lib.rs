//! Content-Length framed JSON-RPC client for language servers
//!
//! This crate turns any byte-oriented duplex stream (a child process's stdio,
//! a socket, an in-memory pipe) into a request/response and notification API
//! that many tasks can drive concurrently.
//!
//! # Features
//!
//! - **Framing**: `Content-Length` header blocks with size limits and precise
//!   EOF reporting
//! - **Correlation**: unique numeric ids, at-most-once delivery, per-request
//!   timeouts and caller-driven cancellation
//! - **Notifications**: per-method handlers on isolated tasks with a bounded
//!   number in flight; a panicking handler never takes the client down
//! - **Lifecycle**: explicit start and idempotent shutdown that releases every
//!   waiting caller
//! - **Sessions**: one client per workspace root, backed by spawned language
//!   server processes or any custom connector
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SessionManager ── SessionConnector (ProcessConnector)   │
//! ├──────────────────────────────────────────────────────────┤
//! │  Client                                                  │
//! │   ├─ PendingRequests       id → response slot            │
//! │   ├─ NotificationDispatcher method → handler              │
//! │   └─ receive loop          routes inbound messages       │
//! ├──────────────────────────────────────────────────────────┤
//! │  FrameReader / FrameWriter  (Content-Length codec)       │
//! ├──────────────────────────────────────────────────────────┤
//! │  AsyncRead + AsyncWrite                                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `transport`: frame encoding and decoding
//! - `protocol`: JSON-RPC message model and id generation
//! - `client`: the client, its pending table and notification dispatch
//! - `session`: session manager and connector seam
//! - `process`: connector that spawns language server processes
//! - `config`: YAML configuration and environment overrides
//! - `error`: error types and result types
//! - `types`: options and lifecycle state
//!
//! # Example
//!
//! ```no_run
//! use lspwire_rpc::{Client, ClientOptions};
//!
//! # async fn run(stream: tokio::io::DuplexStream) -> lspwire_rpc::Result<()> {
//! let client = Client::new(ClientOptions::default());
//! client.start(stream)?;
//!
//! client.register_notification_handler("window/logMessage", |params| {
//!     if let Some(params) = params {
//!         println!("server says {}", params.get());
//!     }
//! });
//!
//! let capabilities: serde_json::Value = client
//!     .call("initialize", &serde_json::json!({ "processId": null }))
//!     .await?;
//! println!("{}", capabilities);
//!
//! client.notify("initialized", &serde_json::json!({})).await?;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod process;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

// Re-export public API
pub use client::{
    Client, Dispatch, NotificationDispatcher, NotificationHandler, PendingRequests, ResponseSlot,
};
pub use config::{ConfigLoader, WireConfig};
pub use error::{Result, RpcError};
pub use process::{ChildProcess, ProcessConnector};
pub use protocol::{IdGenerator, Message, MessageKind, RequestId, ResponseError};
pub use session::{Connection, Session, SessionConnector, SessionManager, SessionResource};
pub use transport::{encode_frame, FrameReader, FrameWriter};
pub use types::{ClientOptions, ClientState, SessionOptions};

/// Re-exported so callers can build cancellation tokens for
/// [`Client::request_with_cancel`] without a direct dependency
pub use tokio_util::sync::CancellationToken;
