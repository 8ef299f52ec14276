//! JSON-RPC client: correlation, notification dispatch and lifecycle

pub mod connection;
pub mod dispatch;
pub mod pending;

pub use connection::Client;
pub use dispatch::{Dispatch, NotificationDispatcher, NotificationHandler};
pub use pending::{PendingRequests, ResponseSlot};
