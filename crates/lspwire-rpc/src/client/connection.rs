//! Request/response client over a framed duplex stream

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::{Dispatch, NotificationDispatcher};
use super::pending::{PendingGuard, PendingRequests};
use crate::error::{Result, RpcError};
use crate::protocol::{to_payload, IdGenerator, Message, MessageKind, ResponseError};
use crate::transport::{FrameReader, FrameWriter};
use crate::types::{ClientOptions, ClientState};

/// Upper bound on closing the write side during shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// JSON-RPC client for a single peer
///
/// Cheap to clone (internally `Arc`-backed); every clone drives the same
/// connection. All methods are safe to call concurrently from any task.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    options: ClientOptions,
    state: AtomicU8,
    ids: IdGenerator,
    writer: Mutex<Option<Arc<FrameWriter>>>,
    pending: PendingRequests,
    dispatcher: NotificationDispatcher,
    shutdown: CancellationToken,
}

impl Client {
    /// Create a client; nothing is read or written until [`Client::start`]
    pub fn new(options: ClientOptions) -> Self {
        let options = options.normalized();
        let dispatcher = NotificationDispatcher::new(options.max_concurrent_handlers);
        Self {
            inner: Arc::new(Inner {
                options,
                state: AtomicU8::new(ClientState::Constructed.as_u8()),
                ids: IdGenerator::new(),
                writer: Mutex::new(None),
                pending: PendingRequests::new(),
                dispatcher,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Attach a duplex stream and launch the receive loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start_with_io(reader, writer)
    }

    /// Attach separate read and write halves (e.g. a child's stdout and stdin)
    pub fn start_with_io<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        {
            let mut slot = self.inner.writer.lock();
            match self.state() {
                ClientState::Closed => return Err(RpcError::Closed),
                ClientState::Started => return Err(RpcError::AlreadyStarted),
                ClientState::Constructed => {}
            }
            if slot.is_some() {
                return Err(RpcError::AlreadyStarted);
            }
            *slot = Some(Arc::new(FrameWriter::new(writer)));

            if let Err(current) = self.inner.state.compare_exchange(
                ClientState::Constructed.as_u8(),
                ClientState::Started.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                *slot = None;
                return Err(match ClientState::from_u8(current) {
                    ClientState::Closed => RpcError::Closed,
                    _ => RpcError::AlreadyStarted,
                });
            }
        }

        let reader = FrameReader::with_max_frame_size(reader, self.inner.options.max_frame_size);
        tokio::spawn(receive_loop(
            Arc::downgrade(&self.inner),
            reader,
            self.inner.shutdown.clone(),
        ));

        info!("JSON-RPC client started");
        Ok(())
    }

    /// Send a request and wait for its raw result
    ///
    /// `params` that serialize to `null` (e.g. `&()`) are omitted. Without an
    /// explicit `timeout` the configured default applies. A successful response
    /// with no `result` field yields `None`.
    pub async fn request<P>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<Option<Box<RawValue>>>
    where
        P: Serialize + ?Sized,
    {
        self.inner.request(method, params, timeout, None).await
    }

    /// Like [`Client::request`], but also gives up when `cancel` fires
    pub async fn request_with_cancel<P>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<RawValue>>>
    where
        P: Serialize + ?Sized,
    {
        self.inner.request(method, params, timeout, Some(cancel)).await
    }

    /// Send a request with the default timeout and decode the result into `R`
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let raw = self.request(method, params, None).await?;
        match raw {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_value(serde_json::Value::Null),
        }
        .map_err(RpcError::Decode)
    }

    /// Send a notification; returns once the frame is written
    pub async fn notify<P>(&self, method: &str, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let writer = self.inner.writer()?;
        let message = Message::notification(method, to_payload(params)?);
        self.inner.send(&writer, &message).await
    }

    /// Install or replace the handler for a notification method
    ///
    /// Handlers run on the blocking pool and may block. A handler replaced
    /// while running finishes normally.
    pub fn register_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Box<RawValue>>) + Send + Sync + 'static,
    {
        self.inner.dispatcher.register(method, Arc::new(handler));
    }

    /// Remove the handler for a notification method
    pub fn unregister_notification_handler(&self, method: &str) -> bool {
        self.inner.dispatcher.unregister(method)
    }

    /// Whether a handler is registered for `method`
    pub fn has_notification_handler(&self, method: &str) -> bool {
        self.inner.dispatcher.contains(method)
    }

    /// Close the client
    ///
    /// Idempotent. Closes the stream (best effort) and fails every waiting
    /// request with [`RpcError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.close("shutdown requested").await;
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Whether the client has been closed
    pub fn is_closed(&self) -> bool {
        self.state() == ClientState::Closed
    }

    /// Resolves once the client is closed
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Effective options
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Inner {
    fn writer(&self) -> Result<Arc<FrameWriter>> {
        match ClientState::from_u8(self.state.load(Ordering::SeqCst)) {
            ClientState::Closed => Err(RpcError::Closed),
            ClientState::Constructed => Err(RpcError::NotStarted),
            ClientState::Started => self.writer.lock().clone().ok_or(RpcError::Closed),
        }
    }

    /// Write a frame, giving up if the client closes mid-write
    async fn send(&self, writer: &FrameWriter, message: &Message) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(RpcError::Closed),
            result = writer.send(message) => result,
        }
    }

    async fn request<P>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Box<RawValue>>>
    where
        P: Serialize + ?Sized,
    {
        let writer = self.writer()?;
        let params = to_payload(params)?;

        let id = self.ids.next_id();
        let slot = self.pending.register(id.clone()).ok_or(RpcError::Closed)?;
        let _guard = PendingGuard::new(self.pending.clone(), id.clone());

        let message = Message::request(id.clone(), method, params);
        self.send(&writer, &message).await?;

        let timeout = timeout.unwrap_or_else(|| self.options.request_timeout());
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            response = slot => match response {
                Ok(response) => into_result(response),
                Err(_) => Err(RpcError::Closed),
            },
            _ = tokio::time::sleep(timeout) => {
                debug!(method = %method, id = %id, "Request timed out");
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = cancelled => {
                debug!(method = %method, id = %id, "Request cancelled");
                Err(RpcError::Cancelled {
                    method: method.to_string(),
                })
            }
        }
    }

    /// Transition to closed and release everything; later calls are no-ops
    async fn close(&self, reason: &str) {
        let previous = self.state.swap(ClientState::Closed.as_u8(), Ordering::SeqCst);
        if previous == ClientState::Closed.as_u8() {
            return;
        }

        self.shutdown.cancel();
        let released = self.pending.close_all();

        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Error closing stream"),
                Err(_) => warn!("Timeout closing stream"),
            }
        }

        info!(reason = reason, released = released, "JSON-RPC client closed");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn into_result(response: Message) -> Result<Option<Box<RawValue>>> {
    match response.error {
        Some(error) => Err(RpcError::Rpc(error)),
        None => Ok(response.result),
    }
}

/// Route one inbound message
fn route(inner: &Arc<Inner>, message: Message) {
    match message.kind() {
        MessageKind::Response => {
            let Some(id) = message.id.clone() else {
                return;
            };
            if !inner.pending.complete(&id, message) {
                debug!(id = %id, "Dropping response for unknown request id");
            }
        }
        MessageKind::Notification => {
            let Message { method, params, .. } = message;
            let method = method.unwrap_or_default();
            if inner.dispatcher.dispatch(&method, params) == Dispatch::NoHandler {
                debug!(method = %method, "No handler for notification");
            }
        }
        MessageKind::Request => {
            let Message { id, method, .. } = message;
            let (Some(id), Some(method)) = (id, method) else {
                return;
            };
            debug!(method = %method, id = %id, "Rejecting server request");

            let reply = Message::error_response(id, ResponseError::method_not_found(&method));
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                if let Ok(writer) = inner.writer() {
                    if let Err(e) = inner.send(&writer, &reply).await {
                        debug!(error = %e, "Failed to reply to server request");
                    }
                }
            });
        }
        MessageKind::Invalid => {
            warn!("Dropping message with neither id nor method");
        }
    }
}

/// Reads frames until the stream fails or the client closes
async fn receive_loop(inner: Weak<Inner>, mut reader: FrameReader, shutdown: CancellationToken) {
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = reader.read_message() => result,
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        match result {
            Ok(message) => route(&inner, message),
            Err(e) => {
                match e {
                    RpcError::ConnectionClosed => info!("Peer closed the connection"),
                    ref e => warn!(error = %e, kind = e.error_type(), "Transport read error"),
                }
                if inner.options.shutdown_on_read_error {
                    inner.close("receive loop ended").await;
                }
                break;
            }
        }
    }

    debug!("Receive loop exited");
}
