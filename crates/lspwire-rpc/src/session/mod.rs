//! Session management: one started client per workspace root
//!
//! A [`SessionConnector`] knows how to open a duplex stream for a workspace
//! (spawning a language server, dialing a socket, ...). The
//! [`SessionManager`] owns the resulting [`Session`]s keyed by root URI and
//! drives their lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::{Result, RpcError};
use crate::transport::{BoxReader, BoxWriter};
use crate::types::SessionOptions;

/// Something a connection owns beyond its byte streams (e.g. a child process)
#[async_trait]
pub trait SessionResource: Send + Sync {
    /// Release the resource; called once after the client has shut down
    async fn release(&mut self);
}

/// Byte streams for one session plus whatever keeps them alive
pub struct Connection {
    pub reader: BoxReader,
    pub writer: BoxWriter,
    pub resource: Option<Box<dyn SessionResource>>,
}

impl Connection {
    /// Connection with no owned resource
    pub fn new(reader: BoxReader, writer: BoxWriter) -> Self {
        Self {
            reader,
            writer,
            resource: None,
        }
    }

    /// Attach a resource released when the session shuts down
    pub fn with_resource(mut self, resource: Box<dyn SessionResource>) -> Self {
        self.resource = Some(resource);
        self
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("has_resource", &self.resource.is_some())
            .finish_non_exhaustive()
    }
}

/// Opens connections for sessions
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Establish a connection for `root_uri`
    async fn connect(&self, root_uri: &str, options: &SessionOptions) -> Result<Connection>;
}

/// A started client bound to a workspace root
pub struct Session {
    root_uri: String,
    client: Client,
    resource: Mutex<Option<Box<dyn SessionResource>>>,
}

impl Session {
    fn new(root_uri: String, client: Client, resource: Option<Box<dyn SessionResource>>) -> Self {
        Self {
            root_uri,
            client,
            resource: Mutex::new(resource),
        }
    }

    /// Workspace root this session serves
    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    /// Client for this session
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the client is still usable
    pub fn is_alive(&self) -> bool {
        !self.client.is_closed()
    }

    /// Shut the client down, then release the connection's resource
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;

        let resource = self.resource.lock().await.take();
        if let Some(mut resource) = resource {
            resource.release().await;
            debug!(root_uri = %self.root_uri, "Released session resource");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("root_uri", &self.root_uri)
            .field("client", &self.client)
            .finish()
    }
}

/// Creates and owns one [`Session`] per root URI
pub struct SessionManager<C> {
    connector: C,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    /// Serializes starts per root; the session table is never locked across I/O
    starting: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: SessionConnector> SessionManager<C> {
    /// Create a manager that opens connections through `connector`
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            sessions: RwLock::new(HashMap::new()),
            starting: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Get the running session for `root_uri`, starting one if needed
    ///
    /// A session whose client has closed is released and replaced.
    pub async fn start_session(
        &self,
        root_uri: &str,
        options: &SessionOptions,
    ) -> Result<Arc<Session>> {
        if root_uri.is_empty() {
            return Err(RpcError::Session("root URI must not be empty".to_string()));
        }

        let gate = self.start_gate(root_uri);
        let result = {
            let _starting = gate.lock().await;
            self.start_exclusive(root_uri, options).await
        };
        self.release_start_gate(root_uri, gate);
        result
    }

    /// Start path for one root; callers hold that root's start gate
    async fn start_exclusive(
        &self,
        root_uri: &str,
        options: &SessionOptions,
    ) -> Result<Arc<Session>> {
        let stale = {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(root_uri) {
                if existing.is_alive() {
                    debug!(root_uri = %root_uri, "Reusing running session");
                    return Ok(Arc::clone(existing));
                }
            }
            sessions.remove(root_uri)
        };
        if let Some(stale) = stale {
            debug!(root_uri = %root_uri, "Replacing closed session");
            stale.shutdown().await;
        }

        let Connection {
            reader,
            writer,
            resource,
        } = self.connector.connect(root_uri, options).await?;

        let client = Client::new(options.client.clone());
        if let Err(e) = client.start_with_io(reader, writer) {
            if let Some(mut resource) = resource {
                resource.release().await;
            }
            return Err(e);
        }

        let session = Arc::new(Session::new(root_uri.to_string(), client, resource));
        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(root_uri.to_string(), Arc::clone(&session));
            sessions.len()
        };

        info!(root_uri = %root_uri, sessions = count, "Session started");
        Ok(session)
    }

    fn start_gate(&self, root_uri: &str) -> Arc<Mutex<()>> {
        let mut starting = self.starting.lock();
        Arc::clone(starting.entry(root_uri.to_string()).or_default())
    }

    fn release_start_gate(&self, root_uri: &str, gate: Arc<Mutex<()>>) {
        let mut starting = self.starting.lock();
        // One reference in the map plus ours: nobody else is waiting
        if Arc::strong_count(&gate) == 2 {
            starting.remove(root_uri);
        }
    }

    /// Look up the session for `root_uri`
    pub async fn get_session(&self, root_uri: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(root_uri).cloned()
    }

    /// Shut down and forget the session for `root_uri`
    pub async fn shutdown_session(&self, root_uri: &str) -> Result<()> {
        let session = self.sessions.write().await.remove(root_uri);
        match session {
            Some(session) => {
                session.shutdown().await;
                info!(root_uri = %root_uri, "Session stopped");
                Ok(())
            }
            None => Err(RpcError::Session(format!(
                "no session for root URI: {}",
                root_uri
            ))),
        }
    }

    /// Shut down every session
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        if sessions.is_empty() {
            return;
        }

        let count = sessions.len();
        for session in sessions {
            session.shutdown().await;
        }
        info!(count = count, "All sessions stopped");
    }

    /// Number of tracked sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Root URIs of every tracked session
    pub async fn root_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Connector used for new sessions
    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C> Drop for SessionManager<C> {
    fn drop(&mut self) {
        let open = self.sessions.get_mut().len();
        if open > 0 {
            warn!(sessions = open, "Session manager dropped with open sessions");
        }
    }
}
