//! Core data structures shared by the client, config and session layers

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::DEFAULT_MAX_FRAME_SIZE;

/// Default request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default bound on notification handlers running at once
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;

/// Lifecycle state of a client; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    /// Created, receive loop not running
    Constructed,
    /// Receive loop running, requests accepted
    Started,
    /// Terminal; every operation fails fast
    Closed,
}

impl ClientState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ClientState::Constructed => 0,
            ClientState::Started => 1,
            ClientState::Closed => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Constructed,
            1 => ClientState::Started,
            _ => ClientState::Closed,
        }
    }
}

/// Client behavior settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Wait applied to requests that carry no explicit timeout
    pub request_timeout_ms: u64,
    /// Largest accepted frame body in bytes
    pub max_frame_size: usize,
    /// Notification handlers allowed to run at once; extra notifications wait their turn
    pub max_concurrent_handlers: usize,
    /// Close the client (and release waiters) when the receive loop hits a read error
    pub shutdown_on_read_error: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            shutdown_on_read_error: true,
        }
    }
}

impl ClientOptions {
    /// Set the default request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the frame size limit
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set the notification handler bound
    pub fn with_max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max;
        self
    }

    /// Choose whether a dead receive loop closes the client
    pub fn with_shutdown_on_read_error(mut self, enabled: bool) -> Self {
        self.shutdown_on_read_error = enabled;
        self
    }

    /// Default request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Replace zero values with defaults
    pub(crate) fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = defaults.request_timeout_ms;
        }
        if self.max_frame_size == 0 {
            self.max_frame_size = defaults.max_frame_size;
        }
        if self.max_concurrent_handlers == 0 {
            self.max_concurrent_handlers = defaults.max_concurrent_handlers;
        }
        self
    }
}

/// How to reach the language server behind a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Executable path (can use $PATH)
    pub executable: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Working directory for the server process
    pub working_dir: Option<PathBuf>,
    /// Settings for the session's client
    pub client: ClientOptions,
}

impl SessionOptions {
    /// Options for running `executable` with no arguments
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Default::default()
        }
    }

    /// Append command line arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the client options
    pub fn with_client_options(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }
}
