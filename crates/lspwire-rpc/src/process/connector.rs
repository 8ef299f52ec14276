//! Spawns a language server and hands its stdio to a session

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, error, info, warn};

use crate::error::{Result, RpcError};
use crate::session::{Connection, SessionConnector, SessionResource};
use crate::types::SessionOptions;

/// Default time allowed for a killed child to be reaped
pub const DEFAULT_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects sessions to freshly spawned child processes
///
/// The child's stdout is the read side of the connection and its stdin the
/// write side. Stderr lines are forwarded to `tracing` at debug level.
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    exit_timeout: Duration,
}

impl ProcessConnector {
    /// Create a connector with the default exit timeout
    pub fn new() -> Self {
        Self {
            exit_timeout: DEFAULT_EXIT_TIMEOUT,
        }
    }

    /// Bound the wait for a killed child to exit
    pub fn with_exit_timeout(mut self, timeout: Duration) -> Self {
        self.exit_timeout = timeout;
        self
    }
}

impl Default for ProcessConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionConnector for ProcessConnector {
    async fn connect(&self, root_uri: &str, options: &SessionOptions) -> Result<Connection> {
        debug!(
            root_uri = %root_uri,
            executable = %options.executable,
            "Starting language server process"
        );

        let mut cmd = Command::new(&options.executable);
        cmd.args(&options.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(
                executable = %options.executable,
                error = %e,
                "Failed to spawn language server process"
            );
            RpcError::Spawn {
                executable: options.executable.clone(),
                source: e,
            }
        })?;

        let pid = child.id();
        info!(
            root_uri = %root_uri,
            executable = %options.executable,
            pid = ?pid,
            "Language server process spawned"
        );

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(RpcError::Session(format!(
                "{} was spawned without piped stdio",
                options.executable
            )));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(options.executable.clone(), stderr));
        }

        let process = ChildProcess {
            executable: options.executable.clone(),
            child: Some(child),
            exit_timeout: self.exit_timeout,
        };

        Ok(Connection::new(Box::new(stdout), Box::new(stdin)).with_resource(Box::new(process)))
    }
}

/// A spawned language server owned by a session
pub struct ChildProcess {
    executable: String,
    child: Option<Child>,
    exit_timeout: Duration,
}

impl ChildProcess {
    /// OS process id, while the child has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    /// Kill the child and wait (bounded) for it to exit
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            // Already exited on its own
            debug!(executable = %self.executable, error = %e, "Kill failed");
        }

        match tokio::time::timeout(self.exit_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(
                    executable = %self.executable,
                    status = %status,
                    "Language server process exited"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    executable = %self.executable,
                    error = %e,
                    "Error waiting for language server process to exit"
                );
            }
            Err(_) => {
                warn!(
                    executable = %self.executable,
                    "Timeout waiting for language server process to exit"
                );
            }
        }
    }
}

#[async_trait]
impl SessionResource for ChildProcess {
    async fn release(&mut self) {
        self.terminate().await;
    }
}

async fn forward_stderr(executable: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(executable = %executable, "stderr: {}", line),
            Ok(None) => break,
            Err(e) => {
                debug!(executable = %executable, error = %e, "Stopped reading stderr");
                break;
            }
        }
    }
}
