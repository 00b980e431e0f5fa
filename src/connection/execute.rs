//! The dual-stream `execute` subroutine — the hardest part of the core.
//! stdout and stderr share one multiplexed transport with a
//! bounded per-stream flow-control window; draining them sequentially
//! deadlocks on any command that writes more than that window to stderr
//! while stdout is still being read. Two sibling tasks, each draining one
//! stream to EOF, avoid the hazard.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::audit::AuditAction;
use crate::error::{GatewayError, TransportError};
use crate::guard::CommandGuard;
use crate::result::CommandResult;
use crate::transport::{SshTransport, StreamChunk};

use super::{Connection, ConnectionInner, ConnectionState};

/// Drains a stream-chunk channel to EOF (sender dropped), concatenating
/// every chunk. Touches only its own receiver — no connection lock needed.
async fn drain_to_eof(mut rx: mpsc::Receiver<StreamChunk>) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Some(chunk) = rx.recv().await {
        buf.extend_from_slice(&chunk);
    }
    buf
}

impl<T: SshTransport> Connection<T> {
    /// Runs the [`CommandGuard`] (outside the lock, since it reads only
    /// immutable config), then ensures the connection and executes.
    pub async fn execute(&self, command: &str) -> Result<CommandResult, GatewayError> {
        CommandGuard::check(command, self.spec.allowed_commands.as_deref())?;

        let mut inner = self.inner.lock().await;
        let result = self.execute_locked(&mut inner, command).await;

        let detail = match &result {
            Ok(r) => format!("{command} -> exit {}", r.exit_code),
            Err(err) => format!("{command} -> error: {err}"),
        };
        self.record(AuditAction::Execute, detail);

        result
    }

    async fn execute_locked(
        &self,
        inner: &mut ConnectionInner<T>,
        command: &str,
    ) -> Result<CommandResult, GatewayError> {
        self.ensure_connected_locked(inner).await?;

        let started_at = Utc::now();
        let command_timeout = Duration::from_secs(self.spec.command_timeout);
        let overall_deadline = command_timeout + Duration::from_secs(5);

        let transport = inner
            .transport
            .as_ref()
            .expect("ensure_connected_locked leaves a live transport on success");

        let mut handle = match transport.exec(command, command_timeout).await {
            Ok(handle) => handle,
            Err(err) => {
                inner.state = ConnectionState::Error;
                log::error!("'{}': failed to start '{command}': {err}", self.spec.name);
                return Err(GatewayError::TransportFailure {
                    message: format!("Command execution failed on '{}'", self.spec.name),
                    source: TransportError::new(err.to_string()),
                });
            }
        };

        let stdout_task = tokio::spawn(drain_to_eof(handle.stdout_rx));
        let stderr_task = tokio::spawn(drain_to_eof(handle.stderr_rx));

        let drained = tokio::time::timeout(overall_deadline, async {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;

        let (stdout_buf, stderr_buf) = match drained {
            Ok(pair) => pair,
            Err(_) => {
                if let Some(kill) = handle.kill.take() {
                    let _ = kill.send(());
                }
                log::warn!(
                    "'{}': command '{command}' timed out after {}s",
                    self.spec.name,
                    command_timeout.as_secs()
                );
                return Err(GatewayError::Timeout {
                    host: self.spec.name.clone(),
                    timeout_secs: command_timeout.as_secs(),
                });
            }
        };

        let exit_code = match handle.exit_status.await {
            Ok(code) => code,
            Err(_) => {
                inner.state = ConnectionState::Error;
                log::error!(
                    "'{}': transport closed before exit status for '{command}'",
                    self.spec.name
                );
                return Err(GatewayError::TransportFailure {
                    message: format!("Command execution failed on '{}'", self.spec.name),
                    source: TransportError::new("channel closed without an exit status"),
                });
            }
        };

        inner.last_used = Some(std::time::Instant::now());

        let ended_at = Utc::now();
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0);

        Ok(CommandResult {
            command: command.to_string(),
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            host: self.spec.name.clone(),
            started_at,
            ended_at,
            duration_ms,
        })
    }
}
