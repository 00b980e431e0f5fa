//! The abstract SSH transport boundary.
//!
//! [`Connection`](crate::connection::Connection) and
//! [`Manager`](crate::manager::Manager) are generic over [`SshTransport`] so
//! the core's algorithms — the state machine, the dual-stream execute
//! subroutine, the transfer cleanup logic — can be exercised in tests
//! against [`mock::MockTransport`] without a live SSH server, and run in
//! production against [`russh_transport::RusshTransport`].

pub mod algorithms;
pub mod russh_transport;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::config::HostSpec;
use crate::error::GatewayError;

pub use russh_transport::RusshTransport;

/// A chunk of bytes read from a stdout/stderr stream.
pub type StreamChunk = Vec<u8>;

/// The live handle to one running remote command.
///
/// Carries two independent receivers — one per stream — so a caller can
/// spawn a sibling task per stream and drain each to EOF concurrently,
/// which avoids the stdout/stderr flow-control deadlock a sequential drain
/// would hit. `kill` forces the underlying channel closed when a reader is
/// stuck past its deadline.
pub struct ExecHandle {
    pub stdout_rx: mpsc::Receiver<StreamChunk>,
    pub stderr_rx: mpsc::Receiver<StreamChunk>,
    pub exit_status: oneshot::Receiver<i32>,
    pub(crate) kill: Option<oneshot::Sender<()>>,
}

impl ExecHandle {
    pub fn new(
        stdout_rx: mpsc::Receiver<StreamChunk>,
        stderr_rx: mpsc::Receiver<StreamChunk>,
        exit_status: oneshot::Receiver<i32>,
        kill: oneshot::Sender<()>,
    ) -> Self {
        Self {
            stdout_rx,
            stderr_rx,
            exit_status,
            kill: Some(kill),
        }
    }

    /// Forces the underlying channel closed, unblocking any reader still
    /// waiting on it. Idempotent.
    pub fn force_close(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// An open SFTP sub-channel on a transport.
#[async_trait]
pub trait SftpSession: Send {
    /// Opens `remote_path` for reading (download).
    async fn open_read(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncRead + Send + Unpin>>, GatewayError>;

    /// Creates (or truncates) `remote_path` for writing (upload).
    async fn create_write(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncWrite + Send + Unpin>>, GatewayError>;
}

/// The abstract SSH transport: dial, exec, open an SFTP sub-channel, close,
/// and report channel liveness.
#[async_trait]
pub trait SshTransport: Send + Sync + Sized + 'static {
    /// Dials `spec.hostname:spec.port`, authenticates, and verifies the host
    /// key per `spec.auto_accept_host_key`. Connect, banner, and auth phases
    /// are each bounded (recommended 15s each).
    async fn dial(spec: &HostSpec) -> Result<Self, GatewayError>;

    /// Probes whether the transport is still believed live.
    async fn is_active(&self) -> bool;

    /// Starts `command` with a per-recv timeout of `timeout`. Returns
    /// immediately with a live [`ExecHandle`]; the caller drives the two
    /// reader tasks.
    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecHandle, GatewayError>;

    /// Opens an SFTP sub-channel bounded by `timeout`.
    async fn open_sftp(&self, timeout: Duration) -> Result<Box<dyn SftpSession>, GatewayError>;

    /// Closes the transport. Safe to call on an already-closed transport.
    async fn close(&self) -> Result<(), GatewayError>;
}
