//! Deterministic in-memory [`SshTransport`] for exercising the core's
//! state machine, execute algorithm, and transfer cleanup logic without a
//! live SSH server.
//!
//! A `MockTransport` is bound to a host by name through a small process-wide
//! registry (`register`) built on a `Lazy`-static singleton — tests seed
//! behavior for a host name, then construct a
//! [`crate::connection::Connection<MockTransport>`] for a [`HostSpec`] with
//! that name.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, oneshot};

use crate::config::HostSpec;
use crate::error::{GatewayError, TransportError};

use super::{ExecHandle, SftpSession, SshTransport};

/// Scripted behavior for one command string.
#[derive(Clone, Default)]
pub struct MockCommandSpec {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub delay: Option<Duration>,
    /// Never completes (no exit status sent) until the exec handle is
    /// force-closed — simulates the command-timeout scenario.
    pub hang: bool,
    /// Sends output normally but never sends an exit status and marks the
    /// transport dead — simulates mid-session transport death.
    pub kill_transport: bool,
}

/// Scripted behavior for one remote file path, read side.
#[derive(Clone, Default)]
pub struct MockFileSpec {
    pub contents: Vec<u8>,
    /// Fail the read after this many bytes (simulates a read that fails
    /// halfway through a download).
    pub fail_after: Option<usize>,
    /// Fail outright when opened for read (application-level, e.g. missing
    /// file / permission denied).
    pub fail_open: bool,
}

#[derive(Default)]
pub struct MockState {
    pub dial_calls: AtomicUsize,
    pub fail_dial: AtomicBool,
    pub alive: AtomicBool,
    commands: StdMutex<HashMap<String, MockCommandSpec>>,
    read_files: StdMutex<HashMap<String, MockFileSpec>>,
    written_files: StdMutex<HashMap<String, Vec<u8>>>,
    fail_create: StdMutex<std::collections::HashSet<String>>,
}

impl MockState {
    pub fn set_command(&self, command: impl Into<String>, spec: MockCommandSpec) {
        self.commands.lock().unwrap().insert(command.into(), spec);
    }

    pub fn set_read_file(&self, path: impl Into<String>, spec: MockFileSpec) {
        self.read_files.lock().unwrap().insert(path.into(), spec);
    }

    pub fn fail_create_for(&self, path: impl Into<String>) {
        self.fail_create.lock().unwrap().insert(path.into());
    }

    pub fn written_file(&self, path: &str) -> Option<Vec<u8>> {
        self.written_files.lock().unwrap().get(path).cloned()
    }
}

static REGISTRY: Lazy<StdMutex<HashMap<String, Arc<MockState>>>> =
    Lazy::new(|| StdMutex::new(HashMap::new()));

/// Seeds (or replaces) the scripted state for `host_name` and returns a
/// handle tests can use to further script behavior.
pub fn register(host_name: &str) -> Arc<MockState> {
    let state = Arc::new(MockState {
        alive: AtomicBool::new(true),
        ..Default::default()
    });
    REGISTRY
        .lock()
        .unwrap()
        .insert(host_name.to_string(), state.clone());
    state
}

#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

#[async_trait]
impl SshTransport for MockTransport {
    async fn dial(spec: &HostSpec) -> Result<Self, GatewayError> {
        let state = REGISTRY
            .lock()
            .unwrap()
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| register(&spec.name));

        state.dial_calls.fetch_add(1, Ordering::SeqCst);

        if state.fail_dial.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectFailure {
                host: spec.name.clone(),
                source: TransportError::new("mock dial failure"),
            });
        }

        state.alive.store(true, Ordering::SeqCst);
        Ok(Self { state })
    }

    async fn is_active(&self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    async fn exec(&self, command: &str, _timeout: Duration) -> Result<ExecHandle, GatewayError> {
        let spec = self
            .state
            .commands
            .lock()
            .unwrap()
            .get(command)
            .cloned()
            .unwrap_or_default();

        let (stdout_tx, stdout_rx) = mpsc::channel(64);
        let (stderr_tx, stderr_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, mut kill_rx) = oneshot::channel();

        let alive = self.state.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = &mut kill_rx => {
                    // Reader(s) stuck past the deadline; drop senders so
                    // they observe EOF.
                }
                _ = async {
                    if let Some(delay) = spec.delay {
                        tokio::time::sleep(delay).await;
                    }
                    if spec.hang {
                        // Never completes on its own; only `kill` unblocks it.
                        std::future::pending::<()>().await;
                        return;
                    }
                    if !spec.stdout.is_empty() {
                        let _ = stdout_tx.send(spec.stdout.clone()).await;
                    }
                    if !spec.stderr.is_empty() {
                        let _ = stderr_tx.send(spec.stderr.clone()).await;
                    }
                    if spec.kill_transport {
                        alive.alive.store(false, Ordering::SeqCst);
                        // exit_tx dropped without sending: signals transport
                        // death to the caller.
                    } else {
                        let _ = exit_tx.send(spec.exit_code);
                    }
                } => {}
            }
        });

        Ok(ExecHandle::new(stdout_rx, stderr_rx, exit_rx, kill_tx))
    }

    async fn open_sftp(&self, _timeout: Duration) -> Result<Box<dyn SftpSession>, GatewayError> {
        Ok(Box::new(MockSftpHandle {
            state: self.state.clone(),
        }))
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.state.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSftpHandle {
    state: Arc<MockState>,
}

#[async_trait]
impl SftpSession for MockSftpHandle {
    async fn open_read(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncRead + Send + Unpin>>, GatewayError> {
        let spec = self
            .state
            .read_files
            .lock()
            .unwrap()
            .get(remote_path)
            .cloned()
            .ok_or_else(|| {
                GatewayError::ApplicationError {
                    message: format!("no such remote file: {remote_path}"),
                    source: TransportError::new("not found"),
                }
            })?;

        if spec.fail_open {
            return Err(GatewayError::ApplicationError {
                message: format!("permission denied: {remote_path}"),
                source: TransportError::new("permission denied"),
            });
        }

        Ok(Box::pin(FaultyReader {
            data: spec.contents,
            pos: 0,
            fail_after: spec.fail_after,
        }))
    }

    async fn create_write(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncWrite + Send + Unpin>>, GatewayError> {
        if self.state.fail_create.lock().unwrap().contains(remote_path) {
            return Err(GatewayError::ApplicationError {
                message: format!("cannot create remote file {remote_path}"),
                source: TransportError::new("permission denied"),
            });
        }
        Ok(Box::pin(RecordingWriter {
            state: self.state.clone(),
            path: remote_path.to_string(),
            buf: Vec::new(),
        }))
    }
}

/// An `AsyncRead` over an in-memory buffer that fails partway through, used
/// to simulate a download whose remote read breaks mid-transfer.
struct FaultyReader {
    data: Vec<u8>,
    pos: usize,
    fail_after: Option<usize>,
}

impl AsyncRead for FaultyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(fail_after) = this.fail_after {
            if this.pos >= fail_after {
                return Poll::Ready(Err(io::Error::other("simulated read failure")));
            }
        }
        if this.pos >= this.data.len() {
            return Poll::Ready(Ok(()));
        }
        let end = this
            .fail_after
            .map_or(this.data.len(), |f| f.min(this.data.len()))
            .min(this.pos + buf.remaining());
        let end = end.max(this.pos);
        buf.put_slice(&this.data[this.pos..end]);
        this.pos = end;
        Poll::Ready(Ok(()))
    }
}

/// An `AsyncWrite` that records whatever is written into `MockState`, used
/// to assert upload contents/size in tests.
struct RecordingWriter {
    state: Arc<MockState>,
    path: String,
    buf: Vec<u8>,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.state
            .written_files
            .lock()
            .unwrap()
            .insert(this.path.clone(), this.buf.clone());
        Poll::Ready(Ok(()))
    }
}
