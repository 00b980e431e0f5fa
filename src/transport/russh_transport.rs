//! Production [`SshTransport`] backed by `russh` / `async-ssh2-tokio` for
//! the transport dial and exec, and `russh-sftp` for file transfer.

use std::pin::Pin;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession as RusshSftpClient;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::config::HostSpec;
use crate::error::{GatewayError, TransportError};

use super::{ExecHandle, SftpSession, SshTransport, algorithms};

/// Each dial phase (TCP connect, banner, auth) is bounded by this duration.
const PHASE_TIMEOUT: Duration = Duration::from_secs(15);

fn connect_failure(host: &str, err: impl std::fmt::Display) -> GatewayError {
    GatewayError::ConnectFailure {
        host: host.to_string(),
        source: TransportError::new(err.to_string()),
    }
}

fn transport_failure(message: impl Into<String>, err: impl std::fmt::Display) -> GatewayError {
    GatewayError::TransportFailure {
        message: message.into(),
        source: TransportError::new(err.to_string()),
    }
}

fn application_error(message: impl Into<String>, err: impl std::fmt::Display) -> GatewayError {
    GatewayError::ApplicationError {
        message: message.into(),
        source: TransportError::new(err.to_string()),
    }
}

/// A live SSH connection to one host.
pub struct RusshTransport {
    client: Client,
}

#[async_trait]
impl SshTransport for RusshTransport {
    async fn dial(spec: &HostSpec) -> Result<Self, GatewayError> {
        let auth = if let Some(identity_file) = &spec.identity_file {
            AuthMethod::with_key_file(identity_file, None)
        } else if let Some(password) = &spec.password {
            AuthMethod::with_password(password)
        } else {
            // HostSpec::finish already rejects this combination at config
            // load time; defend anyway since a caller could construct one
            // by hand.
            return Err(connect_failure(
                &spec.name,
                "no identity_file or password configured",
            ));
        };

        let server_check = if spec.auto_accept_host_key {
            log::warn!(
                "auto-accepting host keys for '{}' (man-in-the-middle risk)",
                spec.name
            );
            ServerCheckMethod::NoCheck
        } else {
            ServerCheckMethod::DefaultKnownHostsFile
        };

        let config = Config {
            preferred: algorithms::preferred(),
            inactivity_timeout: Some(PHASE_TIMEOUT * 3),
            ..Default::default()
        };

        let client = tokio::time::timeout(
            PHASE_TIMEOUT * 3,
            Client::connect_with_config(
                (spec.hostname.as_str(), spec.port),
                &spec.username,
                auth,
                server_check,
                config,
            ),
        )
        .await
        .map_err(|_| connect_failure(&spec.name, "connect timed out"))?
        .map_err(|e| connect_failure(&spec.name, e))?;

        log::info!("connected to '{}' ({}:{})", spec.name, spec.hostname, spec.port);
        Ok(Self { client })
    }

    async fn is_active(&self) -> bool {
        !self.client.is_closed()
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<ExecHandle, GatewayError> {
        // A per-recv timeout doesn't map onto this transport, which
        // multiplexes both streams onto one message channel rather than
        // exposing two blocking handles with their own recv timeouts. The
        // caller wraps each reader task's drain-to-EOF loop in an overall
        // deadline instead.
        let _ = timeout;

        let mut channel = self
            .client
            .get_channel()
            .await
            .map_err(|e| transport_failure("failed to open exec channel", e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| transport_failure("failed to start command", e))?;

        let (stdout_tx, stdout_rx) = mpsc::channel(64);
        let (stderr_tx, stderr_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, mut kill_rx) = oneshot::channel();

        // Pump task: fans the single multiplexed channel-message stream out
        // to per-stream mpsc channels so the caller can run two genuinely
        // independent reader tasks, each draining its own channel to EOF,
        // even though the underlying transport has only one message stream.
        tokio::spawn(async move {
            let mut exit_tx = Some(exit_tx);
            loop {
                tokio::select! {
                    _ = &mut kill_rx => {
                        let _ = channel.close().await;
                        break;
                    }
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { data }) => {
                                if stdout_tx.send(data.to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                                if stderr_tx.send(data.to_vec()).await.is_err() {
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                if let Some(tx) = exit_tx.take() {
                                    let _ = tx.send(exit_status as i32);
                                }
                            }
                            Some(ChannelMsg::Eof) | None => break,
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(ExecHandle::new(stdout_rx, stderr_rx, exit_rx, kill_tx))
    }

    async fn open_sftp(&self, timeout: Duration) -> Result<Box<dyn SftpSession>, GatewayError> {
        let channel = self
            .client
            .get_channel()
            .await
            .map_err(|e| transport_failure("failed to open SFTP channel", e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| transport_failure("failed to request SFTP subsystem", e))?;

        let sftp = tokio::time::timeout(timeout, RusshSftpClient::new(channel.into_stream()))
            .await
            .map_err(|_| transport_failure("SFTP subsystem handshake timed out", "timeout"))?
            .map_err(|e| transport_failure("SFTP subsystem unavailable", e))?;

        Ok(Box::new(RusshSftpHandle { sftp, timeout }))
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| transport_failure("failed to close connection", e))
    }
}

struct RusshSftpHandle {
    sftp: RusshSftpClient,
    timeout: Duration,
}

#[async_trait]
impl SftpSession for RusshSftpHandle {
    async fn open_read(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncRead + Send + Unpin>>, GatewayError> {
        let file = tokio::time::timeout(self.timeout, self.sftp.open(remote_path))
            .await
            .map_err(|_| application_error("remote open timed out", "timeout"))?
            .map_err(|e| application_error(format!("cannot open remote file {remote_path}"), e))?;
        Ok(Box::pin(file))
    }

    async fn create_write(
        &mut self,
        remote_path: &str,
    ) -> Result<Pin<Box<dyn AsyncWrite + Send + Unpin>>, GatewayError> {
        let file = tokio::time::timeout(self.timeout, self.sftp.create(remote_path))
            .await
            .map_err(|_| application_error("remote create timed out", "timeout"))?
            .map_err(|e| {
                application_error(format!("cannot create remote file {remote_path}"), e)
            })?;
        Ok(Box::pin(file))
    }
}
