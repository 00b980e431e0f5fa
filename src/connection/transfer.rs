//! `upload` / `download` — SFTP sub-channel transfers with partial-state
//! cleanup on failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::audit::AuditAction;
use crate::error::GatewayError;
use crate::result::TransferResult;
use crate::transport::SshTransport;

use super::{Connection, ConnectionInner, ConnectionState};

/// Expands a leading `~` the way a shell would, using the current user's home.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

impl<T: SshTransport> Connection<T> {
    /// Opens an SFTP sub-channel, puts `local_path` to `remote_path`, and
    /// closes the sub-channel regardless of outcome. Reports the pre-upload
    /// local file size.
    pub async fn upload(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<TransferResult, GatewayError> {
        let local = expand_home(local_path);

        let metadata = tokio::fs::metadata(&local).await.map_err(|e| {
            GatewayError::LocalIoError(format!(
                "local file not found: {} ({e})",
                local.display()
            ))
        })?;
        if !metadata.is_file() {
            return Err(GatewayError::LocalIoError(format!(
                "not a regular file: {}",
                local.display()
            )));
        }
        let size = metadata.len();

        let mut inner = self.inner.lock().await;
        let result = self
            .upload_locked(&mut inner, &local, remote_path, size)
            .await;

        let detail = match &result {
            Ok(_) => format!("{} -> {remote_path} ({size} bytes)", local.display()),
            Err(err) => format!("{} -> {remote_path}: {err}", local.display()),
        };
        self.record(AuditAction::Upload, detail);

        result
    }

    async fn upload_locked(
        &self,
        inner: &mut ConnectionInner<T>,
        local: &Path,
        remote_path: &str,
        size: u64,
    ) -> Result<TransferResult, GatewayError> {
        self.ensure_connected_locked(inner).await?;

        let transfer_timeout = Duration::from_secs(self.spec.transfer_timeout);
        let transport = inner
            .transport
            .as_ref()
            .expect("ensure_connected_locked leaves a live transport on success");

        let copy_result: Result<(), GatewayError> = async {
            let mut sftp = transport.open_sftp(transfer_timeout).await?;
            let mut remote_file = sftp.create_write(remote_path).await?;
            let mut local_file = tokio::fs::File::open(local).await?;

            tokio::time::timeout(
                transfer_timeout,
                tokio::io::copy(&mut local_file, &mut remote_file),
            )
            .await
            .map_err(|_| GatewayError::ApplicationError {
                message: format!("Upload failed to '{}': {remote_path}", self.spec.name),
                source: crate::error::TransportError::new("transfer timed out"),
            })?
            .map_err(|e| GatewayError::ApplicationError {
                message: format!("Upload failed to '{}': {remote_path}", self.spec.name),
                source: crate::error::TransportError::new(e.to_string()),
            })?;

            remote_file
                .shutdown()
                .await
                .map_err(|e| GatewayError::ApplicationError {
                    message: format!("Upload failed to '{}': {remote_path}", self.spec.name),
                    source: crate::error::TransportError::new(e.to_string()),
                })?;
            Ok(())
        }
        .await;

        match copy_result {
            Ok(()) => Ok(TransferResult {
                success: true,
                host: self.spec.name.clone(),
                local_path: local.to_string_lossy().into_owned(),
                remote_path: remote_path.to_string(),
                bytes: size,
            }),
            Err(GatewayError::TransportFailure { message, source }) => {
                inner.state = ConnectionState::Error;
                Err(GatewayError::TransportFailure { message, source })
            }
            Err(other) => Err(other),
        }
    }

    /// Creates missing parent directories, opens SFTP, and gets
    /// `remote_path` into `local_path`. Once a transfer is underway, any
    /// failure removes the partially written local file before propagating;
    /// a failure to (re)connect, before anything local was touched, does
    /// not touch `local_path` at all.
    pub async fn download(
        &self,
        remote_path: &str,
        local_path: &str,
    ) -> Result<TransferResult, GatewayError> {
        let local = expand_home(local_path);

        if let Some(parent) = local.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut inner = self.inner.lock().await;

        if let Err(err) = self.ensure_connected_locked(&mut inner).await {
            // Nothing was opened or written yet, so there's no partial file
            // to clean up — only attempt cleanup once a transfer was
            // actually underway.
            self.record(
                AuditAction::Download,
                format!("{remote_path} -> {}: {err}", local.display()),
            );
            return Err(err);
        }

        let result = self.download_locked(&mut inner, remote_path, &local).await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&local).await;
        }

        let detail = match &result {
            Ok(r) => format!("{remote_path} -> {} ({} bytes)", local.display(), r.bytes),
            Err(err) => format!("{remote_path} -> {}: {err}", local.display()),
        };
        self.record(AuditAction::Download, detail);

        result
    }

    async fn download_locked(
        &self,
        inner: &mut ConnectionInner<T>,
        remote_path: &str,
        local: &Path,
    ) -> Result<TransferResult, GatewayError> {
        // Caller (`download`) already ran `ensure_connected_locked` outside
        // the cleanup-on-failure scope below.
        let transfer_timeout = Duration::from_secs(self.spec.transfer_timeout);
        let transport = inner
            .transport
            .as_ref()
            .expect("ensure_connected_locked leaves a live transport on success");

        let copy_result: Result<(), GatewayError> = async {
            let mut sftp = transport.open_sftp(transfer_timeout).await?;
            let mut remote_file = sftp.open_read(remote_path).await?;
            let mut local_file = tokio::fs::File::create(local).await?;

            tokio::time::timeout(
                transfer_timeout,
                tokio::io::copy(&mut remote_file, &mut local_file),
            )
            .await
            .map_err(|_| GatewayError::ApplicationError {
                message: format!("Download failed from '{}': {remote_path}", self.spec.name),
                source: crate::error::TransportError::new("transfer timed out"),
            })?
            .map_err(|e| GatewayError::ApplicationError {
                message: format!("Download failed from '{}': {remote_path}", self.spec.name),
                source: crate::error::TransportError::new(e.to_string()),
            })?;

            local_file
                .flush()
                .await
                .map_err(|e| GatewayError::LocalIoError(e.to_string()))?;
            Ok(())
        }
        .await;

        match copy_result {
            Ok(()) => {
                let size = tokio::fs::metadata(local).await.map(|m| m.len()).unwrap_or(0);
                Ok(TransferResult {
                    success: true,
                    host: self.spec.name.clone(),
                    local_path: local.to_string_lossy().into_owned(),
                    remote_path: remote_path.to_string(),
                    bytes: size,
                })
            }
            Err(GatewayError::TransportFailure { message, source }) => {
                inner.state = ConnectionState::Error;
                Err(GatewayError::TransportFailure { message, source })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::config::HostSpec;
    use crate::transport::mock::{self, MockFileSpec, MockTransport};

    use super::super::Connection;

    fn spec(name: &str) -> Arc<HostSpec> {
        Arc::new(HostSpec {
            name: name.to_string(),
            hostname: "example.com".to_string(),
            username: "u".to_string(),
            port: 22,
            identity_file: None,
            password: Some("p".to_string()),
            auto_accept_host_key: false,
            command_timeout: 30,
            transfer_timeout: 30,
            allowed_commands: None,
        })
    }

    #[tokio::test]
    async fn upload_reports_pre_transfer_local_size() {
        mock::register("upload-host");
        let dir = tempdir().unwrap();
        let local = dir.path().join("payload.bin");
        tokio::fs::write(&local, b"hello world").await.unwrap();

        let conn: Connection<MockTransport> = Connection::new(spec("upload-host"));
        let result = conn
            .upload(local.to_str().unwrap(), "/remote/payload.bin")
            .await
            .unwrap();

        assert_eq!(result.bytes, 11);
        assert!(result.success);
    }

    #[tokio::test]
    async fn upload_missing_local_file_fails_without_touching_transport() {
        let state = mock::register("upload-missing");
        let conn: Connection<MockTransport> = Connection::new(spec("upload-missing"));
        let err = conn
            .upload("/no/such/local/file", "/remote/x")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::GatewayError::LocalIoError(_)));
        assert_eq!(state.dial_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_creates_missing_parent_directories() {
        let state = mock::register("download-host");
        state.set_read_file(
            "/remote/report.txt",
            MockFileSpec {
                contents: b"report contents".to_vec(),
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let local = dir.path().join("nested/dir/report.txt");

        let conn: Connection<MockTransport> = Connection::new(spec("download-host"));
        let result = conn
            .download("/remote/report.txt", local.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(result.bytes, 16);
        assert_eq!(tokio::fs::read(&local).await.unwrap(), b"report contents");
    }

    #[tokio::test]
    async fn download_failure_removes_partial_local_file() {
        let state = mock::register("partial-download");
        state.set_read_file(
            "/remote/big.bin",
            MockFileSpec {
                contents: vec![b'x'; 1000],
                fail_after: Some(10),
                ..Default::default()
            },
        );
        let dir = tempdir().unwrap();
        let local = dir.path().join("big.bin");

        let conn: Connection<MockTransport> = Connection::new(spec("partial-download"));
        let err = conn
            .download("/remote/big.bin", local.to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::GatewayError::ApplicationError { .. }));
        assert!(!local.exists());
        assert_eq!(
            conn.status().await.state,
            crate::result::ConnectionStateName::Connected
        );
    }

    #[tokio::test]
    async fn download_failed_reconnect_does_not_delete_preexisting_local_file() {
        let state = mock::register("unreachable-download");
        state.fail_dial.store(true, std::sync::atomic::Ordering::SeqCst);

        let dir = tempdir().unwrap();
        let local = dir.path().join("already-here.bin");
        tokio::fs::write(&local, b"do not touch me").await.unwrap();

        let conn: Connection<MockTransport> = Connection::new(spec("unreachable-download"));
        let err = conn
            .download("/remote/report.txt", local.to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, crate::error::GatewayError::ConnectFailure { .. }));
        assert_eq!(tokio::fs::read(&local).await.unwrap(), b"do not touch me");
    }
}
