//! `connect` / `disconnect` / `is_connected` and the shared `ensure_connected`
//! helper other operations call while already holding the lock.

use crate::audit::AuditAction;
use crate::error::GatewayError;
use crate::transport::SshTransport;

use super::{Connection, ConnectionInner, ConnectionState};

impl<T: SshTransport> Connection<T> {
    /// Idempotent when already `Connected` and the transport is alive;
    /// otherwise dials a fresh transport.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let mut guard = self.inner.lock().await;
        self.connect_locked(&mut guard).await
    }

    pub(crate) async fn connect_locked(
        &self,
        inner: &mut ConnectionInner<T>,
    ) -> Result<(), GatewayError> {
        if inner.state == ConnectionState::Connected {
            if let Some(transport) = &inner.transport {
                if transport.is_active().await {
                    return Ok(());
                }
            }
            inner.state = ConnectionState::Error;
        }

        inner.state = ConnectionState::Connecting;

        if let Some(old) = inner.transport.take() {
            let _ = old.close().await;
        }

        match T::dial(&self.spec).await {
            Ok(transport) => {
                inner.transport = Some(transport);
                inner.state = ConnectionState::Connected;
                inner.last_used = Some(std::time::Instant::now());
                self.record(
                    AuditAction::Connect,
                    format!("connected to {}:{}", self.spec.hostname, self.spec.port),
                );
                log::info!("'{}': connected", self.spec.name);
                Ok(())
            }
            Err(err) => {
                inner.transport = None;
                inner.state = ConnectionState::Error;
                log::error!("'{}': connect failed: {err}", self.spec.name);
                Err(err)
            }
        }
    }

    /// Closes the transport if any and returns to `Disconnected`. Safe to
    /// call repeatedly.
    pub async fn disconnect(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        self.disconnect_locked(&mut inner).await
    }

    pub(crate) async fn disconnect_locked(
        &self,
        inner: &mut ConnectionInner<T>,
    ) -> Result<(), GatewayError> {
        let result = if let Some(transport) = inner.transport.take() {
            transport.close().await
        } else {
            Ok(())
        };
        inner.state = ConnectionState::Disconnected;
        self.record(AuditAction::Disconnect, "");
        log::info!("'{}': disconnected", self.spec.name);
        result
    }

    /// Probes transport liveness, syncing `state` if it has died.
    pub async fn is_connected(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.is_connected_locked(&mut inner).await
    }

    pub(crate) async fn is_connected_locked(&self, inner: &mut ConnectionInner<T>) -> bool {
        if inner.state != ConnectionState::Connected {
            return false;
        }
        let Some(transport) = &inner.transport else {
            inner.state = ConnectionState::Error;
            return false;
        };
        if transport.is_active().await {
            true
        } else {
            log::warn!("'{}': transport died, marking error", self.spec.name);
            inner.state = ConnectionState::Error;
            false
        }
    }

    /// Ensures a live transport is present, reconnecting if necessary.
    /// Called by `execute`/`upload`/`download` while already holding the lock.
    pub(crate) async fn ensure_connected_locked(
        &self,
        inner: &mut ConnectionInner<T>,
    ) -> Result<(), GatewayError> {
        if self.is_connected_locked(inner).await {
            return Ok(());
        }
        self.connect_locked(inner).await
    }
}
