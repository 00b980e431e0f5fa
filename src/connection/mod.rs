//! A single managed SSH connection.
//!
//! `Connection<T>` is generic over [`SshTransport`] so the state machine and
//! the execute/transfer algorithms can be driven against
//! [`crate::transport::mock::MockTransport`] in tests and against
//! [`crate::transport::RusshTransport`] in production.
//!
//! Every public method acquires `inner` exactly once, then delegates to a
//! `*_locked` helper that assumes the lock is already held. `connect`,
//! `execute`, `upload`, `download`, and `disconnect` all need the same
//! serialization, and `execute` needs to call the same connect logic
//! `connect()` itself calls — but `tokio::sync::Mutex` isn't reentrant, so
//! the split into an outer acquire and an inner already-locked half is what
//! lets that happen without deadlocking on its own lock.

pub mod execute;
pub mod lifecycle;
pub mod status;
pub mod transfer;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::audit::{AuditAction, AuditEntry, AuditSink, NullAuditSink};
use crate::config::HostSpec;
use crate::transport::SshTransport;

/// The lifecycle states a connection moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

pub(crate) struct ConnectionInner<T: SshTransport> {
    pub(crate) state: ConnectionState,
    pub(crate) transport: Option<T>,
    pub(crate) last_used: Option<Instant>,
}

/// One host's connection, its state, and its live transport (if any).
pub struct Connection<T: SshTransport> {
    pub(crate) spec: Arc<HostSpec>,
    pub(crate) inner: Mutex<ConnectionInner<T>>,
    pub(crate) audit: Arc<dyn AuditSink>,
}

impl<T: SshTransport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl<T: SshTransport> Connection<T> {
    pub fn new(spec: Arc<HostSpec>) -> Self {
        Self::with_audit(spec, Arc::new(NullAuditSink))
    }

    pub fn with_audit(spec: Arc<HostSpec>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            spec,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                transport: None,
                last_used: None,
            }),
            audit,
        }
    }

    pub fn spec(&self) -> &HostSpec {
        &self.spec
    }

    pub(crate) fn record(&self, action: AuditAction, detail: impl Into<String>) {
        self.audit
            .record(AuditEntry::new(action, self.spec.name.clone(), detail));
    }
}
