//! `status` — an atomic snapshot of one connection's identity and liveness,
//! taken in a single lock acquisition so state and idle time never tear.

use crate::result::{ConnectionStateName, StatusRecord};
use crate::transport::SshTransport;

use super::{Connection, ConnectionState};

impl From<ConnectionState> for ConnectionStateName {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => ConnectionStateName::Disconnected,
            ConnectionState::Connecting => ConnectionStateName::Connecting,
            ConnectionState::Connected => ConnectionStateName::Connected,
            ConnectionState::Error => ConnectionStateName::Error,
        }
    }
}

impl<T: SshTransport> Connection<T> {
    /// One locked read producing a self-consistent `{state, connected}`
    /// pair (P10) — never derived from two separate lock acquisitions.
    pub async fn status(&self) -> StatusRecord {
        let inner = self.inner.lock().await;
        let connected = inner.state == ConnectionState::Connected;
        StatusRecord {
            name: self.spec.name.clone(),
            hostname: self.spec.hostname.clone(),
            port: self.spec.port,
            username: self.spec.username.clone(),
            state: inner.state.into(),
            connected,
            idle_seconds: inner.last_used.map(|t| t.elapsed().as_secs_f64()),
        }
    }
}
