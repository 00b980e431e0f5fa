//! The host registry: lazy construction, the host allowlist gate, and bulk
//! disconnect on shutdown.
//!
//! Lock-ordering rule: never hold the manager's own mutex while acquiring a
//! connection's lock. `list_hosts` and `disconnect_all` both snapshot the
//! map and release the manager lock before touching any `Connection`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::audit::{AuditSink, NullAuditSink};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::GatewayError;
use crate::result::{CommandResult, HostListEntry, StatusRecord, ConnectionStateName};
use crate::transport::SshTransport;

/// A registry mapping host name to `Connection`, generic over the
/// transport so it can be driven against [`crate::transport::mock::MockTransport`]
/// in tests and [`crate::transport::RusshTransport`] in production.
pub struct Manager<T: SshTransport> {
    config: Arc<ServerConfig>,
    connections: Mutex<HashMap<String, Arc<Connection<T>>>>,
    audit: Arc<dyn AuditSink>,
}

impl<T: SshTransport> Manager<T> {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_audit(config, Arc::new(NullAuditSink))
    }

    pub fn with_audit(config: ServerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config: Arc::new(config),
            connections: Mutex::new(HashMap::new()),
            audit,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Validates `name` against the host allowlist, then looks up or
    /// lazily constructs a `Connection` bound to its `HostSpec`. No network
    /// I/O happens here — only an explicit `connect()` or an implicit
    /// reconnect inside `execute`/`upload`/`download` dials.
    pub async fn get_connection(&self, name: &str) -> Result<Arc<Connection<T>>, GatewayError> {
        let spec = self.config.get_host(name)?;

        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(name) {
            log::debug!("'{name}': reusing cached connection");
            return Ok(existing.clone());
        }

        log::debug!("'{name}': no cached connection, creating one");
        let conn = Arc::new(Connection::with_audit(
            Arc::new(spec.clone()),
            self.audit.clone(),
        ));
        connections.insert(name.to_string(), conn.clone());
        Ok(conn)
    }

    /// Snapshots the connection map under the manager lock, releases it,
    /// then gathers a status row per *configured* host — hosts with no
    /// connection yet synthesize a `disconnected` row from config alone
    /// without constructing a `Connection`.
    pub async fn list_hosts(&self) -> Vec<HostListEntry> {
        let snapshot: HashMap<String, Arc<Connection<T>>> = {
            let connections = self.connections.lock().await;
            connections.clone()
        };

        let mut names: Vec<&String> = self.config.hosts.keys().collect();
        names.sort_unstable();

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let spec = &self.config.hosts[name];
            let status = match snapshot.get(name) {
                Some(conn) => conn.status().await,
                None => StatusRecord {
                    name: spec.name.clone(),
                    hostname: spec.hostname.clone(),
                    port: spec.port,
                    username: spec.username.clone(),
                    state: ConnectionStateName::Disconnected,
                    connected: false,
                    idle_seconds: None,
                },
            };
            entries.push(HostListEntry {
                status,
                has_key: spec.identity_file.is_some(),
                command_timeout: spec.command_timeout,
                allowed_commands: spec.allowed_commands.clone(),
            });
        }
        entries
    }

    /// Atomically snapshots and empties the connection map, then
    /// disconnects each outside the manager lock so one bad close cannot
    /// stop the rest.
    pub async fn disconnect_all(&self) {
        let snapshot: Vec<Arc<Connection<T>>> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, conn)| conn).collect()
        };

        for conn in snapshot {
            if let Err(err) = conn.disconnect().await {
                log::warn!("'{}': error during disconnect_all: {err}", conn.spec().name);
            }
        }
    }

    /// Runs each command against the same connection in order, collecting a
    /// per-command result so one failure doesn't abort the remaining
    /// commands. Commands still serialize through the connection's lock one
    /// at a time, in the order supplied.
    pub async fn execute_batch(
        &self,
        name: &str,
        commands: &[String],
    ) -> Result<Vec<Result<CommandResult, GatewayError>>, GatewayError> {
        let conn = self.get_connection(name).await?;
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            results.push(conn.execute(command).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::config::HostSpec;
    use crate::transport::mock::{self, MockTransport};

    use super::*;

    fn config_with_hosts(names: &[&str]) -> ServerConfig {
        let mut hosts = HashMap::new();
        for name in names {
            mock::register(name);
            hosts.insert(
                name.to_string(),
                HostSpec {
                    name: name.to_string(),
                    hostname: format!("{name}.example.com"),
                    username: "u".to_string(),
                    port: 22,
                    identity_file: None,
                    password: Some("p".to_string()),
                    auto_accept_host_key: false,
                    command_timeout: 30,
                    transfer_timeout: 120,
                    allowed_commands: None,
                },
            );
        }
        ServerConfig {
            hosts,
            log_level: "INFO".to_string(),
            audit_log_file: None,
        }
    }

    #[tokio::test]
    async fn get_connection_fails_for_unknown_host() {
        let manager: Manager<MockTransport> = Manager::new(config_with_hosts(&["h1"]));
        let err = manager.get_connection("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::HostNotAllowed { .. }));
    }

    #[tokio::test]
    async fn get_connection_returns_same_identity_on_repeat_calls() {
        let manager: Manager<MockTransport> = Manager::new(config_with_hosts(&["h1"]));
        let a = manager.get_connection("h1").await.unwrap();
        let b = manager.get_connection("h1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn list_hosts_before_any_call_shows_disconnected_without_constructing() {
        let manager: Manager<MockTransport> = Manager::new(config_with_hosts(&["h1", "h2"]));
        let entries = manager.list_hosts().await;
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.status.state, ConnectionStateName::Disconnected);
            assert!(!entry.status.connected);
        }
    }

    #[tokio::test]
    async fn disconnect_all_clears_every_connection() {
        let manager: Manager<MockTransport> = Manager::new(config_with_hosts(&["h1", "h2"]));
        manager.get_connection("h1").await.unwrap().connect().await.unwrap();
        manager.get_connection("h2").await.unwrap().connect().await.unwrap();

        manager.disconnect_all().await;

        for entry in manager.list_hosts().await {
            assert_eq!(entry.status.state, ConnectionStateName::Disconnected);
        }
    }

    #[tokio::test]
    async fn execute_batch_collects_per_command_results_without_aborting() {
        let state = mock::register("batch-host");
        state.set_command(
            "ok",
            mock::MockCommandSpec {
                stdout: b"fine\n".to_vec(),
                exit_code: 0,
                ..Default::default()
            },
        );
        // "bad" is left unscripted: MockTransport defaults to exit 0, empty
        // output, so we simulate a real per-command failure with a guard
        // rejection instead (no allowlist configured here means guard
        // admits everything; use a host-level allowlist for this check).
        let mut hosts = HashMap::new();
        hosts.insert(
            "batch-host".to_string(),
            HostSpec {
                name: "batch-host".to_string(),
                hostname: "batch.example.com".to_string(),
                username: "u".to_string(),
                port: 22,
                identity_file: None,
                password: Some("p".to_string()),
                auto_accept_host_key: false,
                command_timeout: 30,
                transfer_timeout: 120,
                allowed_commands: Some(vec!["ok".to_string()]),
            },
        );
        let manager: Manager<MockTransport> = Manager::new(ServerConfig {
            hosts,
            log_level: "INFO".to_string(),
            audit_log_file: None,
        });

        let commands = vec!["ok".to_string(), "bad".to_string()];
        let results = manager.execute_batch("batch-host", &commands).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(GatewayError::PermissionDenied(_))
        ));
    }
}
