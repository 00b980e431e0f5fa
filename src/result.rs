//! Stable, serializable result shapes observed by downstream JSON
//! serialization (a surrounding RPC layer, not owned by this crate).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of a single remote command execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Result of an upload or download.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TransferResult {
    pub success: bool,
    pub host: String,
    pub local_path: String,
    pub remote_path: String,
    pub bytes: u64,
}

/// One of the four connection-state names, lowercase, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStateName {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Atomic snapshot of one connection's identity and liveness.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusRecord {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub state: ConnectionStateName,
    pub connected: bool,
    pub idle_seconds: Option<f64>,
}

/// One row of `Manager::list_hosts`: a `StatusRecord` plus config-derived
/// fields that don't require a live connection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostListEntry {
    #[serde(flatten)]
    pub status: StatusRecord,
    pub has_key: bool,
    pub command_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_commands: Option<Vec<String>>,
}
