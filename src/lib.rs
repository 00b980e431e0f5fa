//! # sshgate-core
//!
//! The SSH connection manager core for a remote-execution and file-transfer
//! gateway: a fixed set of pre-declared SSH targets, each reachable through
//! a single persistent, lazily-dialed [`connection::Connection`] managed by
//! a [`manager::Manager`].
//!
//! This crate owns the hard part — the per-host state machine, the
//! dual-stream `execute` algorithm that avoids the classic stdout/stderr
//! flow-control deadlock, the transfer operations with partial-state
//! cleanup, and the command allowlist — and nothing above it. A stdio-framed
//! JSON-RPC tool server, process entry point, and signal handling are
//! expected to be layered on top by the embedding binary; this crate
//! exposes the types and async methods that layer calls into.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshgate_core::config::load_config;
//! use sshgate_core::manager::Manager;
//! use sshgate_core::transport::RusshTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("hosts.json")?;
//!     let manager: Manager<RusshTransport> = Manager::new(config);
//!
//!     let conn = manager.get_connection("web-1").await?;
//!     let result = conn.execute("uptime").await?;
//!     println!("{}", result.stdout);
//!
//!     manager.disconnect_all().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Main components
//!
//! - [`config::HostSpec`] / [`config::ServerConfig`] — the per-host and
//!   server-level configuration consumed by the core.
//! - [`guard::CommandGuard`] — the per-host command allowlist and
//!   metacharacter filter, evaluated before the connection lock is taken.
//! - [`connection::Connection`] — one host's connection state machine,
//!   reentrant serialization, execute/upload/download/status.
//! - [`manager::Manager`] — the host registry: lazy construction, the host
//!   allowlist, bulk disconnect, and batched execution.
//! - [`transport::SshTransport`] — the abstract transport boundary; a
//!   production implementation ([`transport::RusshTransport`]) and a
//!   deterministic test double ([`transport::mock::MockTransport`], behind
//!   the `test-util` feature) both implement it.
//! - [`error::GatewayError`] — the unified error taxonomy.
//! - [`audit::AuditSink`] — the injected audit-trail hook.

pub mod audit;
pub mod config;
pub mod connection;
pub mod error;
pub mod guard;
pub mod manager;
pub mod result;
pub mod transport;
