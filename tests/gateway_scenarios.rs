//! End-to-end scenarios against the public `Manager`/`Connection` surface,
//! exercised through `MockTransport` rather than a live SSH server.

use std::collections::HashMap;
use std::sync::Arc;

use sshgate_core::config::{HostSpec, ServerConfig};
use sshgate_core::error::GatewayError;
use sshgate_core::manager::Manager;
use sshgate_core::result::ConnectionStateName;
use sshgate_core::transport::mock::{self, MockCommandSpec, MockTransport};

fn host(name: &str, allowed_commands: Option<Vec<String>>) -> HostSpec {
    HostSpec {
        name: name.to_string(),
        hostname: format!("{name}.example.com"),
        username: "deploy".to_string(),
        port: 22,
        identity_file: None,
        password: Some("hunter2".to_string()),
        auto_accept_host_key: false,
        command_timeout: 30,
        transfer_timeout: 120,
        allowed_commands,
    }
}

fn manager_with(hosts: Vec<HostSpec>) -> Manager<MockTransport> {
    let mut map = HashMap::new();
    for h in hosts {
        mock::register(&h.name);
        map.insert(h.name.clone(), h);
    }
    Manager::new(ServerConfig {
        hosts: map,
        log_level: "INFO".to_string(),
        audit_log_file: None,
    })
}

#[tokio::test]
async fn lazy_construction_before_any_connect() {
    let manager = manager_with(vec![host("web-1", None), host("db-1", None)]);

    let entries = manager.list_hosts().await;
    assert_eq!(entries.len(), 2);
    assert!(
        entries
            .iter()
            .all(|e| e.status.state == ConnectionStateName::Disconnected)
    );

    let conn = manager.get_connection("web-1").await.unwrap();
    assert_eq!(conn.status().await.state, ConnectionStateName::Disconnected);
}

#[tokio::test]
async fn metacharacter_rejection_never_touches_the_transport() {
    let state = mock::register("gate-1");
    let manager = manager_with(vec![host("gate-1", Some(vec!["ls".to_string()]))]);

    let conn = manager.get_connection("gate-1").await.unwrap();
    let err = conn.execute("ls; whoami").await.unwrap_err();
    assert!(matches!(err, GatewayError::PermissionDenied(_)));
    assert_eq!(state.dial_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_executes_on_one_host_serialize() {
    let state = mock::register("busy-1");
    state.set_command(
        "whoami",
        MockCommandSpec {
            stdout: b"root\n".to_vec(),
            exit_code: 0,
            delay: Some(std::time::Duration::from_millis(30)),
            ..Default::default()
        },
    );
    let manager = Arc::new(manager_with(vec![host("busy-1", None)]));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let conn = manager.get_connection("busy-1").await.unwrap();
            conn.execute("whoami").await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for h in handles {
        results.push(h.await.unwrap());
    }
    results.sort_by_key(|r| r.started_at);

    for pair in results.windows(2) {
        assert!(
            pair[0].ended_at <= pair[1].started_at,
            "overlapping execute intervals: {:?} vs {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn disconnect_all_leaves_every_host_disconnected() {
    let manager = manager_with(vec![host("a", None), host("b", None)]);

    manager.get_connection("a").await.unwrap().connect().await.unwrap();
    manager.get_connection("b").await.unwrap().connect().await.unwrap();

    manager.disconnect_all().await;

    for entry in manager.list_hosts().await {
        assert_eq!(entry.status.state, ConnectionStateName::Disconnected);
        assert!(!entry.status.connected);
    }
}

#[tokio::test]
async fn execute_batch_runs_in_order_and_reports_per_command_outcome() {
    let state = mock::register("batch-1");
    state.set_command(
        "echo one",
        MockCommandSpec {
            stdout: b"one\n".to_vec(),
            exit_code: 0,
            ..Default::default()
        },
    );
    state.set_command(
        "echo two",
        MockCommandSpec {
            stdout: b"two\n".to_vec(),
            exit_code: 0,
            ..Default::default()
        },
    );
    let manager = manager_with(vec![host("batch-1", None)]);

    let commands = vec!["echo one".to_string(), "echo two".to_string()];
    let results = manager.execute_batch("batch-1", &commands).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().stdout, "one\n");
    assert_eq!(results[1].as_ref().unwrap().stdout, "two\n");
}

#[tokio::test]
async fn sticky_transport_error_forces_fresh_dial_on_next_call() {
    let state = mock::register("sticky-1");
    state.set_command(
        "first",
        MockCommandSpec {
            stdout: b"ok\n".to_vec(),
            kill_transport: true,
            ..Default::default()
        },
    );
    let manager = manager_with(vec![host("sticky-1", None)]);
    let conn = manager.get_connection("sticky-1").await.unwrap();

    let err = conn.execute("first").await.unwrap_err();
    assert!(matches!(err, GatewayError::TransportFailure { .. }));
    assert_eq!(conn.status().await.state, ConnectionStateName::Error);

    state.set_command(
        "second",
        MockCommandSpec {
            stdout: b"ok\n".to_vec(),
            exit_code: 0,
            ..Default::default()
        },
    );
    let result = conn.execute("second").await.unwrap();
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(state.dial_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}
