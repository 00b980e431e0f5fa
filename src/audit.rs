//! Injected audit hook.
//!
//! The core emits an [`AuditEntry`] after every state-changing operation but
//! owns no sink of its own — writing it to a file, a log stream, or dropping
//! it on the floor is the embedding layer's decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DETAIL_MAX_LEN: usize = 500;

/// A structured audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub host: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Connect,
    Disconnect,
    Execute,
    Upload,
    Download,
}

impl AuditEntry {
    pub fn new(action: AuditAction, host: impl Into<String>, detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.chars().count() > DETAIL_MAX_LEN {
            detail = detail.chars().take(DETAIL_MAX_LEN).collect();
        }
        Self {
            timestamp: Utc::now(),
            action,
            host: host.into(),
            detail,
        }
    }
}

/// An externally owned observer of audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Discards every entry. The default when no sink is configured.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// Adapts a plain closure into an [`AuditSink`].
pub struct FnAuditSink<F>(pub F)
where
    F: Fn(AuditEntry) + Send + Sync;

impl<F> AuditSink for FnAuditSink<F>
where
    F: Fn(AuditEntry) + Send + Sync,
{
    fn record(&self, entry: AuditEntry) {
        (self.0)(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn truncates_long_detail() {
        let entry = AuditEntry::new(AuditAction::Execute, "h1", "x".repeat(1000));
        assert_eq!(entry.detail.len(), DETAIL_MAX_LEN);
    }

    #[test]
    fn truncates_multibyte_detail_on_a_char_boundary() {
        let entry = AuditEntry::new(AuditAction::Execute, "h1", "中".repeat(1000));
        assert_eq!(entry.detail.chars().count(), DETAIL_MAX_LEN);
    }

    #[test]
    fn fn_sink_forwards_entries() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink = FnAuditSink(move |e: AuditEntry| seen2.lock().unwrap().push(e.action));
        sink.record(AuditEntry::new(AuditAction::Connect, "h1", ""));
        assert_eq!(seen.lock().unwrap().as_slice(), &[AuditAction::Connect]);
    }
}
