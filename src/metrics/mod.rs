use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared handle stored in [`crate::EngineConfig`].
pub type SharedMetrics = Arc<Mutex<NavigationMetrics>>;

#[derive(Debug, Default, Clone)]
pub struct NavigationMetrics {
    keys_received: u64,
    keys_dispatched: u64,
    keys_dropped: u64,
    handler_failures: u64,
    transitions_completed: u64,
    transitions_failed: u64,
    focus_restores: u64,
}

impl NavigationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_key(&mut self) {
        self.keys_received = self.keys_received.saturating_add(1);
    }

    pub fn record_dispatch(&mut self) {
        self.keys_dispatched = self.keys_dispatched.saturating_add(1);
    }

    pub fn record_drop(&mut self) {
        self.keys_dropped = self.keys_dropped.saturating_add(1);
    }

    pub fn record_handler_failure(&mut self) {
        self.handler_failures = self.handler_failures.saturating_add(1);
    }

    pub fn record_transition(&mut self, succeeded: bool) {
        if succeeded {
            self.transitions_completed = self.transitions_completed.saturating_add(1);
        } else {
            self.transitions_failed = self.transitions_failed.saturating_add(1);
        }
    }

    pub fn record_focus_restore(&mut self) {
        self.focus_restores = self.focus_restores.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            keys_received: self.keys_received,
            keys_dispatched: self.keys_dispatched,
            keys_dropped: self.keys_dropped,
            handler_failures: self.handler_failures,
            transitions_completed: self.transitions_completed,
            transitions_failed: self.transitions_failed,
            focus_restores: self.focus_restores,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub keys_received: u64,
    pub keys_dispatched: u64,
    pub keys_dropped: u64,
    pub handler_failures: u64,
    pub transitions_completed: u64,
    pub transitions_failed: u64,
    pub focus_restores: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "navigation_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("keys_received".to_string(), json!(self.keys_received));
        map.insert("keys_dispatched".to_string(), json!(self.keys_dispatched));
        map.insert("keys_dropped".to_string(), json!(self.keys_dropped));
        map.insert("handler_failures".to_string(), json!(self.handler_failures));
        map.insert(
            "transitions_completed".to_string(),
            json!(self.transitions_completed),
        );
        map.insert(
            "transitions_failed".to_string(),
            json!(self.transitions_failed),
        );
        map.insert("focus_restores".to_string(), json!(self.focus_restores));
        map
    }
}

/// Apply `f` to the shared accumulator if metrics are enabled.
pub(crate) fn with_metrics(metrics: Option<&SharedMetrics>, f: impl FnOnce(&mut NavigationMetrics)) {
    if let Some(metrics) = metrics {
        if let Ok(mut guard) = metrics.lock() {
            f(&mut guard);
        }
    }
}
