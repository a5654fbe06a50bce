//! Transition audit hooks.
//!
//! The coordinator reports every step of a layer transition to a
//! [`TransitionAudit`] sink. Records carry the stage plus structured details
//! so callers can log, buffer, or visualize transitions without touching the
//! coordinator itself.

use std::sync::Mutex;
use std::time::SystemTime;

use serde_json::Value;

use super::{Layer, TransitionState};

/// Structured audit entry.
#[derive(Debug, Clone)]
pub struct TransitionAuditEvent {
    pub timestamp: SystemTime,
    pub stage: TransitionState,
    pub from: Layer,
    pub to: Layer,
    pub details: Vec<(String, Value)>,
}

/// Builder helper to append fields ergonomically.
pub struct TransitionAuditEventBuilder {
    event: TransitionAuditEvent,
}

impl TransitionAuditEventBuilder {
    pub fn new(stage: TransitionState, from: Layer, to: Layer) -> Self {
        Self {
            event: TransitionAuditEvent {
                timestamp: SystemTime::now(),
                stage,
                from,
                to,
                details: Vec::new(),
            },
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> TransitionAuditEvent {
        self.event
    }
}

/// Trait implemented by any audit sink.
pub trait TransitionAudit: Send + Sync {
    fn record(&self, event: TransitionAuditEvent);
}

/// Default no-op implementation used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullTransitionAudit;

impl TransitionAudit for NullTransitionAudit {
    fn record(&self, _event: TransitionAuditEvent) {}
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<TransitionAuditEvent>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionAuditEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<TransitionState> {
        self.events().into_iter().map(|e| e.stage).collect()
    }
}

impl TransitionAudit for RecordingAudit {
    fn record(&self, event: TransitionAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
