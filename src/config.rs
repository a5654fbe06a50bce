use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;

use crate::Result;
use crate::logging::Logger;
use crate::metrics::{NavigationMetrics, SharedMetrics};

/// Configuration knobs for the navigation engine.
#[derive(Clone)]
pub struct EngineConfig {
    /// Window after a handled key during which further input is dropped.
    pub debounce: Duration,
    /// Upper bound on waiting for a layer surface to finish hiding.
    pub hide_timeout: Duration,
    /// Upper bound on waiting for a layer surface to finish showing.
    pub show_timeout: Duration,
    /// Watchdog for embedded content to acknowledge with `Ready`.
    pub content_ready_timeout: Duration,
    /// Number of saved focus states kept in the store history.
    pub focus_history_cap: usize,
    /// Column count used when the dashboard publishes its tiles.
    pub dashboard_columns: usize,
    /// Expected `origin` of inbound content messages. `None` accepts any origin.
    pub allowed_content_origin: Option<String>,
    /// Optional structured logger shared by every component.
    pub logger: Option<Logger>,
    /// Metrics accumulator. `None` disables collection.
    pub metrics: Option<SharedMetrics>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            hide_timeout: Duration::from_millis(400),
            show_timeout: Duration::from_millis(400),
            content_ready_timeout: Duration::from_secs(10),
            focus_history_cap: 50,
            dashboard_columns: 4,
            allowed_content_origin: None,
            logger: None,
            metrics: None,
        }
    }
}

/// Serializable subset of [`EngineConfig`]. Durations are milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct EngineSettings {
    debounce_ms: Option<u64>,
    hide_timeout_ms: Option<u64>,
    show_timeout_ms: Option<u64>,
    content_ready_timeout_ms: Option<u64>,
    focus_history_cap: Option<usize>,
    dashboard_columns: Option<usize>,
    allowed_content_origin: Option<String>,
}

impl EngineConfig {
    /// Build a config from a JSON document; missing keys keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let settings: EngineSettings = serde_json::from_str(raw)?;
        let mut config = Self::default();
        if let Some(ms) = settings.debounce_ms {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = settings.hide_timeout_ms {
            config.hide_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = settings.show_timeout_ms {
            config.show_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = settings.content_ready_timeout_ms {
            config.content_ready_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = settings.focus_history_cap {
            config.focus_history_cap = cap.max(1);
        }
        if let Some(columns) = settings.dashboard_columns {
            config.dashboard_columns = columns.max(1);
        }
        config.allowed_content_origin = settings.allowed_content_origin;
        Ok(config)
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(NavigationMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<SharedMetrics> {
        self.metrics.as_ref().map(Arc::clone)
    }
}
