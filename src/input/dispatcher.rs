use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::metrics::{SharedMetrics, with_metrics};
use crate::navigation::Direction;

use super::keys::{KeyEvent, LogicalKey, RawKeyEvent, normalize};

const TARGET: &str = "remote_focus::dispatcher";

/// Lookup key for an override handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBinding {
    Logical(LogicalKey),
    Code(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOutcome {
    /// Stop processing; the default handler is skipped.
    Handled,
    /// Fall through to the next override or the default handler.
    Continue,
}

#[async_trait]
pub trait KeyOverride: Send + Sync {
    async fn handle(&self, event: &KeyEvent) -> Result<OverrideOutcome>;
}

/// Default behaviour for keys that no override consumed.
#[async_trait]
pub trait DefaultKeyHandler: Send + Sync {
    async fn on_direction(&self, direction: Direction) -> Result<()>;

    async fn on_confirm(&self) -> Result<()>;

    async fn on_back(&self) -> Result<()>;

    /// Volume pair, used as zoom on the map.
    async fn on_volume(&self, up: bool) -> Result<()>;

    async fn on_digit(&self, digit: u8) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Disabled,
    /// Dropped because a handler is running or the debounce window is open.
    Busy,
    /// Nothing was registered for the key.
    Unhandled,
    Overridden,
    Handled,
    /// A handler returned an error; it was logged and swallowed.
    Failed,
}

/// What happened to one key, and whether the platform default action must
/// be suppressed for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDisposition {
    pub key: LogicalKey,
    pub prevent_default: bool,
    pub outcome: DispatchOutcome,
}

#[derive(Debug)]
struct DispatchState {
    enabled: bool,
    processing: bool,
    busy_until: Option<Instant>,
}

impl DispatchState {
    fn is_busy(&self, now: Instant) -> bool {
        self.processing || self.busy_until.is_some_and(|until| now < until)
    }
}

/// Ends the processing phase and opens the debounce window, whether the
/// handler succeeded, failed, or its future was dropped.
struct BusyGuard<'a> {
    state: &'a Mutex<DispatchState>,
    debounce: Duration,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.processing = false;
            state.busy_until = Some(Instant::now() + self.debounce);
        }
    }
}

enum Route {
    Overrides(Vec<Arc<dyn KeyOverride>>, Option<Arc<dyn DefaultKeyHandler>>),
    Default(Arc<dyn DefaultKeyHandler>),
}

/// Entry point for every key. Drops input while a handler runs and for a
/// debounce window afterwards instead of queueing it.
pub struct InputDispatcher {
    state: Mutex<DispatchState>,
    overrides: RwLock<HashMap<KeyBinding, Arc<dyn KeyOverride>>>,
    default_handler: RwLock<Option<Arc<dyn DefaultKeyHandler>>>,
    debounce: Duration,
    logger: Option<Logger>,
    metrics: Option<SharedMetrics>,
}

impl InputDispatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                enabled: true,
                processing: false,
                busy_until: None,
            }),
            overrides: RwLock::new(HashMap::new()),
            default_handler: RwLock::new(None),
            debounce: config.debounce,
            logger: config.logger.clone(),
            metrics: config.metrics_handle(),
        }
    }

    pub fn set_default_handler(&self, handler: Arc<dyn DefaultKeyHandler>) {
        if let Ok(mut slot) = self.default_handler.write() {
            *slot = Some(handler);
        }
    }

    /// Install an override, returning the one it replaced.
    pub fn register_override(
        &self,
        binding: KeyBinding,
        handler: Arc<dyn KeyOverride>,
    ) -> Option<Arc<dyn KeyOverride>> {
        self.overrides
            .write()
            .ok()
            .and_then(|mut map| map.insert(binding, handler))
    }

    pub fn unregister_override(&self, binding: KeyBinding) -> bool {
        self.overrides
            .write()
            .map(|mut map| map.remove(&binding).is_some())
            .unwrap_or(false)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.enabled = enabled;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().map(|s| s.enabled).unwrap_or(false)
    }

    pub fn is_busy(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.is_busy(Instant::now()))
            .unwrap_or(true)
    }

    /// Normalize a platform key and dispatch it.
    pub async fn handle_raw(&self, raw: &RawKeyEvent) -> KeyDisposition {
        self.dispatch(&normalize(raw)).await
    }

    pub async fn dispatch(&self, event: &KeyEvent) -> KeyDisposition {
        let key = event.logical_key;
        with_metrics(self.metrics.as_ref(), |m| m.record_key());

        // Back must never reach the platform, even when the key is dropped.
        let mut disposition = KeyDisposition {
            key,
            prevent_default: key == LogicalKey::Back,
            outcome: DispatchOutcome::Unhandled,
        };

        let route = self.route(event);

        // Admission and the busy flag are decided under one lock.
        let rejected = match self.state.lock() {
            Ok(state) if !state.enabled => Some(DispatchOutcome::Disabled),
            Ok(state) if state.is_busy(Instant::now()) => Some(DispatchOutcome::Busy),
            Ok(mut state) => {
                state.processing = route.is_some();
                None
            }
            Err(_) => Some(DispatchOutcome::Busy),
        };
        if let Some(outcome) = rejected {
            return self.dropped(disposition, outcome, event);
        }

        if key.is_navigation() {
            disposition.prevent_default = true;
        }

        let Some(route) = route else {
            emit(
                self.logger.as_ref(),
                LogLevel::Trace,
                TARGET,
                "key_unhandled",
                [json_kv("key", key.name()), json_kv("code", event.code)],
            );
            return disposition;
        };

        let _guard = BusyGuard {
            state: &self.state,
            debounce: self.debounce,
        };
        with_metrics(self.metrics.as_ref(), |m| m.record_dispatch());

        let result = match route {
            Route::Overrides(handlers, fallback) => {
                self.run_overrides(event, handlers, fallback).await
            }
            Route::Default(handler) => run_default(handler.as_ref(), key)
                .await
                .map(|()| DispatchOutcome::Handled),
        };

        disposition.outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                with_metrics(self.metrics.as_ref(), |m| m.record_handler_failure());
                emit(
                    self.logger.as_ref(),
                    LogLevel::Error,
                    TARGET,
                    "handler_failed",
                    [json_kv("key", key.name()), json_kv("error", err.to_string())],
                );
                DispatchOutcome::Failed
            }
        };
        disposition
    }

    /// Snapshot the handlers for `event` so no lock is held while they run.
    fn route(&self, event: &KeyEvent) -> Option<Route> {
        let overrides: Vec<Arc<dyn KeyOverride>> = self
            .overrides
            .read()
            .map(|map| {
                [
                    KeyBinding::Logical(event.logical_key),
                    KeyBinding::Code(event.code),
                ]
                .iter()
                .filter_map(|binding| map.get(binding).cloned())
                .collect()
            })
            .unwrap_or_default();

        let fallback = if event.logical_key == LogicalKey::Unidentified {
            None
        } else {
            self.default_handler
                .read()
                .ok()
                .and_then(|slot| slot.clone())
        };

        match (overrides.is_empty(), fallback) {
            (false, fallback) => Some(Route::Overrides(overrides, fallback)),
            (true, Some(handler)) => Some(Route::Default(handler)),
            (true, None) => None,
        }
    }

    async fn run_overrides(
        &self,
        event: &KeyEvent,
        handlers: Vec<Arc<dyn KeyOverride>>,
        fallback: Option<Arc<dyn DefaultKeyHandler>>,
    ) -> Result<DispatchOutcome> {
        for handler in handlers {
            if handler.handle(event).await? == OverrideOutcome::Handled {
                return Ok(DispatchOutcome::Overridden);
            }
        }
        match fallback {
            Some(handler) => {
                run_default(handler.as_ref(), event.logical_key).await?;
                Ok(DispatchOutcome::Handled)
            }
            None => Ok(DispatchOutcome::Unhandled),
        }
    }

    fn dropped(
        &self,
        mut disposition: KeyDisposition,
        outcome: DispatchOutcome,
        event: &KeyEvent,
    ) -> KeyDisposition {
        with_metrics(self.metrics.as_ref(), |m| m.record_drop());
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "key_dropped",
            [
                json_kv("key", event.logical_key.name()),
                json_kv(
                    "reason",
                    match outcome {
                        DispatchOutcome::Disabled => "disabled",
                        _ => "busy",
                    },
                ),
            ],
        );
        disposition.outcome = outcome;
        disposition
    }
}

async fn run_default(handler: &dyn DefaultKeyHandler, key: LogicalKey) -> Result<()> {
    match key {
        LogicalKey::Up => handler.on_direction(Direction::Up).await,
        LogicalKey::Down => handler.on_direction(Direction::Down).await,
        LogicalKey::Left => handler.on_direction(Direction::Left).await,
        LogicalKey::Right => handler.on_direction(Direction::Right).await,
        LogicalKey::Confirm => handler.on_confirm().await,
        LogicalKey::Back => handler.on_back().await,
        LogicalKey::VolumeUp => handler.on_volume(true).await,
        LogicalKey::VolumeDown => handler.on_volume(false).await,
        LogicalKey::Unidentified => Ok(()),
        digit => match digit.digit() {
            Some(value) => handler.on_digit(value).await,
            None => Ok(()),
        },
    }
}
