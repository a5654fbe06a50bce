use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::config::EngineConfig;
use crate::error::{NavError, Result};
use crate::layer::TransitionParams;
use crate::logging::{LogLevel, Logger, current_ms, emit, json_kv};

use super::ContentController;
use super::message::{ContentMessage, MessageKind};

const TARGET: &str = "remote_focus::content";

/// Loading mechanics of the embedded content (an iframe, a webview, a child
/// process). The host only drives it and speaks the message protocol.
#[async_trait]
pub trait ContentFrame: Send + Sync {
    async fn load(&self, screen_id: &str, params: &TransitionParams) -> Result<()>;

    async fn unload(&self) -> Result<()>;

    fn post(&self, message: &ContentMessage) -> Result<()>;
}

#[derive(Default)]
struct HostInner {
    current: Option<String>,
    ready: bool,
    pending: Option<(String, oneshot::Sender<()>)>,
    theme: Map<String, Value>,
    last_data: Option<ContentMessage>,
}

/// Embedded-content host: opens and closes screens and validates the
/// messages coming back from them.
pub struct ContentHost {
    frame: Arc<dyn ContentFrame>,
    inner: Mutex<HostInner>,
    ready_timeout: Duration,
    allowed_origin: Option<String>,
    logger: Option<Logger>,
}

impl ContentHost {
    pub fn new(frame: Arc<dyn ContentFrame>, config: &EngineConfig) -> Self {
        Self {
            frame,
            inner: Mutex::new(HostInner::default()),
            ready_timeout: config.content_ready_timeout,
            allowed_origin: config.allowed_content_origin.clone(),
            logger: config.logger.clone(),
        }
    }

    /// Screen the host last started loading, ready or not.
    pub fn current_screen(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|inner| inner.current.clone())
    }

    /// Store the theme and forward it if content is ready.
    pub fn set_theme(&self, theme: Map<String, Value>) -> Result<()> {
        let ready = match self.inner.lock() {
            Ok(mut inner) => {
                inner.theme = theme.clone();
                inner.ready
            }
            Err(_) => false,
        };
        if ready {
            self.frame.post(&ContentMessage::Theme { theme })?;
        }
        Ok(())
    }

    /// Remember the latest payload and forward it if content is ready.
    pub fn push_data(&self, payload: Value) -> Result<()> {
        let message = ContentMessage::Data {
            payload,
            timestamp: current_ms() as u64,
        };
        let ready = match self.inner.lock() {
            Ok(mut inner) => {
                inner.last_data = Some(message.clone());
                inner.ready
            }
            Err(_) => false,
        };
        if ready {
            self.frame.post(&message)?;
        }
        Ok(())
    }

    /// Validate an inbound raw message. Returns `None` for anything dropped:
    /// malformed JSON, wrong origin, unknown kind, or a parent-only kind.
    pub fn receive(&self, raw: &str) -> Option<ContentMessage> {
        let envelope: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                self.dropped("malformed", [json_kv("error", err.to_string())]);
                return None;
            }
        };

        if let Some(expected) = self.allowed_origin.as_deref() {
            let origin = envelope.get("origin").and_then(Value::as_str);
            if origin != Some(expected) {
                self.dropped(
                    "origin_mismatch",
                    [json_kv("origin", origin.unwrap_or_default())],
                );
                return None;
            }
        }

        let tag = envelope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(kind) = MessageKind::from_tag(tag) else {
            self.dropped("unknown_kind", [json_kv("type", tag)]);
            return None;
        };
        if !kind.is_inbound() {
            self.dropped("wrong_direction", [json_kv("type", tag)]);
            return None;
        }

        let message: ContentMessage = match serde_json::from_value(envelope) {
            Ok(message) => message,
            Err(err) => {
                self.dropped("invalid_fields", [json_kv("error", err.to_string())]);
                return None;
            }
        };

        match &message {
            ContentMessage::Ready { screen_id } => self.acknowledge(screen_id.as_deref()),
            ContentMessage::Error { message } => emit(
                self.logger.as_ref(),
                LogLevel::Error,
                TARGET,
                "content_error",
                [
                    json_kv("message", message.as_str()),
                    json_kv("screen_id", self.current_screen().unwrap_or_default()),
                ],
            ),
            _ => {}
        }
        Some(message)
    }

    fn acknowledge(&self, screen_id: Option<&str>) {
        let pending = self.inner.lock().ok().and_then(|mut inner| {
            let matches = match (&inner.pending, screen_id) {
                (Some((pending_id, _)), Some(id)) => pending_id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if matches { inner.pending.take() } else { None }
        });
        match pending {
            Some((_, tx)) => {
                let _ = tx.send(());
            }
            None => emit(
                self.logger.as_ref(),
                LogLevel::Debug,
                TARGET,
                "ready_ignored",
                [json_kv("screen_id", screen_id.unwrap_or_default())],
            ),
        }
    }

    fn mark_ready(&self) -> Result<()> {
        let (theme, data) = match self.inner.lock() {
            Ok(mut inner) => {
                inner.ready = true;
                (inner.theme.clone(), inner.last_data.clone())
            }
            Err(_) => return Ok(()),
        };
        self.frame.post(&ContentMessage::Theme { theme })?;
        if let Some(data) = data {
            self.frame.post(&data)?;
        }
        Ok(())
    }

    fn dropped<I>(&self, reason: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut all = vec![json_kv("reason", reason)];
        all.extend(fields);
        emit(
            self.logger.as_ref(),
            LogLevel::Warn,
            TARGET,
            "message_dropped",
            all,
        );
    }
}

#[async_trait]
impl ContentController for ContentHost {
    async fn open_screen(&self, id: &str, params: &TransitionParams) -> Result<()> {
        if self.has_screen(id) {
            return Ok(());
        }
        if self.current_screen().is_some() {
            self.close_screen().await?;
        }

        let (tx, rx) = oneshot::channel();
        if let Ok(mut inner) = self.inner.lock() {
            inner.current = Some(id.to_string());
            inner.ready = false;
            inner.pending = Some((id.to_string(), tx));
        }

        if let Err(err) = self.frame.load(id, params).await {
            if let Ok(mut inner) = self.inner.lock() {
                inner.pending = None;
            }
            return Err(NavError::ContentLoad(format!("{id}: {err}")));
        }

        match tokio::time::timeout(self.ready_timeout, rx).await {
            Ok(Ok(())) => {
                emit(
                    self.logger.as_ref(),
                    LogLevel::Info,
                    TARGET,
                    "content_ready",
                    [json_kv("screen_id", id)],
                );
                self.mark_ready()
            }
            Ok(Err(_)) => Err(NavError::ContentLoad(format!("{id}: load superseded"))),
            Err(_) => {
                // Leave the half-loaded frame in place; the next open closes it.
                if let Ok(mut inner) = self.inner.lock() {
                    inner.pending = None;
                }
                Err(NavError::ContentTimeout {
                    screen_id: id.to_string(),
                    waited_ms: self.ready_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn close_screen(&self) -> Result<()> {
        let had_screen = match self.inner.lock() {
            Ok(mut inner) => {
                inner.pending = None;
                inner.ready = false;
                inner.current.take().is_some()
            }
            Err(_) => false,
        };
        if had_screen {
            self.frame.unload().await?;
        }
        Ok(())
    }

    fn has_screen(&self, id: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.ready && inner.current.as_deref() == Some(id))
            .unwrap_or(false)
    }
}
