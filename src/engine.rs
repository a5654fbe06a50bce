//! Composition root.
//!
//! [`Engine`] wires one registry, focus store, coordinator, content host and
//! dispatcher together and installs [`LayerKeyRouter`] as the default key
//! handler. Hosts feed it raw keys, feed snapshots, content messages and
//! post-render item lists.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::content::{ContentFrame, ContentHost, ContentMessage};
use crate::error::{NavError, Result};
use crate::feed::{ActivityChange, ScreenRecord, active_screens, activity_change, dashboard_tiles};
use crate::focus::{FocusStateStore, RefreshOutcome};
use crate::input::{DefaultKeyHandler, InputDispatcher, KeyDisposition, RawKeyEvent};
use crate::layer::audit::{NullTransitionAudit, TransitionAudit};
use crate::layer::{ExitRequester, Layer, LayerCoordinator, LayerSurfaces, TransitionParams};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::metrics::MetricSnapshot;
use crate::navigation::{Direction, SpatialNavigator};
use crate::registry::{FocusableItem, ItemRegistry};

const TARGET: &str = "remote_focus::engine";

/// Map-layer controls driven by directional and volume keys.
#[async_trait]
pub trait MapControl: Send + Sync {
    async fn pan(&self, direction: Direction) -> Result<()>;

    async fn zoom_in(&self) -> Result<()>;

    async fn zoom_out(&self) -> Result<()>;
}

/// Default key behaviour, routed on the current layer.
pub struct LayerKeyRouter {
    coordinator: Arc<LayerCoordinator>,
    registry: Arc<ItemRegistry>,
    map: Arc<dyn MapControl>,
}

impl LayerKeyRouter {
    pub fn new(
        coordinator: Arc<LayerCoordinator>,
        registry: Arc<ItemRegistry>,
        map: Arc<dyn MapControl>,
    ) -> Self {
        Self {
            coordinator,
            registry,
            map,
        }
    }

    fn focused_screen(&self, layer: Layer) -> Option<String> {
        self.registry
            .focused(layer)
            .and_then(|focused| focused.facets.stable_id)
    }

    async fn open_detail(&self, screen_id: String) -> Result<()> {
        let pushed = self
            .coordinator
            .try_push_layer(Layer::Detail, TransitionParams::screen(screen_id))
            .await;
        accept_rejection(pushed)
    }
}

/// A key that asks for a transition the coordinator refuses (one already
/// running, or not adjacent) is simply ignored.
fn accept_rejection(result: Result<()>) -> Result<()> {
    match result {
        Err(
            NavError::TransitionInProgress
            | NavError::InvalidTransition { .. }
            | NavError::AlreadyCurrent(_),
        ) => Ok(()),
        other => other,
    }
}

#[async_trait]
impl DefaultKeyHandler for LayerKeyRouter {
    async fn on_direction(&self, direction: Direction) -> Result<()> {
        let layer = self.coordinator.current_layer();
        if layer == Layer::Map {
            return self.map.pan(direction).await;
        }

        let items = self.registry.focusables(layer);
        let next = match self.registry.focused_index(layer) {
            Some(current) => {
                SpatialNavigator::new(self.registry.columns(layer))
                    .move_focus(&items, current, direction)
            }
            // Nothing focused yet: the first press lands on the first item.
            None => (!items.is_empty()).then_some(0),
        };
        if let Some(index) = next {
            self.registry.focus_index(layer, index);
        }
        Ok(())
    }

    async fn on_confirm(&self) -> Result<()> {
        match self.coordinator.current_layer() {
            Layer::Map => accept_rejection(
                self.coordinator
                    .try_push_layer(Layer::Dashboard, TransitionParams::default())
                    .await,
            ),
            Layer::Dashboard => match self.focused_screen(Layer::Dashboard) {
                Some(screen_id) => self.open_detail(screen_id).await,
                None => Ok(()),
            },
            Layer::Detail => Ok(()),
        }
    }

    async fn on_back(&self) -> Result<()> {
        accept_rejection(self.coordinator.try_pop_layer().await.map(|_| ()))
    }

    async fn on_volume(&self, up: bool) -> Result<()> {
        if self.coordinator.current_layer() != Layer::Map {
            return Ok(());
        }
        if up {
            self.map.zoom_in().await
        } else {
            self.map.zoom_out().await
        }
    }

    async fn on_digit(&self, digit: u8) -> Result<()> {
        if self.coordinator.current_layer() != Layer::Dashboard {
            return Ok(());
        }
        let number = if digit == 0 { 10 } else { u32::from(digit) };
        let items = self.registry.focusables(Layer::Dashboard);
        let Some(index) = items
            .iter()
            .position(|item| item.facets.domain_key == Some(number))
        else {
            return Ok(());
        };
        if !self.registry.focus_index(Layer::Dashboard, index) {
            return Ok(());
        }
        match items[index].facets.stable_id.clone() {
            Some(screen_id) => self.open_detail(screen_id).await,
            None => Ok(()),
        }
    }
}

/// External collaborators handed to [`Engine::new`].
pub struct EngineParts {
    pub surfaces: LayerSurfaces,
    pub frame: Arc<dyn ContentFrame>,
    pub map: Arc<dyn MapControl>,
    pub exit: Arc<dyn ExitRequester>,
    pub audit: Option<Arc<dyn TransitionAudit>>,
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<ItemRegistry>,
    focus: Arc<FocusStateStore>,
    content: Arc<ContentHost>,
    coordinator: Arc<LayerCoordinator>,
    dispatcher: InputDispatcher,
    screens: Mutex<Vec<ScreenRecord>>,
    started: Instant,
    logger: Option<Logger>,
}

impl Engine {
    pub fn new(parts: EngineParts, config: EngineConfig) -> Self {
        let registry = Arc::new(ItemRegistry::new());
        let focus = Arc::new(FocusStateStore::new(registry.clone(), &config));
        let content = Arc::new(ContentHost::new(parts.frame, &config));
        let audit = parts
            .audit
            .unwrap_or_else(|| Arc::new(NullTransitionAudit));
        let coordinator = Arc::new(
            LayerCoordinator::new(
                parts.surfaces,
                focus.clone(),
                content.clone(),
                parts.exit,
                &config,
            )
            .with_audit(audit),
        );
        let dispatcher = InputDispatcher::new(&config);
        dispatcher.set_default_handler(Arc::new(LayerKeyRouter::new(
            coordinator.clone(),
            registry.clone(),
            parts.map,
        )));

        Self {
            logger: config.logger.clone(),
            config,
            registry,
            focus,
            content,
            coordinator,
            dispatcher,
            screens: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    pub fn focus(&self) -> &Arc<FocusStateStore> {
        &self.focus
    }

    pub fn content(&self) -> &Arc<ContentHost> {
        &self.content
    }

    pub fn coordinator(&self) -> &Arc<LayerCoordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &InputDispatcher {
        &self.dispatcher
    }

    pub fn current_layer(&self) -> Layer {
        self.coordinator.current_layer()
    }

    pub async fn handle_key(&self, raw: &RawKeyEvent) -> KeyDisposition {
        self.dispatcher.handle_raw(raw).await
    }

    /// Post-render hook: publish what a layer drew, then let the focus store
    /// recover from items that disappeared.
    pub fn publish_items(
        &self,
        layer: Layer,
        items: Vec<FocusableItem>,
        columns: usize,
    ) -> RefreshOutcome {
        self.registry.publish(layer, items, columns);
        self.focus.refresh(layer)
    }

    /// Apply a feed snapshot: redraw the dashboard and move between Map and
    /// Dashboard when the active set appears or empties.
    pub async fn apply_screens(&self, records: Vec<ScreenRecord>) -> Result<()> {
        let previous = match self.screens.lock() {
            Ok(mut screens) => std::mem::replace(&mut *screens, records.clone()),
            Err(_) => Vec::new(),
        };

        let active = active_screens(&records);
        let mut tiles = self
            .coordinator
            .surfaces()
            .dashboard
            .render(&active)
            .await?;
        if tiles.is_empty() {
            tiles = dashboard_tiles(&active);
        }
        let refreshed = self.publish_items(Layer::Dashboard, tiles, self.config.dashboard_columns);

        let change = activity_change(&previous, &records);
        emit(
            self.logger.as_ref(),
            LogLevel::Info,
            TARGET,
            "screens_applied",
            [
                json_kv("active", active.len()),
                json_kv("change", format!("{change:?}")),
                json_kv("refresh", format!("{refreshed:?}")),
            ],
        );

        match change {
            ActivityChange::BecameActive if self.current_layer() == Layer::Map => {
                self.coordinator
                    .try_push_layer(Layer::Dashboard, TransitionParams::default())
                    .await
            }
            ActivityChange::BecameIdle => {
                while self.current_layer() != Layer::Map {
                    if !self.coordinator.try_pop_layer().await? {
                        break;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Validate and route one inbound content message. Returns the accepted
    /// message, or `None` when it was dropped.
    pub async fn handle_content_message(&self, raw: &str) -> Option<ContentMessage> {
        let message = self.content.receive(raw)?;
        if message == ContentMessage::Back && self.current_layer() == Layer::Detail {
            self.coordinator.pop_layer().await;
        }
        Some(message)
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.config.metrics.as_ref()?;
        let guard = metrics.lock().ok()?;
        Some(guard.snapshot(self.started.elapsed()))
    }

    /// Write a metrics snapshot through the logger, if both are configured.
    pub fn emit_metrics(&self) -> Result<()> {
        let (Some(logger), Some(snapshot)) = (self.logger.as_ref(), self.metrics_snapshot()) else {
            return Ok(());
        };
        logger.log_event(snapshot.to_log_event(TARGET))?;
        Ok(())
    }
}
