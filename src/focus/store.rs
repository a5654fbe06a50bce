use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::config::EngineConfig;
use crate::layer::Layer;
use crate::logging::{LogLevel, Logger, current_ms, emit, json_kv};
use crate::metrics::{SharedMetrics, with_metrics};
use crate::registry::{FocusableItem, ItemFacets, ItemRegistry, LayerMetadata, ScrollOffset};

const TARGET: &str = "remote_focus::focus";

/// Last known focus of a layer, captured when the user left it.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusState {
    pub layer: Layer,
    pub facets: ItemFacets,
    pub scroll_offset: ScrollOffset,
    pub timestamp_ms: u128,
    pub metadata: LayerMetadata,
}

/// Which step of the restoration chain located the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStrategy {
    DomainKey,
    StableId,
    Ordinal,
    FirstItem,
}

impl RestoreStrategy {
    fn name(self) -> &'static str {
        match self {
            Self::DomainKey => "domain_key",
            Self::StableId => "stable_id",
            Self::Ordinal => "ordinal",
            Self::FirstItem => "first_item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing was focused on the layer; nothing to do.
    Untracked,
    /// The focused item survived the rebuild; focus and scroll untouched.
    Retained,
    /// The focused item vanished and another one was focused.
    Restored(RestoreStrategy),
    /// The layer has no focusable items left; focus reference dropped.
    Cleared,
}

#[derive(Default)]
struct StoreInner {
    states: HashMap<Layer, FocusState>,
    history: VecDeque<FocusState>,
}

/// Sole owner of saved focus states. Reads and moves focus through the
/// shared [`ItemRegistry`].
pub struct FocusStateStore {
    registry: Arc<ItemRegistry>,
    inner: Mutex<StoreInner>,
    history_cap: usize,
    logger: Option<Logger>,
    metrics: Option<SharedMetrics>,
}

impl FocusStateStore {
    pub fn new(registry: Arc<ItemRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            inner: Mutex::new(StoreInner::default()),
            history_cap: config.focus_history_cap.max(1),
            logger: config.logger.clone(),
            metrics: config.metrics_handle(),
        }
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.registry
    }

    /// Capture the focused item of `layer`. Returns `false` (and forgets any
    /// older state) when nothing is focused.
    pub fn save(&self, layer: Layer) -> bool {
        let Some(focused) = self.registry.focused(layer) else {
            self.clear(layer);
            return false;
        };

        let state = FocusState {
            layer,
            facets: focused.facets,
            scroll_offset: self.registry.scroll_offset(layer),
            timestamp_ms: current_ms(),
            metadata: self.registry.metadata(layer),
        };

        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "focus_saved",
            [
                json_kv("layer", layer.name()),
                json_kv("domain_key", json!(state.facets.domain_key)),
                json_kv("stable_id", json!(state.facets.stable_id)),
                json_kv("ordinal", state.facets.ordinal),
            ],
        );

        if let Ok(mut inner) = self.inner.lock() {
            inner.history.push_back(state.clone());
            while inner.history.len() > self.history_cap {
                inner.history.pop_front();
            }
            inner.states.insert(layer, state);
        }
        true
    }

    /// Put focus back where it was when `layer` was saved, degrading through
    /// domain key, stable id, ordinal, and finally the first item.
    pub fn restore(&self, layer: Layer) -> bool {
        let saved = self.state(layer);
        let items = self.registry.focusables(layer);

        let located = saved
            .as_ref()
            .and_then(|state| locate(&items, &state.facets))
            .or_else(|| (!items.is_empty()).then_some((0, RestoreStrategy::FirstItem)));

        let Some((index, strategy)) = located else {
            emit(
                self.logger.as_ref(),
                LogLevel::Debug,
                TARGET,
                "restore_no_items",
                [json_kv("layer", layer.name())],
            );
            return false;
        };

        if !self.registry.focus_index(layer, index) {
            return false;
        }

        if let Some(state) = saved.as_ref() {
            if self.registry.is_scrollable(layer) {
                self.registry.set_scroll_offset(layer, state.scroll_offset);
            }
        }

        with_metrics(self.metrics.as_ref(), |m| m.record_focus_restore());
        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "focus_restored",
            [
                json_kv("layer", layer.name()),
                json_kv("strategy", strategy.name()),
                json_kv("index", index),
            ],
        );
        true
    }

    /// Focus the first focusable item of `layer`, used for forward navigation.
    pub fn focus_first(&self, layer: Layer) -> bool {
        self.registry.focus_index(layer, 0)
    }

    pub fn clear(&self, layer: Layer) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.states.remove(&layer);
        }
    }

    /// Post-render hook: keep focus if its item survived under the same
    /// identity, otherwise recover.
    pub fn refresh(&self, layer: Layer) -> RefreshOutcome {
        let Some(focused) = self.registry.focused(layer) else {
            return RefreshOutcome::Untracked;
        };
        if self.registry.revalidate_focus(layer) {
            return RefreshOutcome::Retained;
        }

        let items = self.registry.focusables(layer);
        let saved = self.state(layer);
        let located = locate(&items, &focused.facets)
            .or_else(|| saved.as_ref().and_then(|state| locate(&items, &state.facets)))
            .or_else(|| (!items.is_empty()).then_some((0, RestoreStrategy::FirstItem)));

        let outcome = match located {
            Some((index, strategy)) if self.registry.focus_index(layer, index) => {
                RefreshOutcome::Restored(strategy)
            }
            _ => {
                self.registry.clear_focus(layer);
                RefreshOutcome::Cleared
            }
        };

        emit(
            self.logger.as_ref(),
            LogLevel::Debug,
            TARGET,
            "focus_refreshed",
            [
                json_kv("layer", layer.name()),
                json_kv("outcome", format!("{outcome:?}")),
            ],
        );
        outcome
    }

    pub fn state(&self, layer: Layer) -> Option<FocusState> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.states.get(&layer).cloned())
    }

    /// Saved states, oldest first.
    pub fn history(&self) -> Vec<FocusState> {
        self.inner
            .lock()
            .map(|inner| inner.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Find a live item matching `facets`. Every step only considers items that
/// are currently published and visible.
fn locate(items: &[FocusableItem], facets: &ItemFacets) -> Option<(usize, RestoreStrategy)> {
    if let Some(key) = facets.domain_key {
        if let Some(idx) = items.iter().position(|i| i.facets.domain_key == Some(key)) {
            return Some((idx, RestoreStrategy::DomainKey));
        }
    }
    if let Some(id) = facets.stable_id.as_deref() {
        if let Some(idx) = items
            .iter()
            .position(|i| i.facets.stable_id.as_deref() == Some(id))
        {
            return Some((idx, RestoreStrategy::StableId));
        }
    }
    (facets.ordinal < items.len()).then_some((facets.ordinal, RestoreStrategy::Ordinal))
}
