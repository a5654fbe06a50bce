use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use blake3::Hash;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layer::Layer;
use crate::navigation::Direction;

/// Opaque identity the rendering surface assigns to an item it drew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemHandle(pub u64);

impl ItemHandle {
    /// Handle derived from a stable id, so the same record keeps its handle
    /// wherever it lands in a re-rendered list.
    pub fn for_stable_id(id: &str) -> Self {
        let digest = blake3::hash(id.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_le_bytes(head))
    }
}

/// Explicit neighbor for one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborRef {
    /// Index into the layer's focusable list.
    Index(usize),
    /// Sibling carrying this domain key (screen number).
    DomainKey(u32),
    /// Nothing in this direction; the request is ignored.
    Blocked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborAnnotations {
    pub up: Option<NeighborRef>,
    pub down: Option<NeighborRef>,
    pub left: Option<NeighborRef>,
    pub right: Option<NeighborRef>,
}

impl NeighborAnnotations {
    pub fn get(&self, direction: Direction) -> Option<NeighborRef> {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn with(mut self, direction: Direction, neighbor: NeighborRef) -> Self {
        let slot = match direction {
            Direction::Up => &mut self.up,
            Direction::Down => &mut self.down,
            Direction::Left => &mut self.left,
            Direction::Right => &mut self.right,
        };
        *slot = Some(neighbor);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

/// The ways an item can be found again after the registry was rebuilt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFacets {
    pub stable_id: Option<String>,
    pub domain_key: Option<u32>,
    /// Position among the visible items in published order. Assigned by the
    /// registry.
    pub ordinal: usize,
    pub position: Option<GridPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusableItem {
    pub handle: ItemHandle,
    pub facets: ItemFacets,
    pub neighbors: NeighborAnnotations,
    pub visible: bool,
}

impl FocusableItem {
    pub fn new(handle: u64) -> Self {
        Self {
            handle: ItemHandle(handle),
            facets: ItemFacets::default(),
            neighbors: NeighborAnnotations::default(),
            visible: true,
        }
    }

    pub fn with_stable_id(mut self, id: impl Into<String>) -> Self {
        self.facets.stable_id = Some(id.into());
        self
    }

    pub fn with_domain_key(mut self, key: u32) -> Self {
        self.facets.domain_key = Some(key);
        self
    }

    pub fn with_position(mut self, row: usize, col: usize) -> Self {
        self.facets.position = Some(GridPosition { row, col });
        self
    }

    pub fn with_neighbor(mut self, direction: Direction, neighbor: NeighborRef) -> Self {
        self.neighbors = self.neighbors.with(direction, neighbor);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Snapshot of the focused item, kept so its facets survive its removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedItem {
    pub handle: ItemHandle,
    pub facets: ItemFacets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub top: u32,
    pub left: u32,
}

impl ScrollOffset {
    pub fn new(top: u32, left: u32) -> Self {
        Self { top, left }
    }
}

/// Free-form per-layer state (map center, zoom, selected tab) captured with focus.
pub type LayerMetadata = Map<String, Value>;

/// Receives focus changes so surfaces can paint the highlight.
pub trait FocusListener: Send + Sync {
    fn on_focus_changed(&self, layer: Layer, focused: Option<&FocusedItem>);
}

#[derive(Debug, Default)]
struct LayerItems {
    items: Vec<FocusableItem>,
    fingerprint: Option<Hash>,
    columns: usize,
    focused: Option<FocusedItem>,
    scroll: ScrollOffset,
    scrollable: bool,
    metadata: LayerMetadata,
}

impl LayerItems {
    fn focusables(&self) -> impl Iterator<Item = &FocusableItem> {
        self.items.iter().filter(|item| item.visible)
    }
}

/// Per-layer collection of focusable items, published by each surface after
/// it renders. The navigation engine reads items from here and never walks a
/// rendering tree itself.
#[derive(Default)]
pub struct ItemRegistry {
    layers: RwLock<HashMap<Layer, LayerItems>>,
    listeners: RwLock<Vec<Arc<dyn FocusListener>>>,
}

fn fingerprint(items: &[FocusableItem]) -> Option<Hash> {
    serde_json::to_vec(items)
        .ok()
        .map(|bytes| blake3::hash(&bytes))
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the item set for `layer`. Returns `false` when the new set is
    /// identical to the previous one. Focus is left untouched; callers follow
    /// up with [`crate::FocusStateStore::refresh`].
    pub fn publish(&self, layer: Layer, mut items: Vec<FocusableItem>, columns: usize) -> bool {
        let mut ordinal = 0;
        for item in items.iter_mut() {
            item.facets.ordinal = ordinal;
            if item.visible {
                ordinal += 1;
            }
        }
        let new_print = fingerprint(&items);
        let Ok(mut guard) = self.layers.write() else {
            return false;
        };
        let entry = guard.entry(layer).or_default();
        let changed = new_print.is_none()
            || entry.fingerprint != new_print
            || entry.columns != columns.max(1);
        entry.items = items;
        entry.fingerprint = new_print;
        entry.columns = columns.max(1);
        changed
    }

    /// Visible items in published order.
    pub fn focusables(&self, layer: Layer) -> Vec<FocusableItem> {
        self.read(layer, |items| items.focusables().cloned().collect())
            .unwrap_or_default()
    }

    pub fn columns(&self, layer: Layer) -> usize {
        self.read(layer, |items| items.columns).unwrap_or(1).max(1)
    }

    pub fn focused(&self, layer: Layer) -> Option<FocusedItem> {
        self.read(layer, |items| items.focused.clone()).flatten()
    }

    /// Index of the focused item within [`Self::focusables`].
    pub fn focused_index(&self, layer: Layer) -> Option<usize> {
        self.read(layer, |items| {
            let focused = items.focused.as_ref()?;
            items
                .focusables()
                .position(|item| item.handle == focused.handle)
        })
        .flatten()
    }

    /// Whether `handle` is still published and visible.
    pub fn is_live(&self, layer: Layer, handle: ItemHandle) -> bool {
        self.read(layer, |items| items.focusables().any(|item| item.handle == handle))
            .unwrap_or(false)
    }

    /// Whether the focused snapshot still names a visible item: same handle
    /// and, when the snapshot has one, the same stable id. On a match the
    /// snapshot takes the item's current facets.
    pub fn revalidate_focus(&self, layer: Layer) -> bool {
        let Ok(mut guard) = self.layers.write() else {
            return false;
        };
        let Some(entry) = guard.get_mut(&layer) else {
            return false;
        };
        let Some(focused) = entry.focused.as_ref() else {
            return false;
        };
        let current = entry
            .focusables()
            .find(|item| item.handle == focused.handle)
            .filter(|item| {
                focused.facets.stable_id.is_none()
                    || item.facets.stable_id == focused.facets.stable_id
            })
            .map(|item| item.facets.clone());
        match current {
            Some(facets) => {
                if let Some(focused) = entry.focused.as_mut() {
                    focused.facets = facets;
                }
                true
            }
            None => false,
        }
    }

    /// Move focus to the `index`-th focusable item. Out of range is a no-op.
    pub fn focus_index(&self, layer: Layer, index: usize) -> bool {
        let focused = {
            let Ok(mut guard) = self.layers.write() else {
                return false;
            };
            let Some(entry) = guard.get_mut(&layer) else {
                return false;
            };
            let Some(item) = entry.focusables().nth(index) else {
                return false;
            };
            let focused = FocusedItem {
                handle: item.handle,
                facets: item.facets.clone(),
            };
            entry.focused = Some(focused.clone());
            focused
        };
        self.notify(layer, Some(&focused));
        true
    }

    pub fn clear_focus(&self, layer: Layer) {
        let had_focus = self
            .layers
            .write()
            .ok()
            .and_then(|mut guard| guard.get_mut(&layer).and_then(|entry| entry.focused.take()))
            .is_some();
        if had_focus {
            self.notify(layer, None);
        }
    }

    pub fn scroll_offset(&self, layer: Layer) -> ScrollOffset {
        self.read(layer, |items| items.scroll).unwrap_or_default()
    }

    pub fn set_scroll_offset(&self, layer: Layer, offset: ScrollOffset) {
        if let Ok(mut guard) = self.layers.write() {
            guard.entry(layer).or_default().scroll = offset;
        }
    }

    pub fn is_scrollable(&self, layer: Layer) -> bool {
        self.read(layer, |items| items.scrollable).unwrap_or(false)
    }

    pub fn set_scrollable(&self, layer: Layer, scrollable: bool) {
        if let Ok(mut guard) = self.layers.write() {
            guard.entry(layer).or_default().scrollable = scrollable;
        }
    }

    pub fn metadata(&self, layer: Layer) -> LayerMetadata {
        self.read(layer, |items| items.metadata.clone())
            .unwrap_or_default()
    }

    pub fn set_metadata(&self, layer: Layer, metadata: LayerMetadata) {
        if let Ok(mut guard) = self.layers.write() {
            guard.entry(layer).or_default().metadata = metadata;
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FocusListener>) {
        if let Ok(mut guard) = self.listeners.write() {
            guard.push(listener);
        }
    }

    fn read<T>(&self, layer: Layer, f: impl FnOnce(&LayerItems) -> T) -> Option<T> {
        let guard = self.layers.read().ok()?;
        guard.get(&layer).map(f)
    }

    fn notify(&self, layer: Layer, focused: Option<&FocusedItem>) {
        let listeners = self
            .listeners
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        for listener in listeners {
            listener.on_focus_changed(layer, focused);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn tiles(count: u64) -> Vec<FocusableItem> {
        (0..count)
            .map(|i| {
                FocusableItem::new(i)
                    .with_stable_id(format!("screen-{i}"))
                    .with_domain_key(i as u32 + 1)
            })
            .collect()
    }

    #[test]
    fn publish_assigns_ordinals_and_detects_changes() {
        let registry = ItemRegistry::new();
        assert!(registry.publish(Layer::Dashboard, tiles(3), 4));
        let items = registry.focusables(Layer::Dashboard);
        assert_eq!(
            items.iter().map(|i| i.facets.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert!(!registry.publish(Layer::Dashboard, tiles(3), 4));
        assert!(registry.publish(Layer::Dashboard, tiles(3), 2));
        assert!(registry.publish(Layer::Dashboard, tiles(4), 2));
    }

    #[test]
    fn hidden_items_are_not_focusable() {
        let registry = ItemRegistry::new();
        let mut items = tiles(3);
        items[1] = items[1].clone().hidden();
        registry.publish(Layer::Dashboard, items, 4);

        let focusables = registry.focusables(Layer::Dashboard);
        assert_eq!(focusables.len(), 2);
        assert!(!registry.is_live(Layer::Dashboard, ItemHandle(1)));
        assert!(registry.focus_index(Layer::Dashboard, 1));
        assert_eq!(
            registry.focused(Layer::Dashboard).unwrap().handle,
            ItemHandle(2)
        );
    }

    #[test]
    fn focus_out_of_range_is_ignored() {
        let registry = ItemRegistry::new();
        registry.publish(Layer::Dashboard, tiles(2), 4);
        assert!(!registry.focus_index(Layer::Dashboard, 5));
        assert!(registry.focused(Layer::Dashboard).is_none());
        assert!(!registry.focus_index(Layer::Detail, 0));
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Layer, Option<ItemHandle>)>>,
    }

    impl FocusListener for Recorder {
        fn on_focus_changed(&self, layer: Layer, focused: Option<&FocusedItem>) {
            self.seen
                .lock()
                .unwrap()
                .push((layer, focused.map(|f| f.handle)));
        }
    }

    #[test]
    fn listeners_see_focus_and_clear() {
        let registry = ItemRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add_listener(recorder.clone());
        registry.publish(Layer::Dashboard, tiles(2), 4);

        registry.focus_index(Layer::Dashboard, 1);
        registry.clear_focus(Layer::Dashboard);
        registry.clear_focus(Layer::Dashboard);

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (Layer::Dashboard, Some(ItemHandle(1))),
                (Layer::Dashboard, None)
            ]
        );
    }

    #[test]
    fn focused_snapshot_survives_republish() {
        let registry = ItemRegistry::new();
        registry.publish(Layer::Dashboard, tiles(3), 4);
        registry.focus_index(Layer::Dashboard, 2);
        registry.publish(Layer::Dashboard, tiles(1), 4);

        let focused = registry.focused(Layer::Dashboard).unwrap();
        assert_eq!(focused.facets.stable_id.as_deref(), Some("screen-2"));
        assert!(!registry.is_live(Layer::Dashboard, focused.handle));
        assert!(registry.focused_index(Layer::Dashboard).is_none());
    }

    #[test]
    fn ordinals_count_visible_items_only() {
        let registry = ItemRegistry::new();
        let mut items = tiles(4);
        items[0] = items[0].clone().hidden();
        registry.publish(Layer::Dashboard, items, 4);
        let ordinals: Vec<usize> = registry
            .focusables(Layer::Dashboard)
            .iter()
            .map(|i| i.facets.ordinal)
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn stable_id_handles_do_not_depend_on_position() {
        assert_eq!(ItemHandle::for_stable_id("c"), ItemHandle::for_stable_id("c"));
        assert_ne!(ItemHandle::for_stable_id("b"), ItemHandle::for_stable_id("c"));
    }

    #[test]
    fn revalidation_requires_matching_identity() {
        let registry = ItemRegistry::new();
        registry.publish(
            Layer::Dashboard,
            vec![
                FocusableItem::new(7).with_stable_id("a").with_domain_key(1),
                FocusableItem::new(8).with_stable_id("c").with_domain_key(2),
            ],
            4,
        );
        registry.focus_index(Layer::Dashboard, 1);

        // Same handle, same id, new position: snapshot follows the item.
        registry.publish(
            Layer::Dashboard,
            vec![
                FocusableItem::new(7).with_stable_id("a").with_domain_key(1),
                FocusableItem::new(9).with_stable_id("b").with_domain_key(2),
                FocusableItem::new(8).with_stable_id("c").with_domain_key(3),
            ],
            4,
        );
        assert!(registry.revalidate_focus(Layer::Dashboard));
        let focused = registry.focused(Layer::Dashboard).unwrap();
        assert_eq!(focused.facets.domain_key, Some(3));
        assert_eq!(focused.facets.ordinal, 2);

        // Handle reused by a different screen is not the focused item.
        registry.publish(
            Layer::Dashboard,
            vec![FocusableItem::new(8).with_stable_id("z").with_domain_key(1)],
            4,
        );
        assert!(!registry.revalidate_focus(Layer::Dashboard));
        assert!(!registry.revalidate_focus(Layer::Detail));
    }
}
