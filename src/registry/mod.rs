//! Focusable-item registry, one item collection per layer.

mod core;

pub use self::core::{
    FocusListener, FocusableItem, FocusedItem, GridPosition, ItemFacets, ItemHandle,
    ItemRegistry, LayerMetadata, NeighborAnnotations, NeighborRef, ScrollOffset,
};
