//! Spatial (directional) navigation across a layer's focusable items.

mod spatial;

pub use spatial::{Direction, NavigationGrid, SpatialNavigator};
