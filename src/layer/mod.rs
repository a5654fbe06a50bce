//! Layer model: the three stacked views and the rules for moving between them.

pub mod audit;
mod coordinator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use coordinator::{
    ExitRequester, LayerChange, LayerCoordinator, LayerObserver, LayerSurface, LayerSurfaces,
    ObserverId, TransitionParams, TransitionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Map,
    Dashboard,
    Detail,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Map, Layer::Dashboard, Layer::Detail];

    pub fn name(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Dashboard => "dashboard",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every allowed move between layers. Anything not listed is rejected.
pub const TRANSITIONS: &[(Layer, Layer)] = &[
    (Layer::Map, Layer::Dashboard),
    (Layer::Dashboard, Layer::Map),
    (Layer::Dashboard, Layer::Detail),
    (Layer::Detail, Layer::Dashboard),
];

pub fn is_valid_transition(from: Layer, to: Layer) -> bool {
    TRANSITIONS.contains(&(from, to))
}

pub fn valid_destinations(from: Layer) -> Vec<Layer> {
    TRANSITIONS
        .iter()
        .filter(|(f, _)| *f == from)
        .map(|(_, t)| *t)
        .collect()
}

/// Navigation stack. The current layer is always the last entry and the
/// stack never becomes empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHistory {
    entries: Vec<Layer>,
}

impl Default for LayerHistory {
    fn default() -> Self {
        Self::new(Layer::Map)
    }
}

impl LayerHistory {
    pub fn new(root: Layer) -> Self {
        Self {
            entries: vec![root],
        }
    }

    pub fn current(&self) -> Layer {
        // Seeded on construction and `pop` refuses to remove the root.
        self.entries[self.entries.len() - 1]
    }

    pub fn previous(&self) -> Option<Layer> {
        self.entries
            .len()
            .checked_sub(2)
            .map(|idx| self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_root(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn push(&mut self, layer: Layer) {
        self.entries.push(layer);
    }

    /// Remove the current entry unless it is the root.
    pub fn pop(&mut self) -> Option<Layer> {
        if self.is_root() {
            return None;
        }
        self.entries.pop()
    }

    pub fn entries(&self) -> &[Layer] {
        &self.entries
    }
}
