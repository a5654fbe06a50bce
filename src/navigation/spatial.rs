use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::registry::{FocusableItem, NeighborRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    fn slot(self) -> usize {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Left => 2,
            Self::Right => 3,
        }
    }
}

/// Neighbor table derived from one item collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationGrid {
    pub columns: usize,
    pub rows: usize,
    neighbors: Vec<[Option<usize>; 4]>,
}

impl NavigationGrid {
    pub fn build(items: &[FocusableItem], columns: usize) -> Self {
        let columns = columns.max(1);
        let count = items.len();
        let rows = count.div_ceil(columns);

        let by_key: HashMap<u32, usize> = items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.facets.domain_key.map(|key| (key, idx)))
            .collect();

        let neighbors = (0..count)
            .map(|idx| {
                let mut slots = [None; 4];
                if count > 1 {
                    for direction in Direction::ALL {
                        let target = match items[idx].neighbors.get(direction) {
                            Some(annotated) => resolve_annotation(annotated, count, &by_key),
                            None => linear_step(idx, count, columns, direction),
                        };
                        slots[direction.slot()] = target.filter(|t| *t != idx);
                    }
                }
                slots
            })
            .collect();

        Self {
            columns,
            rows,
            neighbors,
        }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbor(&self, index: usize, direction: Direction) -> Option<usize> {
        self.neighbors
            .get(index)
            .and_then(|slots| slots[direction.slot()])
    }
}

fn resolve_annotation(
    annotated: NeighborRef,
    count: usize,
    by_key: &HashMap<u32, usize>,
) -> Option<usize> {
    match annotated {
        NeighborRef::Index(target) => (target < count).then_some(target),
        NeighborRef::DomainKey(key) => by_key.get(&key).copied(),
        NeighborRef::Blocked => None,
    }
}

/// Row-major step. Down into a missing cell of a partial last row lands on
/// the last item instead of stranding focus.
fn linear_step(index: usize, count: usize, columns: usize, direction: Direction) -> Option<usize> {
    let row = index / columns;
    let col = index % columns;
    match direction {
        Direction::Up => (row > 0).then(|| index - columns),
        Direction::Down => {
            let below = index + columns;
            if below < count {
                Some(below)
            } else if count % columns != 0 {
                Some(count - 1)
            } else {
                None
            }
        }
        Direction::Left => (col > 0).then(|| index - 1),
        Direction::Right => (col + 1 < columns && index + 1 < count).then(|| index + 1),
    }
}

/// Stateless spatial navigation over a layer's focusable items.
#[derive(Debug, Clone, Copy)]
pub struct SpatialNavigator {
    columns: usize,
}

impl SpatialNavigator {
    pub fn new(columns: usize) -> Self {
        Self {
            columns: columns.max(1),
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Index to focus after moving `direction` from `current`, or `None` when
    /// focus should stay where it is.
    pub fn move_focus(
        &self,
        items: &[FocusableItem],
        current: usize,
        direction: Direction,
    ) -> Option<usize> {
        if current >= items.len() {
            return None;
        }
        NavigationGrid::build(items, self.columns).neighbor(current, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_items(count: u64) -> Vec<FocusableItem> {
        (0..count)
            .map(|i| FocusableItem::new(i).with_domain_key(i as u32 + 1))
            .collect()
    }

    #[test]
    fn empty_and_single_collections_never_move() {
        let nav = SpatialNavigator::new(4);
        for direction in Direction::ALL {
            assert_eq!(nav.move_focus(&[], 0, direction), None);
            assert_eq!(nav.move_focus(&grid_items(1), 0, direction), None);
        }

        let annotated = vec![FocusableItem::new(0).with_neighbor(Direction::Right, NeighborRef::Index(0))];
        assert_eq!(nav.move_focus(&annotated, 0, Direction::Right), None);
    }

    #[test]
    fn partial_last_row_clamps_down_to_last_item() {
        let nav = SpatialNavigator::new(4);
        let items = grid_items(7);
        assert_eq!(nav.move_focus(&items, 5, Direction::Down), Some(6));
        assert_eq!(nav.move_focus(&items, 3, Direction::Down), Some(6));
        assert_eq!(nav.move_focus(&items, 1, Direction::Down), Some(5));
        assert_eq!(nav.move_focus(&items, 6, Direction::Down), None);
    }

    #[test]
    fn full_last_row_does_not_clamp() {
        let nav = SpatialNavigator::new(4);
        let items = grid_items(8);
        assert_eq!(nav.move_focus(&items, 5, Direction::Down), None);
    }

    #[test]
    fn linear_edges() {
        let nav = SpatialNavigator::new(4);
        let items = grid_items(7);
        assert_eq!(nav.move_focus(&items, 1, Direction::Up), None);
        assert_eq!(nav.move_focus(&items, 5, Direction::Up), Some(1));
        assert_eq!(nav.move_focus(&items, 4, Direction::Left), None);
        assert_eq!(nav.move_focus(&items, 5, Direction::Left), Some(4));
        assert_eq!(nav.move_focus(&items, 3, Direction::Right), None);
        assert_eq!(nav.move_focus(&items, 6, Direction::Right), None);
        assert_eq!(nav.move_focus(&items, 2, Direction::Right), Some(3));
    }

    #[test]
    fn annotations_override_arithmetic() {
        let nav = SpatialNavigator::new(4);
        let mut items = grid_items(6);
        items[0] = items[0]
            .clone()
            .with_neighbor(Direction::Down, NeighborRef::DomainKey(6))
            .with_neighbor(Direction::Right, NeighborRef::Blocked);
        items[1] = items[1]
            .clone()
            .with_neighbor(Direction::Left, NeighborRef::Index(42));

        assert_eq!(nav.move_focus(&items, 0, Direction::Down), Some(5));
        assert_eq!(nav.move_focus(&items, 0, Direction::Right), None);
        // Unannotated directions still use the grid.
        assert_eq!(nav.move_focus(&items, 0, Direction::Up), None);
        assert_eq!(nav.move_focus(&items, 1, Direction::Down), Some(5));
        // Dangling references resolve to nothing.
        assert_eq!(nav.move_focus(&items, 1, Direction::Left), None);
    }

    #[test]
    fn results_stay_in_bounds() {
        for count in 1..=13u64 {
            for columns in 1..=5 {
                let nav = SpatialNavigator::new(columns);
                let items = grid_items(count);
                for current in 0..count as usize {
                    for direction in Direction::ALL {
                        if let Some(target) = nav.move_focus(&items, current, direction) {
                            assert!(target < count as usize);
                            assert_ne!(target, current);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn grid_dimensions() {
        let grid = NavigationGrid::build(&grid_items(7), 4);
        assert_eq!((grid.columns, grid.rows), (4, 2));
        assert_eq!(grid.len(), 7);
        assert_eq!(grid.neighbor(0, Direction::Right), Some(1));
        assert_eq!(grid.neighbor(9, Direction::Right), None);
    }
}
