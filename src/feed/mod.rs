//! Screen records delivered by the data feed and their dashboard tiles.

use serde::{Deserialize, Serialize};

use crate::registry::{FocusableItem, ItemHandle};

/// One screen as reported by the data feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

impl ScreenRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, active: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active,
        }
    }
}

/// Parse a feed snapshot (a JSON array of records).
pub fn parse_feed(raw: &str) -> crate::Result<Vec<ScreenRecord>> {
    Ok(serde_json::from_str(raw)?)
}

pub fn active_screens(records: &[ScreenRecord]) -> Vec<ScreenRecord> {
    records.iter().filter(|r| r.active).cloned().collect()
}

/// Tiles for the active screens in feed order. The domain key is the
/// one-based screen number shown on the tile; the stable id is the record id,
/// which also seeds the handle.
pub fn dashboard_tiles(active: &[ScreenRecord]) -> Vec<FocusableItem> {
    active
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            FocusableItem::new(ItemHandle::for_stable_id(&record.id).0)
                .with_domain_key(idx as u32 + 1)
                .with_stable_id(record.id.clone())
        })
        .collect()
}

/// Direction of an active-set change between two feed snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityChange {
    BecameActive,
    BecameIdle,
    Unchanged,
}

pub fn activity_change(previous: &[ScreenRecord], next: &[ScreenRecord]) -> ActivityChange {
    let was = previous.iter().any(|r| r.active);
    let is = next.iter().any(|r| r.active);
    match (was, is) {
        (false, true) => ActivityChange::BecameActive,
        (true, false) => ActivityChange::BecameIdle,
        _ => ActivityChange::Unchanged,
    }
}
