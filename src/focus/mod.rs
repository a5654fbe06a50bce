//! Per-layer focus persistence and restoration.

mod store;

pub use store::{FocusState, FocusStateStore, RefreshOutcome, RestoreStrategy};
