mod dispatcher;
mod keys;

pub use dispatcher::{
    DefaultKeyHandler, DispatchOutcome, InputDispatcher, KeyBinding, KeyDisposition, KeyOverride,
    OverrideOutcome,
};
pub use keys::{KeyEvent, LogicalKey, RawKeyEvent, RawSource, normalize};
