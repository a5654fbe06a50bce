//! Focus and layer navigation engine for remote-control driven TV shells.
//!
//! Three stacked layers (Map, Dashboard, Detail) are driven by a small key
//! vocabulary. Keys are normalized, debounced and dispatched; directional
//! keys move focus spatially across each layer's published items; confirm
//! and back move between layers while focus is saved and restored.

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod feed;
pub mod focus;
pub mod input;
pub mod layer;
pub mod logging;
pub mod metrics;
pub mod navigation;
pub mod registry;

pub use config::EngineConfig;
pub use content::{ContentController, ContentFrame, ContentHost, ContentMessage, MessageKind};
pub use engine::{Engine, EngineParts, LayerKeyRouter, MapControl};
pub use error::{NavError, Result};
pub use feed::{ActivityChange, ScreenRecord};
pub use focus::{FocusState, FocusStateStore, RefreshOutcome, RestoreStrategy};
pub use input::{
    DefaultKeyHandler, DispatchOutcome, InputDispatcher, KeyBinding, KeyDisposition, KeyEvent,
    KeyOverride, LogicalKey, OverrideOutcome, RawKeyEvent, RawSource, normalize,
};
pub use layer::audit::{
    NullTransitionAudit, RecordingAudit, TransitionAudit, TransitionAuditEvent,
    TransitionAuditEventBuilder,
};
pub use layer::{
    ExitRequester, Layer, LayerChange, LayerCoordinator, LayerHistory, LayerObserver,
    LayerSurface, LayerSurfaces, ObserverId, TransitionParams, TransitionState,
};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{MetricSnapshot, NavigationMetrics, SharedMetrics};
pub use navigation::{Direction, NavigationGrid, SpatialNavigator};
pub use registry::{
    FocusListener, FocusableItem, FocusedItem, GridPosition, ItemFacets, ItemHandle,
    ItemRegistry, LayerMetadata, NeighborAnnotations, NeighborRef, ScrollOffset,
};
