use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::config::EngineConfig;
use crate::content::ContentController;
use crate::error::{NavError, Result};
use crate::feed::ScreenRecord;
use crate::focus::FocusStateStore;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::metrics::{SharedMetrics, with_metrics};
use crate::registry::FocusableItem;

use super::audit::{NullTransitionAudit, TransitionAudit, TransitionAuditEventBuilder};
use super::{Layer, LayerHistory, is_valid_transition};

const TARGET: &str = "remote_focus::coordinator";

/// Step of an in-flight transition. `Idle` whenever no transition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    SavingFocus,
    Hiding,
    Showing,
    RestoringFocus,
    Complete,
}

/// Parameters carried by a transition, handed to the target surface and to
/// observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionParams {
    /// Screen to open when entering the detail layer.
    pub screen_id: Option<String>,
    pub extra: Map<String, Value>,
}

impl TransitionParams {
    pub fn screen(id: impl Into<String>) -> Self {
        Self {
            screen_id: Some(id.into()),
            extra: Map::new(),
        }
    }
}

/// Rendering collaborator of one layer. Completion of the returned future is
/// the "animation finished" signal; the coordinator bounds it with a timeout.
#[async_trait]
pub trait LayerSurface: Send + Sync {
    async fn show(&self, params: &TransitionParams) -> Result<()>;

    async fn hide(&self) -> Result<()>;

    /// Dashboard only: draw the given screens and return the tiles it drew.
    async fn render(&self, _screens: &[ScreenRecord]) -> Result<Vec<FocusableItem>> {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct LayerSurfaces {
    pub map: Arc<dyn LayerSurface>,
    pub dashboard: Arc<dyn LayerSurface>,
    pub detail: Arc<dyn LayerSurface>,
}

impl LayerSurfaces {
    pub fn get(&self, layer: Layer) -> &Arc<dyn LayerSurface> {
        match layer {
            Layer::Map => &self.map,
            Layer::Dashboard => &self.dashboard,
            Layer::Detail => &self.detail,
        }
    }
}

/// Receives the "leave the application" request issued by a back press at
/// the root of the history.
pub trait ExitRequester: Send + Sync {
    fn request_exit(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerChange {
    pub previous: Layer,
    pub current: Layer,
    pub params: TransitionParams,
    /// `true` when the change came from `pop_layer`.
    pub back: bool,
}

pub trait LayerObserver: Send + Sync {
    fn on_layer_changed(&self, change: &LayerChange);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct CoordinatorState {
    history: LayerHistory,
    stage: TransitionState,
    transitioning: bool,
}

/// Clears the in-progress guard however the transition ends.
struct TransitionGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.transitioning = false;
            state.stage = TransitionState::Idle;
        }
    }
}

/// Top-level layer state machine.
pub struct LayerCoordinator {
    state: Mutex<CoordinatorState>,
    surfaces: LayerSurfaces,
    focus: Arc<FocusStateStore>,
    content: Arc<dyn ContentController>,
    exit: Arc<dyn ExitRequester>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn LayerObserver>)>>,
    next_observer: AtomicU64,
    audit: Arc<dyn TransitionAudit>,
    hide_timeout: Duration,
    show_timeout: Duration,
    logger: Option<Logger>,
    metrics: Option<SharedMetrics>,
}

impl LayerCoordinator {
    pub fn new(
        surfaces: LayerSurfaces,
        focus: Arc<FocusStateStore>,
        content: Arc<dyn ContentController>,
        exit: Arc<dyn ExitRequester>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                history: LayerHistory::new(Layer::Map),
                stage: TransitionState::Idle,
                transitioning: false,
            }),
            surfaces,
            focus,
            content,
            exit,
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
            audit: Arc::new(NullTransitionAudit),
            hide_timeout: config.hide_timeout,
            show_timeout: config.show_timeout,
            logger: config.logger.clone(),
            metrics: config.metrics_handle(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn TransitionAudit>) -> Self {
        self.audit = audit;
        self
    }

    pub fn current_layer(&self) -> Layer {
        self.read(|state| state.history.current())
            .unwrap_or(Layer::Map)
    }

    pub fn history(&self) -> LayerHistory {
        self.read(|state| state.history.clone()).unwrap_or_default()
    }

    pub fn transition_state(&self) -> TransitionState {
        self.read(|state| state.stage)
            .unwrap_or(TransitionState::Idle)
    }

    pub fn is_transitioning(&self) -> bool {
        self.read(|state| state.transitioning).unwrap_or(false)
    }

    pub fn surfaces(&self) -> &LayerSurfaces {
        &self.surfaces
    }

    pub fn register_observer(&self, observer: Arc<dyn LayerObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut observers) = self.observers.lock() {
            observers.push((id, observer));
        }
        id
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        let Ok(mut observers) = self.observers.lock() else {
            return false;
        };
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Move forward to `target`. Returns `false` when the move is rejected or
    /// a step fails.
    pub async fn push_layer(&self, target: Layer, params: TransitionParams) -> bool {
        self.try_push_layer(target, params).await.is_ok()
    }

    pub async fn try_push_layer(&self, target: Layer, params: TransitionParams) -> Result<()> {
        let from = self.begin(|history| {
            let from = history.current();
            if target == from {
                return Err(NavError::AlreadyCurrent(target));
            }
            if !is_valid_transition(from, target) {
                return Err(NavError::InvalidTransition { from, to: target });
            }
            Ok(from)
        })?;
        let _guard = TransitionGuard { state: &self.state };
        let result = self.run_transition(from, target, params, false).await;
        self.finish(from, target, &result);
        result
    }

    /// Go back one layer. At the history root this hands an exit request to
    /// the [`ExitRequester`] instead and returns `false`.
    pub async fn pop_layer(&self) -> bool {
        self.try_pop_layer().await.unwrap_or(false)
    }

    /// `Ok(true)` after a back transition, `Ok(false)` when exit was requested.
    pub async fn try_pop_layer(&self) -> Result<bool> {
        let begun = self.begin(|history| Ok((history.current(), history.previous())))?;
        let (from, target) = match begun {
            (from, Some(target)) => (from, target),
            (from, None) => {
                if let Ok(mut state) = self.state.lock() {
                    state.transitioning = false;
                }
                emit(
                    self.logger.as_ref(),
                    LogLevel::Info,
                    TARGET,
                    "exit_requested",
                    [json_kv("layer", from.name())],
                );
                self.exit.request_exit();
                return Ok(false);
            }
        };
        let _guard = TransitionGuard { state: &self.state };
        let result = self
            .run_transition(from, target, TransitionParams::default(), true)
            .await;
        self.finish(from, target, &result);
        result.map(|_| true)
    }

    /// Check-and-set the in-progress guard, then validate with `check`.
    fn begin<T>(&self, check: impl FnOnce(&LayerHistory) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| NavError::TransitionInProgress)?;
        if state.transitioning {
            return Err(NavError::TransitionInProgress);
        }
        let value = check(&state.history)?;
        state.transitioning = true;
        Ok(value)
    }

    async fn run_transition(
        &self,
        from: Layer,
        to: Layer,
        params: TransitionParams,
        back: bool,
    ) -> Result<()> {
        self.enter_stage(TransitionState::SavingFocus, from, to);
        self.focus.save(from);

        self.enter_stage(TransitionState::Hiding, from, to);
        self.await_surface(from, "hide", self.hide_timeout, self.surfaces.get(from).hide())
            .await?;

        if from == Layer::Detail {
            self.content.close_screen().await?;
        }
        if to == Layer::Detail {
            if let Some(screen_id) = params.screen_id.as_deref() {
                if let Err(err) = self.content.open_screen(screen_id, &params).await {
                    emit(
                        self.logger.as_ref(),
                        LogLevel::Error,
                        TARGET,
                        "content_open_failed",
                        [
                            json_kv("screen_id", screen_id),
                            json_kv("error", err.to_string()),
                        ],
                    );
                    return Err(err);
                }
            }
        }

        self.enter_stage(TransitionState::Showing, from, to);
        self.await_surface(to, "show", self.show_timeout, self.surfaces.get(to).show(&params))
            .await?;

        if let Ok(mut state) = self.state.lock() {
            if back {
                state.history.pop();
            } else {
                state.history.push(to);
            }
        }

        self.enter_stage(TransitionState::RestoringFocus, from, to);
        if back {
            self.focus.restore(to);
        } else {
            self.focus.clear(to);
            self.focus.focus_first(to);
        }

        self.enter_stage(TransitionState::Complete, from, to);
        let change = LayerChange {
            previous: from,
            current: to,
            params,
            back,
        };
        let observers: Vec<Arc<dyn LayerObserver>> = self
            .observers
            .lock()
            .map(|guard| guard.iter().map(|(_, o)| Arc::clone(o)).collect())
            .unwrap_or_default();
        for observer in observers {
            observer.on_layer_changed(&change);
        }
        Ok(())
    }

    /// Await a surface animation. A timeout counts as completion; an error
    /// aborts the transition.
    async fn await_surface<F>(
        &self,
        layer: Layer,
        action: &str,
        limit: Duration,
        fut: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                emit(
                    self.logger.as_ref(),
                    LogLevel::Warn,
                    TARGET,
                    "surface_timeout",
                    [
                        json_kv("layer", layer.name()),
                        json_kv("action", action),
                        json_kv("timeout_ms", limit.as_millis() as u64),
                    ],
                );
                Ok(())
            }
        }
    }

    fn enter_stage(&self, stage: TransitionState, from: Layer, to: Layer) {
        if let Ok(mut state) = self.state.lock() {
            state.stage = stage;
        }
        let mut builder = TransitionAuditEventBuilder::new(stage, from, to);
        builder.detail("history_len", json!(self.history().len()));
        self.audit.record(builder.finish());
    }

    fn finish(&self, from: Layer, to: Layer, result: &Result<()>) {
        with_metrics(self.metrics.as_ref(), |m| m.record_transition(result.is_ok()));
        match result {
            Ok(()) => emit(
                self.logger.as_ref(),
                LogLevel::Info,
                TARGET,
                "transition_completed",
                [json_kv("from", from.name()), json_kv("to", to.name())],
            ),
            Err(err) => emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                TARGET,
                "transition_failed",
                [
                    json_kv("from", from.name()),
                    json_kv("to", to.name()),
                    json_kv("error", err.to_string()),
                ],
            ),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&CoordinatorState) -> T) -> Option<T> {
        self.state.lock().ok().map(|state| f(&state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::audit::RecordingAudit;
    use crate::registry::{ItemHandle, ItemRegistry};
    use std::sync::atomic::AtomicUsize;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct StubSurface {
        name: &'static str,
        calls: CallLog,
        hide_delay: Duration,
        fail_show: bool,
    }

    #[async_trait]
    impl LayerSurface for StubSurface {
        async fn show(&self, _params: &TransitionParams) -> Result<()> {
            self.calls.lock().unwrap().push(format!("{}.show", self.name));
            if self.fail_show {
                return Err(NavError::surface(Layer::Dashboard, "show exploded"));
            }
            Ok(())
        }

        async fn hide(&self) -> Result<()> {
            if !self.hide_delay.is_zero() {
                tokio::time::sleep(self.hide_delay).await;
            }
            self.calls.lock().unwrap().push(format!("{}.hide", self.name));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubContent {
        calls: Mutex<Vec<String>>,
        fail_open: bool,
    }

    #[async_trait]
    impl ContentController for StubContent {
        async fn open_screen(&self, id: &str, _params: &TransitionParams) -> Result<()> {
            self.calls.lock().unwrap().push(format!("open:{id}"));
            if self.fail_open {
                return Err(NavError::ContentLoad(format!("{id} unreachable")));
            }
            Ok(())
        }

        async fn close_screen(&self) -> Result<()> {
            self.calls.lock().unwrap().push("close".to_string());
            Ok(())
        }

        fn has_screen(&self, _id: &str) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingExit(AtomicUsize);

    impl ExitRequester for CountingExit {
        fn request_exit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ChangeRecorder(Mutex<Vec<LayerChange>>);

    impl LayerObserver for ChangeRecorder {
        fn on_layer_changed(&self, change: &LayerChange) {
            self.0.lock().unwrap().push(change.clone());
        }
    }

    struct Harness {
        coordinator: LayerCoordinator,
        registry: Arc<ItemRegistry>,
        calls: CallLog,
        content: Arc<StubContent>,
        exit: Arc<CountingExit>,
        audit: Arc<RecordingAudit>,
    }

    fn surface(name: &'static str, calls: &CallLog) -> StubSurface {
        StubSurface {
            name,
            calls: calls.clone(),
            hide_delay: Duration::ZERO,
            fail_show: false,
        }
    }

    fn harness_with(map: StubSurface, content: StubContent) -> Harness {
        let calls = map.calls.clone();
        let config = EngineConfig::default();
        let registry = Arc::new(ItemRegistry::new());
        let focus = Arc::new(FocusStateStore::new(registry.clone(), &config));
        let content = Arc::new(content);
        let exit = Arc::new(CountingExit::default());
        let audit = Arc::new(RecordingAudit::new());
        let surfaces = LayerSurfaces {
            map: Arc::new(map),
            dashboard: Arc::new(surface("dashboard", &calls)),
            detail: Arc::new(surface("detail", &calls)),
        };
        let coordinator =
            LayerCoordinator::new(surfaces, focus, content.clone(), exit.clone(), &config)
                .with_audit(audit.clone());
        Harness {
            coordinator,
            registry,
            calls,
            content,
            exit,
            audit,
        }
    }

    fn harness() -> Harness {
        let calls: CallLog = Arc::default();
        harness_with(surface("map", &calls), StubContent::default())
    }

    fn tiles(count: u64) -> Vec<FocusableItem> {
        (0..count)
            .map(|i| {
                FocusableItem::new(i)
                    .with_domain_key(i as u32 + 1)
                    .with_stable_id(format!("screen-{i}"))
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn map_cannot_jump_to_detail() {
        let h = harness();
        assert!(
            !h.coordinator
                .push_layer(Layer::Detail, TransitionParams::screen("s1"))
                .await
        );
        assert_eq!(h.coordinator.current_layer(), Layer::Map);
        assert_eq!(h.coordinator.history().len(), 1);
        assert_eq!(h.coordinator.transition_state(), TransitionState::Idle);
        assert!(h.calls.lock().unwrap().is_empty());
        assert!(h.audit.events().is_empty());

        let err = h
            .coordinator
            .try_push_layer(Layer::Map, TransitionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::AlreadyCurrent(Layer::Map)));
    }

    #[tokio::test(start_paused = true)]
    async fn push_then_pop_restores_history_length() {
        let h = harness();
        assert!(
            h.coordinator
                .push_layer(Layer::Dashboard, TransitionParams::default())
                .await
        );
        let before = h.coordinator.history().len();

        assert!(
            h.coordinator
                .push_layer(Layer::Detail, TransitionParams::screen("s1"))
                .await
        );
        assert_eq!(h.coordinator.current_layer(), Layer::Detail);
        assert!(h.coordinator.pop_layer().await);

        assert_eq!(h.coordinator.current_layer(), Layer::Dashboard);
        assert_eq!(h.coordinator.history().len(), before);
        assert_eq!(
            *h.content.calls.lock().unwrap(),
            vec!["open:s1".to_string(), "close".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn root_back_requests_exit_once() {
        let h = harness();
        assert!(!h.coordinator.pop_layer().await);
        assert_eq!(h.exit.0.load(Ordering::SeqCst), 1);
        assert_eq!(h.coordinator.history().entries(), &[Layer::Map]);
        assert!(!h.coordinator.is_transitioning());
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn steps_run_in_order() {
        let h = harness();
        h.coordinator
            .push_layer(Layer::Dashboard, TransitionParams::default())
            .await;
        assert_eq!(
            h.audit.stages(),
            vec![
                TransitionState::SavingFocus,
                TransitionState::Hiding,
                TransitionState::Showing,
                TransitionState::RestoringFocus,
                TransitionState::Complete,
            ]
        );
        assert_eq!(
            *h.calls.lock().unwrap(),
            vec!["map.hide".to_string(), "dashboard.show".to_string()]
        );
        assert_eq!(h.coordinator.transition_state(), TransitionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_push_during_hiding_is_rejected() {
        let calls: CallLog = Arc::default();
        let mut map = surface("map", &calls);
        map.hide_delay = Duration::from_millis(100);
        let h = harness_with(map, StubContent::default());

        let (first, (seen, second, after)) = tokio::join!(
            h.coordinator
                .push_layer(Layer::Dashboard, TransitionParams::default()),
            async {
                tokio::task::yield_now().await;
                let seen = h.coordinator.transition_state();
                let second = h
                    .coordinator
                    .push_layer(Layer::Dashboard, TransitionParams::default())
                    .await;
                (seen, second, h.coordinator.transition_state())
            }
        );

        assert!(first);
        assert_eq!(seen, TransitionState::Hiding);
        assert!(!second);
        assert_eq!(after, TransitionState::Hiding);
        assert_eq!(h.coordinator.history().entries(), &[Layer::Map, Layer::Dashboard]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_hide_times_out_and_proceeds() {
        let calls: CallLog = Arc::default();
        let mut map = surface("map", &calls);
        map.hide_delay = Duration::from_secs(30);
        let h = harness_with(map, StubContent::default());

        assert!(
            h.coordinator
                .push_layer(Layer::Dashboard, TransitionParams::default())
                .await
        );
        assert_eq!(*h.calls.lock().unwrap(), vec!["dashboard.show".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn content_failure_aborts_without_rollback() {
        let calls: CallLog = Arc::default();
        let content = StubContent {
            fail_open: true,
            ..StubContent::default()
        };
        let h = harness_with(surface("map", &calls), content);
        h.coordinator
            .push_layer(Layer::Dashboard, TransitionParams::default())
            .await;

        let err = h
            .coordinator
            .try_push_layer(Layer::Detail, TransitionParams::screen("broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::ContentLoad(_)));
        assert!(!h.coordinator.is_transitioning());
        assert_eq!(h.coordinator.transition_state(), TransitionState::Idle);
        assert_eq!(h.coordinator.current_layer(), Layer::Dashboard);
        // The dashboard was already hidden; nothing re-shows it.
        let calls = h.calls.lock().unwrap().clone();
        assert_eq!(calls.last().map(String::as_str), Some("dashboard.hide"));
    }

    #[tokio::test(start_paused = true)]
    async fn forward_focuses_first_and_back_restores() {
        let h = harness();
        h.registry.publish(Layer::Dashboard, tiles(6), 4);
        h.registry.publish(Layer::Detail, tiles(2), 1);

        h.coordinator
            .push_layer(Layer::Dashboard, TransitionParams::default())
            .await;
        assert_eq!(h.registry.focused_index(Layer::Dashboard), Some(0));

        h.registry.focus_index(Layer::Dashboard, 4);
        h.coordinator
            .push_layer(Layer::Detail, TransitionParams::screen("screen-4"))
            .await;
        assert_eq!(h.registry.focused_index(Layer::Detail), Some(0));

        h.coordinator.pop_layer().await;
        assert_eq!(
            h.registry.focused(Layer::Dashboard).map(|f| f.handle),
            Some(ItemHandle(4))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn observers_receive_changes_until_unregistered() {
        let h = harness();
        let recorder = Arc::new(ChangeRecorder::default());
        let id = h.coordinator.register_observer(recorder.clone());

        h.coordinator
            .push_layer(Layer::Dashboard, TransitionParams::default())
            .await;
        h.coordinator
            .push_layer(Layer::Detail, TransitionParams::screen("s9"))
            .await;
        assert!(h.coordinator.unregister_observer(id));
        assert!(!h.coordinator.unregister_observer(id));
        h.coordinator.pop_layer().await;

        let changes = recorder.0.lock().unwrap().clone();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].previous, Layer::Map);
        assert_eq!(changes[0].current, Layer::Dashboard);
        assert_eq!(changes[1].params.screen_id.as_deref(), Some("s9"));
        assert!(!changes[1].back);
    }
}
