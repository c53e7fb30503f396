//! Plugin Lifecycle - 플러그인 상태 기계 구동
//!
//! ```text
//! load_all:  [Load 전체] → [Initialize 전체] → [ExtensionsInitialized 전체]   (로드 순서)
//! delayed:   이벤트 루프 틱마다 delayed_initialize 하나씩
//! shutdown:  [about_to_shutdown 전체] → [삭제 전체]                        (로드 역순)
//! ```
//!
//! 한 단계 전체가 끝나야 다음 단계로 넘어갑니다. 실패는 해당 스펙에 기록되고,
//! Required 의존성이 목표 상태에 도달하지 못한 스펙은 그 단계를 건너뜁니다.

use super::crashcheck::CrashCheck;
use super::events::{plugin_error_event, state_changed_event, EventBus, EventType, PluginEvent};
use super::loader::{PluginLoader, StaticPluginLoader};
use super::metadata::DependencyKind;
use super::object_pool::ObjectPool;
use super::profiling::Profiler;
use super::spec::{PluginErrorKind, PluginSpec, PluginState, SpecId};
use super::traits::{PluginContext, ShutdownFlag, ShutdownNotifier};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 라이프사이클 컨트롤러
pub struct PluginLifecycle {
    static_loader: Arc<StaticPluginLoader>,
    library_loader: RwLock<Arc<dyn PluginLoader>>,
    object_pool: Arc<ObjectPool>,
    event_bus: Arc<EventBus>,
    profiler: Arc<Profiler>,
    crash_check: Arc<CrashCheck>,
    shutdown_timeout: RwLock<Duration>,
    delayed_queue: Mutex<VecDeque<SpecId>>,
}

impl PluginLifecycle {
    pub fn new(
        static_loader: Arc<StaticPluginLoader>,
        library_loader: Arc<dyn PluginLoader>,
        object_pool: Arc<ObjectPool>,
        event_bus: Arc<EventBus>,
        profiler: Arc<Profiler>,
        crash_check: Arc<CrashCheck>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            static_loader,
            library_loader: RwLock::new(library_loader),
            object_pool,
            event_bus,
            profiler,
            crash_check,
            shutdown_timeout: RwLock::new(shutdown_timeout),
            delayed_queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_library_loader(&self, loader: Arc<dyn PluginLoader>) {
        *self.library_loader.write() = loader;
    }

    pub fn set_shutdown_timeout(&self, timeout: Duration) {
        *self.shutdown_timeout.write() = timeout;
    }

    pub fn shutdown_timeout(&self) -> Duration {
        *self.shutdown_timeout.read()
    }

    fn context(&self, spec: &PluginSpec) -> PluginContext {
        PluginContext::new(spec.name(), self.object_pool.clone(), self.event_bus.clone())
    }

    async fn transition(&self, spec: &PluginSpec, state: PluginState) {
        spec.set_state(state);
        debug!("{} -> {}", spec.name(), state);
        self.event_bus
            .publish(state_changed_event(spec.name(), state))
            .await;
    }

    async fn fail(&self, spec: &PluginSpec, kind: PluginErrorKind, message: String) {
        warn!("{}: {}", spec.name(), message);
        self.event_bus
            .publish(plugin_error_event(spec.name(), kind, &message))
            .await;
        spec.report_error(kind, message);
    }

    // ========================================================================
    // 시작
    // ========================================================================

    /// 로드 큐 전체를 Running까지 진행
    pub async fn load_all(&self, specs: &[Arc<PluginSpec>], queue: &[SpecId]) {
        for id in queue {
            self.load_plugin(specs, *id, PluginState::Loaded).await;
        }
        for id in queue {
            self.load_plugin(specs, *id, PluginState::Initialized).await;
        }

        let mut delayed = VecDeque::new();
        for id in queue {
            let spec = &specs[id.0];
            self.load_plugin(specs, *id, PluginState::Running).await;
            if spec.state() == PluginState::Running {
                delayed.push_back(*id);
            } else if spec.plugin().is_some() {
                self.discard(spec).await;
            }
        }

        *self.delayed_queue.lock() = delayed;
        self.profiler.report("LoadPlugins", None);
    }

    /// 한 스펙을 `dest` 로 한 단계 진행
    pub async fn load_plugin(&self, specs: &[Arc<PluginSpec>], id: SpecId, dest: PluginState) {
        let spec = &specs[id.0];
        let (state, has_error) = spec.status();
        if has_error || state as u8 + 1 != dest as u8 {
            return;
        }
        if dest == PluginState::Loaded && !spec.is_effectively_enabled() {
            return;
        }

        let _lock = self.crash_check.guard(spec.name());

        match dest {
            PluginState::Running => {
                self.initialize_extensions(spec).await;
                self.profiler.report("ExtensionsInitialized", Some(spec.name()));
                return;
            }
            PluginState::Deleted => {
                self.kill(spec).await;
                return;
            }
            _ => {}
        }

        for dep in spec.dependency_specs() {
            if dep.dependency.kind != DependencyKind::Required {
                continue;
            }
            let dependency = &specs[dep.spec.0];
            if dependency.state() != dest {
                let kind = match dest {
                    PluginState::Loaded => PluginErrorKind::LoadFailure,
                    _ => PluginErrorKind::InitializeFailure,
                };
                let message = format!(
                    "Cannot load plugin because dependency failed to load: {} ({})\nReason: {}",
                    dependency.name(),
                    dependency.version(),
                    dependency.error_string()
                );
                self.fail(spec, kind, message).await;
                return;
            }
        }

        match dest {
            PluginState::Loaded => {
                self.load_library(spec).await;
                self.profiler.report("Load", Some(spec.name()));
            }
            PluginState::Initialized => {
                self.initialize_plugin(spec).await;
                self.profiler.report("Initialize", Some(spec.name()));
            }
            _ => {}
        }
    }

    async fn load_library(&self, spec: &PluginSpec) {
        if spec.state() != PluginState::Resolved {
            self.fail(
                spec,
                PluginErrorKind::LoadFailure,
                "Loading the library failed because state != Resolved".to_string(),
            )
            .await;
            return;
        }

        let library_loader = self.library_loader.read().clone();
        let loader: &dyn PluginLoader = if library_loader.can_load(spec) {
            library_loader.as_ref()
        } else {
            self.static_loader.as_ref()
        };

        match loader.load(spec) {
            Ok(loaded) => {
                debug!("Loaded {} via {} loader", spec.name(), loader.name());
                spec.set_loaded(loaded);
                self.transition(spec, PluginState::Loaded).await;
            }
            Err(e) => {
                self.fail(spec, PluginErrorKind::LoadFailure, format!("Plugin loading failed: {}", e))
                    .await
            }
        }
    }

    async fn initialize_plugin(&self, spec: &PluginSpec) {
        if spec.state() != PluginState::Loaded {
            self.fail(
                spec,
                PluginErrorKind::InitializeFailure,
                "Initializing the plugin failed because state != Loaded".to_string(),
            )
            .await;
            return;
        }
        let Some(plugin) = spec.plugin() else {
            self.fail(
                spec,
                PluginErrorKind::InitializeFailure,
                "Internal error: have no plugin instance to initialize".to_string(),
            )
            .await;
            return;
        };

        let ctx = self.context(spec);
        let arguments = spec.arguments();
        match guarded(plugin.initialize(&ctx, &arguments)).await {
            Ok(Ok(())) => self.transition(spec, PluginState::Initialized).await,
            Ok(Err(e)) => {
                self.fail(
                    spec,
                    PluginErrorKind::InitializeFailure,
                    format!("Plugin initialization failed: {}", e),
                )
                .await
            }
            Err(panic) => {
                self.fail(
                    spec,
                    PluginErrorKind::InitializeFailure,
                    format!("Plugin initialization failed: panicked: {}", panic),
                )
                .await
            }
        }
    }

    async fn initialize_extensions(&self, spec: &PluginSpec) {
        if spec.state() != PluginState::Initialized {
            self.fail(
                spec,
                PluginErrorKind::InitializeFailure,
                "Cannot perform extensionsInitialized because state != Initialized".to_string(),
            )
            .await;
            return;
        }
        let Some(plugin) = spec.plugin() else {
            self.fail(
                spec,
                PluginErrorKind::InitializeFailure,
                "Internal error: have no plugin instance to perform extensionsInitialized".to_string(),
            )
            .await;
            return;
        };

        let ctx = self.context(spec);
        match guarded(plugin.extensions_initialized(&ctx)).await {
            Ok(()) => self.transition(spec, PluginState::Running).await,
            Err(panic) => {
                self.fail(
                    spec,
                    PluginErrorKind::InitializeFailure,
                    format!("extensionsInitialized panicked: {}", panic),
                )
                .await
            }
        }
    }

    // ========================================================================
    // 지연 초기화
    // ========================================================================

    /// 큐 맨 앞 플러그인 하나의 delayed_initialize 호출. 남은 작업이 있으면 true
    pub async fn delayed_initialize_tick(&self, specs: &[Arc<PluginSpec>]) -> bool {
        let Some(id) = self.delayed_queue.lock().pop_front() else {
            return false;
        };

        let spec = &specs[id.0];
        if let Some(plugin) = spec.plugin().filter(|_| spec.state() == PluginState::Running) {
            let ctx = self.context(spec);
            let again = match guarded(plugin.delayed_initialize(&ctx)).await {
                Ok(again) => again,
                Err(panic) => {
                    warn!("{}: delayedInitialize panicked: {}", spec.name(), panic);
                    false
                }
            };
            self.profiler.report("DelayedInitialize", Some(spec.name()));
            if again {
                self.delayed_queue.lock().push_front(id);
            }
        }

        !self.delayed_queue.lock().is_empty()
    }

    pub fn cancel_delayed_initialize(&self) {
        self.delayed_queue.lock().clear();
    }

    // ========================================================================
    // 종료
    // ========================================================================

    /// 로드 역순으로 종료 후 삭제
    pub async fn shutdown(&self, specs: &[Arc<PluginSpec>], queue: &[SpecId]) {
        self.cancel_delayed_initialize();
        self.event_bus
            .publish(PluginEvent::simple(EventType::ShutdownStarted))
            .await;

        for id in queue.iter().rev() {
            self.stop(&specs[id.0]).await;
        }

        for id in queue.iter().rev() {
            self.load_plugin(specs, *id, PluginState::Deleted).await;
        }

        // 중간 상태에 남은 인스턴스 정리
        for spec in specs {
            if spec.plugin().is_some() {
                self.kill(spec).await;
            }
        }

        if !self.object_pool.is_empty() {
            let names: Vec<String> = self
                .object_pool
                .all_objects()
                .iter()
                .map(|o| format!("{} ({})", o.name(), o.registrant().unwrap_or("host")))
                .collect();
            warn!(
                "There are {} objects left in the plugin manager pool: {}",
                names.len(),
                names.join(", ")
            );
        }
    }

    /// Running 플러그인 하나 종료 (비동기 종료면 타임아웃까지 대기)
    async fn stop(&self, spec: &PluginSpec) {
        if spec.state() != PluginState::Running {
            return;
        }
        let Some(plugin) = spec.plugin() else {
            return;
        };

        let ctx = self.context(spec);
        let (notifier, finished) = ShutdownNotifier::channel();
        let flag = match guarded(plugin.about_to_shutdown(&ctx, notifier)).await {
            Ok(flag) => flag,
            Err(panic) => {
                warn!("{}: aboutToShutdown panicked: {}", spec.name(), panic);
                ShutdownFlag::Synchronous
            }
        };
        self.transition(spec, PluginState::Stopped).await;

        if flag == ShutdownFlag::Asynchronous {
            let timeout = self.shutdown_timeout();
            debug!("Waiting for asynchronous shutdown of {}", spec.name());
            match tokio::time::timeout(timeout, finished).await {
                Ok(result) => {
                    if result.is_err() {
                        debug!("{} dropped its shutdown notifier", spec.name());
                    }
                    self.event_bus
                        .publish(PluginEvent::new(
                            EventType::AsynchronousShutdownFinished,
                            serde_json::json!({ "plugin": spec.name() }),
                            "plugin_manager",
                        ))
                        .await;
                }
                Err(_) => {
                    let message = format!(
                        "Plugin did not finish asynchronous shutdown within {}ms",
                        timeout.as_millis()
                    );
                    self.event_bus
                        .publish(PluginEvent::new(
                            EventType::ShutdownTimeout,
                            serde_json::json!({ "plugin": spec.name() }),
                            "plugin_manager",
                        ))
                        .await;
                    self.fail(spec, PluginErrorKind::ShutdownTimeout, message).await;
                    self.kill(spec).await;
                }
            }
        }
    }

    /// 시작 도중 실패한 플러그인 해제. 에러는 남기고 상태만 Resolved로 되돌림
    async fn discard(&self, spec: &PluginSpec) {
        let Some(loaded) = spec.take_loaded() else {
            return;
        };
        self.object_pool.remove_objects_of(spec.name());
        loaded.release(spec.name());
        self.transition(spec, PluginState::Resolved).await;
        info!("Plugin {} unloaded after failed startup", spec.name());
    }

    /// 인스턴스 강제 해제 (오브젝트 → 인스턴스 → 라이브러리 순)
    pub async fn kill(&self, spec: &PluginSpec) {
        let Some(loaded) = spec.take_loaded() else {
            return;
        };
        let removed = self.object_pool.remove_objects_of(spec.name());
        if removed > 0 {
            debug!("Removed {} objects registered by {}", removed, spec.name());
        }
        loaded.release(spec.name());
        self.transition(spec, PluginState::Deleted).await;
        info!("Plugin {} deleted", spec.name());
    }
}

/// 플러그인 훅의 패닉을 에러 문자열로 변환
async fn guarded<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}
