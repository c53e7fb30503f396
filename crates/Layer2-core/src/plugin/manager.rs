//! Plugin Manager - 플러그인 시스템 전체 관리
//!
//! 전역 싱글톤 없이 명시적으로 생성해서 넘겨주는 컨텍스트 객체입니다.
//! 모든 메서드는 `&self` 로 호출 가능하며 내부 상태는 락으로 보호됩니다
//! (await 지점을 넘어서 락을 잡지 않습니다).
//!
//! ```ignore
//! let manager = PluginManager::from_config(&config)?;
//! manager.add_static_plugin(core_plugin());
//! manager.set_plugin_paths(config.plugin_paths.clone()).await;
//! manager.parse_options(&args, &app_options)?;
//! manager.load_plugins().await;
//! manager.run_delayed_initialize().await;
//! // ...
//! manager.shutdown().await;
//! ```

use super::crashcheck::CrashCheck;
use super::discovery::PluginDiscovery;
use super::enablement;
use super::events::{EventBus, EventType, PluginEvent};
use super::lifecycle::PluginLifecycle;
use super::loader::{DynamicLibraryLoader, PluginLoader, StaticPlugin, StaticPluginLoader};
use super::metadata::{MetadataReader, ReadError};
use super::object_pool::ObjectPool;
use super::options::{OptionsParser, ParsedOptions};
use super::profiling::Profiler;
use super::resolver::DependencyResolver;
use super::scheduler;
use super::settings;
use super::spec::{host_platform_name, PluginSpec, PluginState, SpecId};
use super::testing::{self, ScenarioFn, ScenarioRegistry, TestSpec};
use super::traits::Plugin;
use extsys_foundation::{Error, HostConfig, JsonSettings, Result, SettingsStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PWD_KEYWORD: &str = ":pwd";
const ARGUMENTS_KEYWORD: &str = ":arguments";
const SERIALIZED_SEPARATOR: char = '|';

/// 플러그인 매니저
pub struct PluginManager {
    /// 발견 순서대로 (SpecId = 인덱스)
    specs: RwLock<Vec<Arc<PluginSpec>>>,

    plugin_paths: RwLock<Vec<PathBuf>>,
    static_loader: Arc<StaticPluginLoader>,
    object_pool: Arc<ObjectPool>,
    event_bus: Arc<EventBus>,
    profiler: Arc<Profiler>,
    crash_check: Arc<CrashCheck>,
    lifecycle: PluginLifecycle,

    user_settings: RwLock<Option<Arc<dyn SettingsStore>>>,
    install_settings: RwLock<Option<Arc<dyn SettingsStore>>>,

    test_specs: RwLock<Vec<TestSpec>>,
    scenarios: ScenarioRegistry,

    /// 플러그인에 속하지 않은 인자
    arguments: RwLock<Vec<String>>,
    arguments_for_restart: RwLock<Vec<String>>,

    delayed_interval: RwLock<Duration>,
    initialization_done: AtomicBool,
}

impl PluginManager {
    /// 기본 설정으로 생성 (설정 저장소 없음)
    pub fn new() -> Self {
        Self::with_config(&HostConfig::default())
    }

    /// 설정으로 생성 (설정 파일은 열지 않음)
    pub fn with_config(config: &HostConfig) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let object_pool = Arc::new(ObjectPool::new().with_event_bus(event_bus.clone()));
        let static_loader = Arc::new(StaticPluginLoader::new());
        let profiler = Arc::new(Profiler::new());
        let crash_check = Arc::new(CrashCheck::new(config.crash_check));

        let lifecycle = PluginLifecycle::new(
            static_loader.clone(),
            Arc::new(DynamicLibraryLoader::new()),
            object_pool.clone(),
            event_bus.clone(),
            profiler.clone(),
            crash_check.clone(),
            config.shutdown_timeout(),
        );

        Self {
            specs: RwLock::new(Vec::new()),
            plugin_paths: RwLock::new(Vec::new()),
            static_loader,
            object_pool,
            event_bus,
            profiler,
            crash_check,
            lifecycle,
            user_settings: RwLock::new(None),
            install_settings: RwLock::new(None),
            test_specs: RwLock::new(Vec::new()),
            scenarios: ScenarioRegistry::new(),
            arguments: RwLock::new(Vec::new()),
            arguments_for_restart: RwLock::new(Vec::new()),
            delayed_interval: RwLock::new(config.delayed_initialize_interval()),
            initialization_done: AtomicBool::new(false),
        }
    }

    /// 설정으로 생성하고 사용자/설치 설정 파일을 연결
    pub fn from_config(config: &HostConfig) -> Result<Self> {
        let manager = Self::with_config(config);

        if let Some(path) = config.user_settings_path() {
            manager.crash_check.set_lock_file(CrashCheck::lock_file_for(&path));
            manager.set_user_settings(Arc::new(JsonSettings::open(path)?));
        }
        if let Some(path) = &config.install_settings {
            manager.set_install_settings(Arc::new(JsonSettings::open(path)?));
        }

        Ok(manager)
    }

    // ========================================================================
    // 구성
    // ========================================================================

    pub fn set_user_settings(&self, settings: Arc<dyn SettingsStore>) {
        *self.user_settings.write() = Some(settings);
    }

    pub fn set_install_settings(&self, settings: Arc<dyn SettingsStore>) {
        *self.install_settings.write() = Some(settings);
    }

    pub fn user_settings(&self) -> Option<Arc<dyn SettingsStore>> {
        self.user_settings.read().clone()
    }

    /// 공유 라이브러리 로더 교체
    pub fn set_library_loader(&self, loader: Arc<dyn PluginLoader>) {
        self.lifecycle.set_library_loader(loader);
    }

    pub fn set_shutdown_timeout(&self, timeout: Duration) {
        self.lifecycle.set_shutdown_timeout(timeout);
    }

    pub fn set_delayed_initialize_interval(&self, interval: Duration) {
        *self.delayed_interval.write() = interval;
    }

    // ========================================================================
    // 플러그인 등록 / 발견
    // ========================================================================

    /// 정적 플러그인 등록
    pub fn add_static_plugin(&self, plugin: StaticPlugin) -> SpecId {
        match MetadataReader::read_static(&plugin) {
            Ok(spec) => {
                self.static_loader.register(spec.name(), plugin.factory());
                self.add_spec(spec)
            }
            Err(e) => self.add_read_error(e),
        }
    }

    /// 정적 팩토리만 등록 (디스크립터는 디스크에서 발견)
    pub fn register_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.static_loader.register(name, Arc::new(factory));
    }

    /// 스펙 추가 (발견 순서 = 추가 순서)
    pub fn add_spec(&self, spec: PluginSpec) -> SpecId {
        let mut specs = self.specs.write();
        let id = SpecId(specs.len());
        spec.set_id(id);
        debug!("Added plugin spec {} {}", spec.name(), id);
        specs.push(Arc::new(spec));
        id
    }

    fn add_read_error(&self, error: ReadError) -> SpecId {
        warn!("{}", error);
        let spec = match &error {
            ReadError::MalformedMetadata { location, name, .. } => PluginSpec::invalid(
                name.clone().unwrap_or_else(|| location.clone()),
                location.clone(),
                Some(PathBuf::from(location)).filter(|p| p.exists()),
                error.to_string(),
            ),
            ReadError::Io { path, .. } => PluginSpec::invalid(
                path.display().to_string(),
                path.display().to_string(),
                Some(path.clone()),
                error.to_string(),
            ),
        };
        self.add_spec(spec)
    }

    /// 검색 경로 설정 후 발견 → 읽기 → 설정 적용 → 해석
    pub async fn set_plugin_paths(&self, paths: Vec<PathBuf>) {
        *self.plugin_paths.write() = paths.clone();

        let descriptors = PluginDiscovery::new(paths).discover().await;
        let first_new = self.specs.read().len();
        for path in descriptors {
            match MetadataReader::read(&path) {
                Ok(spec) => {
                    self.add_spec(spec);
                }
                Err(e) => {
                    self.add_read_error(e);
                }
            }
        }

        let new_specs: Vec<Arc<PluginSpec>> = self.specs.read()[first_new..].to_vec();
        self.read_settings(&new_specs);
        self.resolve_dependencies();

        let count = self.specs.read().len();
        self.event_bus
            .publish(PluginEvent::new(
                EventType::PluginsChanged,
                serde_json::json!({ "count": count }),
                "plugin_manager",
            ))
            .await;
    }

    pub fn plugin_paths(&self) -> Vec<PathBuf> {
        self.plugin_paths.read().clone()
    }

    /// 새로 추가된 스펙 없이 현재 스펙 전체에 설정 재적용
    pub fn apply_settings(&self) {
        let specs = self.plugins();
        self.read_settings(&specs);
        self.enable_dependencies_indirectly();
    }

    fn read_settings(&self, specs: &[Arc<PluginSpec>]) {
        let install = self.install_settings.read().clone();
        let user = self.user_settings.read().clone();
        settings::read_settings(specs, install.as_deref(), user.as_deref());
    }

    /// 현재 활성화 상태를 사용자 설정에 저장
    pub fn write_settings(&self) -> Result<()> {
        let user = self
            .user_settings()
            .ok_or_else(|| Error::Config("No user settings store configured".to_string()))?;
        settings::write_settings(&self.plugins(), user.as_ref())
    }

    /// 약관 수락 처리 후 설정상 활성화
    pub fn accept_terms_and_conditions(&self, spec: &PluginSpec) {
        spec.set_terms_accepted(true);
        spec.set_enabled_by_settings(true);
    }

    // ========================================================================
    // 해석 / 활성화
    // ========================================================================

    /// 의존성 전체 재해석 + 간접 활성화 재계산
    pub fn resolve_dependencies(&self) {
        let specs = self.plugins();
        let tested = self.tested_ids();
        DependencyResolver::new(&specs, &tested).resolve();
        enablement::enable_dependencies_indirectly(&specs, &tested);
    }

    pub fn enable_dependencies_indirectly(&self) {
        let specs = self.plugins();
        enablement::enable_dependencies_indirectly(&specs, &self.tested_ids());
    }

    fn tested_ids(&self) -> HashSet<SpecId> {
        self.test_specs.read().iter().map(|t| t.spec).collect()
    }

    fn load_queue_ids(&self) -> Vec<SpecId> {
        scheduler::load_queue(&self.plugins())
    }

    /// 로드 순서 (의존 대상이 먼저)
    pub fn load_queue(&self) -> Vec<Arc<PluginSpec>> {
        self.ids_to_specs(self.load_queue_ids())
    }

    fn ids_to_specs(&self, ids: Vec<SpecId>) -> Vec<Arc<PluginSpec>> {
        let specs = self.specs.read();
        ids.into_iter().map(|id| specs[id.0].clone()).collect()
    }

    /// `spec` 을 켜려면 함께 켜야 하는 플러그인
    pub fn plugins_to_enable_for_plugin(&self, spec: &PluginSpec) -> Vec<Arc<PluginSpec>> {
        let ids = enablement::plugins_to_enable_for_plugin(&self.plugins(), spec.id());
        self.ids_to_specs(ids)
    }

    /// `spec` 이 (직간접적으로) 필요로 하는 플러그인
    pub fn plugins_required_by_plugin(&self, spec: &PluginSpec) -> Vec<Arc<PluginSpec>> {
        let ids = enablement::plugins_required_by_plugin(&self.plugins(), spec.id());
        self.ids_to_specs(ids)
    }

    /// `spec` 을 (직간접적으로) 필요로 하는 플러그인
    pub fn plugins_requiring_plugin(&self, spec: &PluginSpec) -> Vec<Arc<PluginSpec>> {
        let specs = self.plugins();
        let order = scheduler::load_queue(&specs);
        let ids = enablement::plugins_requiring_plugin(&specs, &order, spec.id());
        self.ids_to_specs(ids)
    }

    // ========================================================================
    // 라이프사이클
    // ========================================================================

    /// 이전 실행에서 크래시한 플러그인이 있으면 이번 실행에서 끔
    pub fn check_for_problematic_plugins(&self) -> Option<String> {
        let name = self.crash_check.take_problematic_plugin()?;
        if let Some(spec) = self.plugin_by_name(&name) {
            warn!(
                "Plugin {} crashed during the previous start and is disabled for this session",
                name
            );
            spec.set_enabled_by_settings(false);
            self.enable_dependencies_indirectly();
        }
        Some(name)
    }

    /// 로드 큐 전체를 Running까지 진행
    pub async fn load_plugins(&self) {
        self.check_for_problematic_plugins();

        let specs = self.plugins();
        let queue = scheduler::load_queue(&specs);
        info!("Loading {} plugins", queue.len());
        self.lifecycle.load_all(&specs, &queue).await;

        for error in self.all_errors() {
            warn!("{}", error);
        }
    }

    /// 지연 초기화 한 틱. 남은 작업이 있으면 true
    pub async fn delayed_initialize_tick(&self) -> bool {
        let specs = self.plugins();
        let more = self.lifecycle.delayed_initialize_tick(&specs).await;
        if !more {
            self.finish_initialization().await;
        }
        more
    }

    /// 큐가 빌 때까지 설정된 간격으로 지연 초기화 실행
    pub async fn run_delayed_initialize(&self) {
        let mut interval = tokio::time::interval(*self.delayed_interval.read());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if !self.delayed_initialize_tick().await {
                break;
            }
        }
    }

    async fn finish_initialization(&self) {
        if self.initialization_done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.profiler.report("DelayedInitialize done", None);
        self.profiler.print_summary();
        info!("Plugin initialization done");
        self.event_bus
            .publish(PluginEvent::simple(EventType::InitializationDone))
            .await;
    }

    pub fn is_initialization_done(&self) -> bool {
        self.initialization_done.load(Ordering::Acquire)
    }

    /// 로드 역순으로 종료 및 삭제
    pub async fn shutdown(&self) {
        let specs = self.plugins();
        let queue = scheduler::load_queue(&specs);
        info!("Shutting down {} plugins", queue.len());
        self.lifecycle.shutdown(&specs, &queue).await;
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 모든 스펙 (발견 순서)
    pub fn plugins(&self) -> Vec<Arc<PluginSpec>> {
        self.specs.read().clone()
    }

    pub fn spec(&self, id: SpecId) -> Option<Arc<PluginSpec>> {
        self.specs.read().get(id.0).cloned()
    }

    /// 이름으로 조회 (대소문자 무시)
    pub fn plugin_by_name(&self, name: &str) -> Option<Arc<PluginSpec>> {
        self.specs
            .read()
            .iter()
            .find(|s| s.state() != PluginState::Invalid && s.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// 인스턴스로 스펙 조회
    pub fn spec_for_plugin(&self, plugin: &Arc<dyn Plugin>) -> Option<Arc<PluginSpec>> {
        let target = Arc::as_ptr(plugin) as *const ();
        self.specs
            .read()
            .iter()
            .find(|s| {
                s.plugin()
                    .is_some_and(|p| Arc::as_ptr(&p) as *const () == target)
            })
            .cloned()
    }

    /// 카테고리별 묶음
    pub fn plugin_collections(&self) -> BTreeMap<String, Vec<Arc<PluginSpec>>> {
        let mut collections: BTreeMap<String, Vec<Arc<PluginSpec>>> = BTreeMap::new();
        for spec in self.specs.read().iter() {
            collections
                .entry(spec.category().to_string())
                .or_default()
                .push(spec.clone());
        }
        collections
    }

    /// 실효 활성화된 스펙 중 에러가 있는지
    pub fn has_error(&self) -> bool {
        self.specs
            .read()
            .iter()
            .any(|s| s.has_error() && s.is_effectively_enabled())
    }

    /// "이름: 에러" 목록 (실효 활성화된 스펙만)
    pub fn all_errors(&self) -> Vec<String> {
        self.specs
            .read()
            .iter()
            .filter(|s| s.has_error() && s.is_effectively_enabled())
            .map(|s| format!("{}: {}", s.name(), s.error_string()))
            .collect()
    }

    pub fn object_pool(&self) -> &Arc<ObjectPool> {
        &self.object_pool
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    pub fn crash_check(&self) -> &Arc<CrashCheck> {
        &self.crash_check
    }

    pub fn platform_name(&self) -> String {
        host_platform_name()
    }

    pub fn summary(&self) -> PluginSummary {
        let specs = self.specs.read();
        PluginSummary {
            total: specs.len(),
            enabled: specs.iter().filter(|s| s.is_effectively_enabled()).count(),
            running: specs
                .iter()
                .filter(|s| s.state() == PluginState::Running)
                .count(),
            errors: specs.iter().filter(|s| s.has_error()).count(),
        }
    }

    // ========================================================================
    // 인자
    // ========================================================================

    /// 커맨드라인 파싱 (플러그인 인자, -load/-noload, -test 등)
    pub fn parse_options(
        &self,
        args: &[String],
        app_options: &BTreeMap<String, bool>,
    ) -> Result<ParsedOptions> {
        OptionsParser::new(self, args, app_options).parse()
    }

    pub fn arguments(&self) -> Vec<String> {
        self.arguments.read().clone()
    }

    pub(crate) fn add_argument(&self, argument: impl Into<String>) {
        self.arguments.write().push(argument.into());
    }

    /// 재시작 시 다시 전달해야 하는 인자
    pub fn arguments_for_restart(&self) -> Vec<String> {
        self.arguments_for_restart.read().clone()
    }

    pub(crate) fn add_arguments_for_restart(&self, arguments: &[String]) {
        self.arguments_for_restart
            .write()
            .extend(arguments.iter().cloned());
    }

    /// 다른 프로세스로 보낼 인자 직렬화
    ///
    /// `:Plugin|arg|arg|:pwd|<dir>|:arguments|arg` 형식
    pub fn serialized_arguments(&self) -> String {
        let separator = SERIALIZED_SEPARATOR.to_string();
        let mut parts: Vec<String> = Vec::new();

        for spec in self.specs.read().iter() {
            let arguments = spec.arguments();
            if !arguments.is_empty() {
                parts.push(format!(":{}", spec.name()));
                parts.extend(arguments);
            }
        }

        parts.push(PWD_KEYWORD.to_string());
        parts.push(
            std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        );

        let arguments = self.arguments();
        if !arguments.is_empty() {
            parts.push(ARGUMENTS_KEYWORD.to_string());
            parts.extend(arguments);
        }

        parts.join(&separator)
    }

    /// 직렬화된 인자를 Running 플러그인들에 전달
    pub async fn remote_arguments(&self, serialized: &str) {
        if serialized.is_empty() {
            return;
        }
        let parts: Vec<String> = serialized
            .split(SERIALIZED_SEPARATOR)
            .map(str::to_string)
            .collect();

        let working_dir = sub_list(&parts, PWD_KEYWORD)
            .into_iter()
            .next()
            .map(PathBuf::from)
            .unwrap_or_default();
        let arguments = sub_list(&parts, ARGUMENTS_KEYWORD);

        for spec in self.plugins() {
            if spec.state() != PluginState::Running {
                continue;
            }
            let Some(plugin) = spec.plugin() else {
                continue;
            };
            let options = sub_list(&parts, &format!(":{}", spec.name()));
            let ctx = super::traits::PluginContext::new(
                spec.name(),
                self.object_pool.clone(),
                self.event_bus.clone(),
            );
            plugin
                .remote_command(&ctx, &options, Path::new(&working_dir), &arguments)
                .await;
        }
    }

    // ========================================================================
    // 테스트 / 시나리오
    // ========================================================================

    pub(crate) fn set_test_specs(&self, tests: Vec<TestSpec>) {
        *self.test_specs.write() = tests;
    }

    pub fn test_specs(&self) -> Vec<TestSpec> {
        self.test_specs.read().clone()
    }

    pub fn test_run_requested(&self) -> bool {
        !self.test_specs.read().is_empty()
    }

    /// 요청된 테스트 실행. 실패 수 반환
    pub async fn run_tests(&self) -> usize {
        let specs = self.plugins();
        let tests = self.test_specs();
        let failed = testing::run_tests(&specs, &tests);
        self.event_bus
            .publish(PluginEvent::new(
                EventType::TestsFinished,
                serde_json::json!({ "failed": failed }),
                "plugin_manager",
            ))
            .await;
        failed
    }

    pub fn register_scenario(&self, id: &str, scenario: ScenarioFn) -> bool {
        self.scenarios.register(id, scenario)
    }

    pub(crate) fn request_scenario(&self, id: &str) -> std::result::Result<(), String> {
        self.scenarios.request(id)
    }

    pub fn requested_scenario(&self) -> Option<String> {
        self.scenarios.requested()
    }

    pub fn is_scenario_requested(&self) -> bool {
        self.scenarios.requested().is_some()
    }

    pub fn run_scenario(&self) -> bool {
        self.scenarios.run()
    }

    pub fn is_scenario_running(&self, id: &str) -> bool {
        self.scenarios.is_running(id)
    }

    pub async fn finish_scenario(&self) -> bool {
        let finished = self.scenarios.finish();
        if finished {
            self.event_bus
                .publish(PluginEvent::simple(EventType::ScenarioFinished))
                .await;
        }
        finished
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 키워드 다음부터 다음 키워드(`:` 로 시작) 전까지
fn sub_list(parts: &[String], key: &str) -> Vec<String> {
    let Some(position) = parts.iter().position(|p| p == key) else {
        return Vec::new();
    };
    parts[position + 1..]
        .iter()
        .take_while(|p| !p.starts_with(':'))
        .cloned()
        .collect()
}

/// 플러그인 시스템 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSummary {
    pub total: usize,
    pub enabled: usize,
    pub running: usize,
    pub errors: usize,
}
