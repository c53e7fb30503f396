//! # Plugin System
//!
//! extsys 확장 시스템
//!
//! ## 개요
//!
//! 플러그인 디스크립터를 읽고, 의존성 그래프를 해석하고, 정해진 순서로
//! 각 플러그인을 라이프사이클 단계에 따라 진행시킵니다:
//! - 메타데이터 읽기 / 버전 호환성 검사
//! - 의존성 매칭, 순환 검출, 실패 전파
//! - 활성화 폐포 계산 (간접 활성화)
//! - 결정적 로드 순서
//! - Load → Initialize → ExtensionsInitialized → DelayedInitialize → Shutdown
//! - 플러그인 간 느슨한 연결을 위한 오브젝트 풀
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginManager                           │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │  Vec<Arc<PluginSpec>>  (발견 순서, SpecId = 인덱스)      │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │        │               │                 │                  │
//! │  DependencyResolver  enablement      scheduler              │
//! │        └───────────────┴─────────┬───────┘                  │
//! │                                  ▼                          │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │  PluginLifecycle                                       │ │
//! │  │  - PluginLoader (static / shared library)              │ │
//! │  │  - ObjectPool                                          │ │
//! │  │  - EventBus                                            │ │
//! │  │  - CrashCheck / Profiler                               │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct CorePlugin;
//!
//! #[async_trait]
//! impl Plugin for CorePlugin {
//!     async fn initialize(&self, ctx: &PluginContext, _args: &[String]) -> Result<()> {
//!         ctx.add_object(PoolObjectBuilder::new("core.settings").with::<dyn SettingsPage>(page));
//!         Ok(())
//!     }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! let manager = PluginManager::new();
//! manager.add_static_plugin(StaticPlugin::new(CORE_JSON, || Arc::new(CorePlugin)));
//! manager.resolve_dependencies();
//! manager.load_plugins().await;
//! ```

mod crashcheck;
mod discovery;
mod enablement;
mod events;
mod lifecycle;
mod loader;
mod manager;
mod metadata;
mod object_pool;
mod options;
mod profiling;
mod resolver;
mod scheduler;
mod settings;
mod spec;
mod testing;
mod traits;
mod version;

pub use crashcheck::{CrashCheck, LockFileGuard};
pub use discovery::{PluginDiscovery, PLUGIN_DESCRIPTOR_FILE};
pub use events::{EventBus, EventType, PluginEvent};
pub use loader::{
    export_plugin, DynamicLibraryLoader, LoadError, LoadedPlugin, PluginEntryFn, PluginFactory,
    PluginLoader, StaticPlugin, StaticPluginLoader, PLUGIN_ENTRY_SYMBOL,
};
pub use manager::{PluginManager, PluginSummary};
pub use metadata::{
    strip_json_comments, DependencyKind, MetadataReader, PluginArgumentDescription,
    PluginDependency, PluginMetaData, ReadError, TermsAndConditions,
};
pub use object_pool::{ObjectId, ObjectPool, PoolListener, PoolObject, PoolObjectBuilder};
pub use options::{
    OptionsParser, ParsedOptions, LOAD_OPTION, NOTEST_OPTION, NO_CRASHCHECK_OPTION,
    NO_LOAD_OPTION, PROFILE_OPTION, SCENARIO_OPTION, TEST_OPTION, TRACE_OPTION,
};
pub use profiling::Profiler;
pub use settings::{FORCE_ENABLED_KEY, IGNORED_KEY, TERMS_ACCEPTED_KEY};
pub use spec::{
    host_platform_name, PluginErrorKind, PluginSpec, PluginState, ResolvedDependency, SpecError,
    SpecId,
};
pub use testing::{ScenarioFn, TestSpec};
pub use traits::{Plugin, PluginContext, PluginTestCase, ShutdownFlag, ShutdownNotifier, TestFn};
pub use version::{compare_versions, is_valid_version, satisfies, PluginVersion};

/// 테스트/임베딩용 저수준 알고리즘 (매니저 없이 스펙 목록 위에서 동작)
pub mod algorithms {
    pub use super::enablement::{
        enable_dependencies_indirectly, plugins_required_by_plugin, plugins_requiring_plugin,
        plugins_to_enable_for_plugin,
    };
    pub use super::resolver::DependencyResolver;
    pub use super::scheduler::load_queue;
}
