//! extsys-core: Extension System for extsys
//!
//! Layer2 - 플러그인 매니저 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 메타데이터, 버전 비교, 의존성 해석, 활성화 폐포, 로드 순서,
//!   라이프사이클, 오브젝트 풀, 커맨드라인 옵션
//!
//! # 사용 예시
//!
//! ```ignore
//! use extsys_core::{PluginManager, StaticPlugin};
//!
//! let manager = PluginManager::from_config(&config)?;
//! manager.add_static_plugin(StaticPlugin::new(CORE_JSON, || Arc::new(CorePlugin)));
//! manager.set_plugin_paths(config.plugin_paths.clone()).await;
//! manager.parse_options(&args, &app_options)?;
//!
//! manager.load_plugins().await;
//! for error in manager.all_errors() {
//!     eprintln!("{}", error);
//! }
//! manager.run_delayed_initialize().await;
//!
//! // 오브젝트 풀에서 확장 지점 조회
//! let pages = manager.object_pool().get_objects::<dyn SettingsPage>();
//!
//! manager.shutdown().await;
//! ```

// Core modules
pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    // Events
    EventBus,
    EventType,
    // Metadata
    MetadataReader,
    // Object pool
    ObjectPool,
    // Traits
    Plugin,
    PluginContext,
    PluginDependency,
    PluginEvent,
    // Errors
    PluginErrorKind,
    // Manager
    PluginManager,
    PluginMetaData,
    PluginSpec,
    PluginState,
    PoolObjectBuilder,
    ShutdownFlag,
    ShutdownNotifier,
    SpecId,
    // Loading
    StaticPlugin,
};

// Layer1 re-exports
pub use extsys_foundation::{Error, HostConfig, Result};

/// Layer2 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_plugin_exports() {
        let manager = PluginManager::new();
        assert!(manager.plugins().is_empty());
        assert!(manager.object_pool().is_empty());
        assert!(!manager.platform_name().is_empty());
    }

    #[test]
    fn test_empty_manager_lifecycle() {
        let manager = PluginManager::new();
        tokio_test::block_on(manager.load_plugins());
        assert!(!tokio_test::block_on(manager.delayed_initialize_tick()));
        assert!(manager.is_initialization_done());
        tokio_test::block_on(manager.shutdown());
    }
}
