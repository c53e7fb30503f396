//! Plugin Loader - 플러그인 코드 바인딩
//!
//! 스펙을 실제 플러그인 인스턴스로 바꿉니다. 라이프사이클 코드는 `PluginLoader` 트레이트만
//! 사용하므로, 정적 팩토리와 공유 라이브러리를 같은 방식으로 다룹니다.
//!
//! - `StaticPluginLoader`: 컴파일 시 등록된 팩토리 (이름으로 조회)
//! - `DynamicLibraryLoader`: `dynamic-plugins` feature. 공유 라이브러리의
//!   `extsys_plugin_entry` 심볼을 호출

use super::spec::PluginSpec;
use super::traits::Plugin;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "dynamic-plugins")]
use std::path::Path;

/// 공유 라이브러리 진입점 심볼
pub const PLUGIN_ENTRY_SYMBOL: &str = "extsys_plugin_entry";

/// 공유 라이브러리 진입점 시그니처
///
/// 트레이트 오브젝트는 C ABI로 넘길 수 없으므로 `export_plugin` 으로 만든 얇은 포인터를
/// 반환합니다.
///
/// ```ignore
/// #[no_mangle]
/// pub extern "C" fn extsys_plugin_entry() -> *mut std::ffi::c_void {
///     extsys_core::plugin::export_plugin(Box::new(MyPlugin::default()))
/// }
/// ```
pub type PluginEntryFn = unsafe extern "C" fn() -> *mut c_void;

/// 진입점에서 반환할 포인터 생성 (`Box<Box<dyn Plugin>>` 의 얇은 포인터)
pub fn export_plugin(plugin: Box<dyn Plugin>) -> *mut c_void {
    Box::into_raw(Box::new(plugin)).cast()
}

/// `export_plugin` 으로 만든 포인터를 되돌림
///
/// # Safety
/// `ptr` 은 null 이거나 같은 크레이트 버전의 `export_plugin` 이 반환한 포인터여야 하며,
/// 한 번만 넘겨야 합니다.
#[cfg_attr(not(feature = "dynamic-plugins"), allow(dead_code))]
unsafe fn import_plugin(ptr: *mut c_void) -> Option<Box<dyn Plugin>> {
    if ptr.is_null() {
        return None;
    }
    Some(*Box::from_raw(ptr.cast::<Box<dyn Plugin>>()))
}

/// 정적 플러그인 팩토리
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

// ============================================================================
// LoadError / LoadedPlugin
// ============================================================================

/// 로드 에러
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No plugin factory registered for \"{0}\"")]
    NoFactory(String),

    #[error("Failed to load library {path}: {message}")]
    Library { path: String, message: String },

    #[error("Missing entry point '{symbol}' in {path}")]
    MissingEntryPoint { path: String, symbol: String },

    #[error("Entry point of {0} returned no plugin instance")]
    NullInstance(String),

    #[error("Dynamic plugins require the 'dynamic-plugins' feature ({0})")]
    Unsupported(String),
}

/// 로드된 플러그인
///
/// 필드 선언 순서대로 drop 되므로 인스턴스가 라이브러리보다 먼저 해제됩니다.
/// 라이브러리에서 온 인스턴스의 `Arc` 를 종료 이후까지 들고 있으면 안 됩니다.
/// `release` 는 그런 참조가 남아 있으면 라이브러리를 언로드하지 않습니다.
pub struct LoadedPlugin {
    pub instance: Arc<dyn Plugin>,
    library: Option<Box<dyn Any + Send + Sync>>,
}

impl LoadedPlugin {
    pub fn from_instance(instance: Arc<dyn Plugin>) -> Self {
        Self {
            instance,
            library: None,
        }
    }

    /// 라이브러리 핸들과 함께 생성 (핸들은 인스턴스 이후에 해제)
    pub fn with_library(instance: Arc<dyn Plugin>, library: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            instance,
            library: Some(library),
        }
    }

    pub fn has_library(&self) -> bool {
        self.library.is_some()
    }

    /// 인스턴스 → 라이브러리 순으로 해제
    ///
    /// 인스턴스 참조가 밖에 남아 있으면 그 코드가 계속 매핑되도록 라이브러리를 누수시킵니다.
    pub(crate) fn release(self, plugin: &str) {
        let Self { instance, library } = self;
        let outstanding = Arc::strong_count(&instance) - 1;
        drop(instance);

        if let Some(library) = library {
            if outstanding > 0 {
                warn!(
                    "{} references to plugin {} are still alive, keeping its library loaded",
                    outstanding, plugin
                );
                std::mem::forget(library);
            }
        }
    }
}

// ============================================================================
// PluginLoader 트레이트
// ============================================================================

/// 플러그인 로더
pub trait PluginLoader: Send + Sync {
    /// 로더 이름 (로깅용)
    fn name(&self) -> &str;

    /// 이 로더가 스펙을 처리할 수 있는지
    fn can_load(&self, spec: &PluginSpec) -> bool;

    /// 코드를 바인딩하고 인스턴스 생성
    fn load(&self, spec: &PluginSpec) -> Result<LoadedPlugin, LoadError>;
}

// ============================================================================
// StaticPlugin / StaticPluginLoader
// ============================================================================

/// 정적으로 링크된 플러그인 (내장 메타데이터 + 팩토리)
#[derive(Clone)]
pub struct StaticPlugin {
    metadata: String,
    factory: PluginFactory,
}

impl StaticPlugin {
    pub fn new<F>(metadata: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        Self {
            metadata: metadata.into(),
            factory: Arc::new(factory),
        }
    }

    /// 내장 메타데이터 (JSON)
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn factory(&self) -> PluginFactory {
        self.factory.clone()
    }
}

/// 정적 팩토리 로더
#[derive(Default)]
pub struct StaticPluginLoader {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리 등록 (이름은 대소문자 무시)
    pub fn register(&self, name: &str, factory: PluginFactory) {
        let key = name.to_lowercase();
        if self.factories.write().insert(key, factory).is_some() {
            debug!("Replaced plugin factory for {}", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(&name.to_lowercase())
    }
}

impl PluginLoader for StaticPluginLoader {
    fn name(&self) -> &str {
        "static"
    }

    fn can_load(&self, spec: &PluginSpec) -> bool {
        self.contains(spec.name())
    }

    fn load(&self, spec: &PluginSpec) -> Result<LoadedPlugin, LoadError> {
        let factory = self
            .factories
            .read()
            .get(&spec.name().to_lowercase())
            .cloned()
            .ok_or_else(|| LoadError::NoFactory(spec.name().to_string()))?;

        Ok(LoadedPlugin::from_instance(factory()))
    }
}

// ============================================================================
// DynamicLibraryLoader
// ============================================================================

/// 공유 라이브러리 로더
#[derive(Default)]
pub struct DynamicLibraryLoader;

impl DynamicLibraryLoader {
    pub fn new() -> Self {
        Self
    }

    #[cfg(feature = "dynamic-plugins")]
    fn load_library(&self, path: &Path) -> Result<LoadedPlugin, LoadError> {
        use libloading::Library;

        // SAFETY: 플러그인 라이브러리는 `PluginEntryFn` 시그니처로 진입점을 내보내야 함.
        // 같은 컴파일러/크레이트 버전으로 빌드된 라이브러리만 지원.
        unsafe {
            let library = Library::new(path).map_err(|e| LoadError::Library {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

            let entry: libloading::Symbol<PluginEntryFn> = library
                .get(PLUGIN_ENTRY_SYMBOL.as_bytes())
                .map_err(|_| LoadError::MissingEntryPoint {
                    path: path.display().to_string(),
                    symbol: PLUGIN_ENTRY_SYMBOL.to_string(),
                })?;

            let Some(plugin) = import_plugin(entry()) else {
                return Err(LoadError::NullInstance(path.display().to_string()));
            };
            let instance: Arc<dyn Plugin> = Arc::from(plugin);
            Ok(LoadedPlugin::with_library(instance, Box::new(library)))
        }
    }
}

impl PluginLoader for DynamicLibraryLoader {
    fn name(&self) -> &str {
        "library"
    }

    fn can_load(&self, spec: &PluginSpec) -> bool {
        spec.library_path().is_some()
    }

    fn load(&self, spec: &PluginSpec) -> Result<LoadedPlugin, LoadError> {
        let Some(path) = spec.library_path() else {
            return Err(LoadError::NoFactory(spec.name().to_string()));
        };

        #[cfg(feature = "dynamic-plugins")]
        {
            debug!("Loading library {}", path.display());
            self.load_library(&path)
        }

        #[cfg(not(feature = "dynamic-plugins"))]
        {
            Err(LoadError::Unsupported(path.display().to_string()))
        }
    }
}
