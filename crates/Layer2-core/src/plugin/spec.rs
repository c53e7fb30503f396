//! Plugin Spec - 플러그인 레코드
//!
//! 발견된 플러그인 하나에 대한 메타데이터 + 런타임 상태입니다.
//! 매니저가 `Arc<PluginSpec>` 으로 소유하고, 상태/에러는 원자적으로 읽을 수 있습니다.
//!
//! ## 상태 전이
//!
//! ```text
//! Invalid → Read → Resolved → Loaded → Initialized → Running → Stopped → Deleted
//! ```
//!
//! 에러가 기록된 스펙은 현재 상태에 머무르며 더 이상 승격되지 않습니다.

use super::loader::LoadedPlugin;
use super::metadata::{
    DependencyKind, PluginArgumentDescription, PluginDependency, PluginMetaData,
    TermsAndConditions,
};
use super::traits::Plugin;
use super::version::satisfies;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// PluginState
// ============================================================================

/// 플러그인 상태 (순서 있음)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PluginState {
    Invalid = 0,
    Read = 1,
    Resolved = 2,
    Loaded = 3,
    Initialized = 4,
    Running = 5,
    Stopped = 6,
    Deleted = 7,
}

impl PluginState {
    fn from_bits(bits: u8) -> Self {
        match bits & STATE_MASK {
            1 => Self::Read,
            2 => Self::Resolved,
            3 => Self::Loaded,
            4 => Self::Initialized,
            5 => Self::Running,
            6 => Self::Stopped,
            7 => Self::Deleted,
            _ => Self::Invalid,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid"),
            Self::Read => write!(f, "read"),
            Self::Resolved => write!(f, "resolved"),
            Self::Loaded => write!(f, "loaded"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

const STATE_MASK: u8 = 0x0f;
const ERROR_BIT: u8 = 0x80;

// ============================================================================
// 에러
// ============================================================================

/// 플러그인 단위 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrorKind {
    MalformedMetadata,
    UnsupportedPlatform,
    MissingRequiredDependency,
    IncompatibleVersion,
    DependencyCycle,
    LoadFailure,
    InitializeFailure,
    ShutdownTimeout,
}

impl PluginErrorKind {
    /// 의존성 해석 단계에서 기록되는 에러 (재해석 시 지워짐)
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPlatform
                | Self::MissingRequiredDependency
                | Self::IncompatibleVersion
                | Self::DependencyCycle
        )
    }
}

impl std::fmt::Display for PluginErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMetadata => write!(f, "malformed metadata"),
            Self::UnsupportedPlatform => write!(f, "unsupported platform"),
            Self::MissingRequiredDependency => write!(f, "missing required dependency"),
            Self::IncompatibleVersion => write!(f, "incompatible version"),
            Self::DependencyCycle => write!(f, "dependency cycle"),
            Self::LoadFailure => write!(f, "load failure"),
            Self::InitializeFailure => write!(f, "initialize failure"),
            Self::ShutdownTimeout => write!(f, "shutdown timeout"),
        }
    }
}

/// 기록된 플러그인 에러
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecError {
    pub kind: PluginErrorKind,
    pub message: String,
}

// ============================================================================
// SpecId / ResolvedDependency
// ============================================================================

/// 스펙 식별자 (발견 순서 인덱스)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecId(pub usize);

impl std::fmt::Display for SpecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 해석된 의존성 (선언 → 대상 스펙)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub dependency: PluginDependency,
    pub spec: SpecId,
}

/// 활성화 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Enablement {
    enabled_by_default: bool,
    enabled_by_settings: bool,
    enabled_indirectly: bool,
    force_enabled: bool,
    force_disabled: bool,
}

// ============================================================================
// PluginSpec
// ============================================================================

/// 플러그인 레코드
pub struct PluginSpec {
    id: AtomicUsize,
    metadata: PluginMetaData,
    platform: Option<Regex>,
    file_path: Option<PathBuf>,
    location: String,

    /// 하위 4비트 = 상태, 최상위 비트 = 에러 여부
    status: AtomicU8,
    error: RwLock<Option<SpecError>>,
    enablement: RwLock<Enablement>,
    terms_accepted: AtomicBool,

    arguments: RwLock<Vec<String>>,
    dependency_specs: RwLock<Vec<ResolvedDependency>>,
    recommended_specs: RwLock<Vec<SpecId>>,
    loaded: RwLock<Option<LoadedPlugin>>,
}

impl PluginSpec {
    /// 새 스펙 생성 (state = Read)
    pub(crate) fn new(
        metadata: PluginMetaData,
        platform: Option<Regex>,
        file_path: Option<PathBuf>,
        location: String,
    ) -> Self {
        let enabled = !metadata.experimental && !metadata.disabled_by_default;
        Self {
            id: AtomicUsize::new(usize::MAX),
            metadata,
            platform,
            file_path,
            location,
            status: AtomicU8::new(PluginState::Read as u8),
            error: RwLock::new(None),
            enablement: RwLock::new(Enablement {
                enabled_by_default: enabled,
                enabled_by_settings: enabled,
                ..Default::default()
            }),
            terms_accepted: AtomicBool::new(false),
            arguments: RwLock::new(Vec::new()),
            dependency_specs: RwLock::new(Vec::new()),
            recommended_specs: RwLock::new(Vec::new()),
            loaded: RwLock::new(None),
        }
    }

    /// 읽기에 실패한 디스크립터용 레코드 (state = Invalid)
    pub(crate) fn invalid(name: String, location: String, file_path: Option<PathBuf>, message: String) -> Self {
        let spec = Self::new(PluginMetaData::new(name, ""), None, file_path, location);
        spec.status.store(PluginState::Invalid as u8, Ordering::Release);
        spec.report_error(PluginErrorKind::MalformedMetadata, message);
        spec
    }

    pub(crate) fn set_id(&self, id: SpecId) {
        self.id.store(id.0, Ordering::Release);
    }

    pub fn id(&self) -> SpecId {
        SpecId(self.id.load(Ordering::Acquire))
    }

    // ========================================================================
    // 메타데이터
    // ========================================================================

    pub fn metadata(&self) -> &PluginMetaData {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn compat_version(&self) -> &str {
        self.metadata.effective_compat_version()
    }

    pub fn vendor(&self) -> &str {
        &self.metadata.vendor
    }

    pub fn category(&self) -> &str {
        &self.metadata.category
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    pub fn dependencies(&self) -> &[PluginDependency] {
        &self.metadata.dependencies
    }

    pub fn argument_descriptions(&self) -> &[PluginArgumentDescription] {
        &self.metadata.arguments
    }

    pub fn terms_and_conditions(&self) -> Option<&TermsAndConditions> {
        self.metadata.terms_and_conditions.as_ref()
    }

    /// 디스크립터가 있는 디렉토리 (정적 플러그인은 "<static>")
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// 공유 라이브러리 절대 경로
    pub fn library_path(&self) -> Option<PathBuf> {
        let library = self.metadata.library.as_ref()?;
        if library.is_absolute() {
            return Some(library.clone());
        }
        Some(Path::new(&self.location).join(library))
    }

    pub fn is_required(&self) -> bool {
        self.metadata.required
    }

    pub fn is_experimental(&self) -> bool {
        self.metadata.experimental
    }

    /// 이름 + 버전 요구를 만족하는지 확인 (이름은 대소문자 무시)
    pub fn provides(&self, name: &str, version: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
            && satisfies(self.version(), self.compat_version(), version)
    }

    /// 현재 호스트 플랫폼에서 사용 가능한지
    pub fn is_available_for_host_platform(&self) -> bool {
        match &self.platform {
            Some(regex) => regex.is_match(&host_platform_name()),
            None => true,
        }
    }

    // ========================================================================
    // 상태 / 에러
    // ========================================================================

    pub fn state(&self) -> PluginState {
        PluginState::from_bits(self.status.load(Ordering::Acquire))
    }

    pub fn has_error(&self) -> bool {
        self.status.load(Ordering::Acquire) & ERROR_BIT != 0
    }

    /// 상태와 에러 여부를 한 번에 읽기
    pub fn status(&self) -> (PluginState, bool) {
        let bits = self.status.load(Ordering::Acquire);
        (PluginState::from_bits(bits), bits & ERROR_BIT != 0)
    }

    pub fn error(&self) -> Option<SpecError> {
        self.error.read().clone()
    }

    pub fn error_kind(&self) -> Option<PluginErrorKind> {
        self.error.read().as_ref().map(|e| e.kind)
    }

    pub fn error_string(&self) -> String {
        self.error
            .read()
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            let next = (current & ERROR_BIT) | state as u8;
            match self
                .status
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// 에러 기록. 이미 에러가 있으면 메시지를 덧붙임
    pub(crate) fn report_error(&self, kind: PluginErrorKind, message: impl Into<String>) {
        let message = message.into();
        let mut error = self.error.write();
        match error.as_mut() {
            Some(existing) => {
                existing.message.push('\n');
                existing.message.push_str(&message);
            }
            None => *error = Some(SpecError { kind, message }),
        }
        self.status.fetch_or(ERROR_BIT, Ordering::AcqRel);
    }

    /// 해석 단계 에러만 지움
    pub(crate) fn clear_resolution_error(&self) {
        let mut error = self.error.write();
        if error.as_ref().is_some_and(|e| e.kind.is_resolution_error()) {
            *error = None;
            self.status.fetch_and(!ERROR_BIT, Ordering::AcqRel);
        }
    }

    // ========================================================================
    // 활성화
    // ========================================================================

    pub fn is_enabled_by_default(&self) -> bool {
        self.enablement.read().enabled_by_default
    }

    pub fn is_enabled_by_settings(&self) -> bool {
        self.enablement.read().enabled_by_settings
    }

    pub fn is_enabled_indirectly(&self) -> bool {
        self.enablement.read().enabled_indirectly
    }

    pub fn is_force_enabled(&self) -> bool {
        self.enablement.read().force_enabled
    }

    pub fn is_force_disabled(&self) -> bool {
        self.enablement.read().force_disabled
    }

    /// 실효 활성화 여부
    ///
    /// 플랫폼 불가 → false, 강제/간접 활성화 → true, 강제 비활성화 → false, 그 외 설정값
    pub fn is_effectively_enabled(&self) -> bool {
        if !self.is_available_for_host_platform() {
            return false;
        }
        let flags = *self.enablement.read();
        if flags.force_enabled || flags.enabled_indirectly {
            return true;
        }
        if flags.force_disabled {
            return false;
        }
        flags.enabled_by_settings
    }

    /// 사용자 설정상 활성화 여부 변경
    pub fn set_enabled_by_settings(&self, value: bool) {
        self.enablement.write().enabled_by_settings = value;
    }

    pub(crate) fn set_enabled_by_default(&self, value: bool) {
        self.enablement.write().enabled_by_default = value;
    }

    pub(crate) fn set_enabled_indirectly(&self, value: bool) {
        self.enablement.write().enabled_indirectly = value;
    }

    pub(crate) fn set_force_enabled(&self, value: bool) {
        let mut flags = self.enablement.write();
        flags.force_enabled = value;
        if value {
            flags.force_disabled = false;
        }
    }

    pub(crate) fn set_force_disabled(&self, value: bool) {
        let mut flags = self.enablement.write();
        if value {
            flags.force_enabled = false;
        }
        flags.force_disabled = value;
    }

    pub fn terms_accepted(&self) -> bool {
        self.terms_accepted.load(Ordering::Acquire)
    }

    pub(crate) fn set_terms_accepted(&self, value: bool) {
        self.terms_accepted.store(value, Ordering::Release);
    }

    // ========================================================================
    // 인자
    // ========================================================================

    /// 커맨드라인에서 이 플러그인에 전달된 인자
    pub fn arguments(&self) -> Vec<String> {
        self.arguments.read().clone()
    }

    pub fn set_arguments(&self, arguments: Vec<String>) {
        *self.arguments.write() = arguments;
    }

    pub fn add_argument(&self, argument: impl Into<String>) {
        self.arguments.write().push(argument.into());
    }

    // ========================================================================
    // 해석된 의존성
    // ========================================================================

    /// 해석된 의존성 (state >= Resolved 일 때만 채워짐)
    pub fn dependency_specs(&self) -> Vec<ResolvedDependency> {
        self.dependency_specs.read().clone()
    }

    pub fn recommended_specs(&self) -> Vec<SpecId> {
        self.recommended_specs.read().clone()
    }

    pub(crate) fn set_dependency_specs(&self, deps: Vec<ResolvedDependency>, recommends: Vec<SpecId>) {
        *self.dependency_specs.write() = deps;
        *self.recommended_specs.write() = recommends;
    }

    /// Required 의존성 중 하나라도 `ids` 에 포함되는지
    pub fn requires_any(&self, ids: &HashSet<SpecId>) -> bool {
        self.dependency_specs
            .read()
            .iter()
            .any(|d| d.dependency.kind == DependencyKind::Required && ids.contains(&d.spec))
    }

    // ========================================================================
    // 인스턴스
    // ========================================================================

    /// 로드된 플러그인 인스턴스
    ///
    /// 반환된 `Arc` 는 종료 전에 놓아야 합니다. 공유 라이브러리 플러그인은 남은 참조가 있으면
    /// 라이브러리가 언로드되지 않습니다.
    pub fn plugin(&self) -> Option<Arc<dyn Plugin>> {
        self.loaded.read().as_ref().map(|l| l.instance.clone())
    }

    pub(crate) fn set_loaded(&self, loaded: LoadedPlugin) {
        *self.loaded.write() = Some(loaded);
    }

    pub(crate) fn take_loaded(&self) -> Option<LoadedPlugin> {
        self.loaded.write().take()
    }
}

impl std::fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSpec")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("version", &self.version())
            .field("state", &self.state())
            .field("error", &self.error())
            .finish()
    }
}

/// 호스트 플랫폼 이름 (예: "linux (x86_64)")
pub fn host_platform_name() -> String {
    format!("{} ({})", std::env::consts::OS, std::env::consts::ARCH)
}
