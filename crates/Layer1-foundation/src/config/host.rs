//! Host Config - 플러그인 호스트 설정
//!
//! 글로벌(`~/.config/extsys/config.json`)과 프로젝트(`.extsys/config.json`) 설정을
//! 병합하여 사용합니다. 파일이 없으면 기본값을 사용합니다.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 파일명
pub const HOST_CONFIG_FILE: &str = "config.json";

/// 사용자 플러그인 설정 파일명
pub const SETTINGS_FILE: &str = "settings.json";

/// 호스트 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// 플러그인 검색 경로 (발견 순서 = 경로 순서)
    #[serde(default)]
    pub plugin_paths: Vec<PathBuf>,

    /// 사용자 설정 파일 (Plugins/Ignored 등)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_settings: Option<PathBuf>,

    /// 설치 설정 파일 (기본 활성화 상태를 바꿈)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_settings: Option<PathBuf>,

    /// 비동기 종료 대기 시간 (ms)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// delayedInitialize 호출 간격 (ms)
    #[serde(default = "default_delayed_initialize_interval_ms")]
    pub delayed_initialize_interval_ms: u64,

    /// 크래시 체크 (로딩 중 락 파일)
    #[serde(default = "default_true")]
    pub crash_check: bool,
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_delayed_initialize_interval_ms() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_paths: Vec::new(),
            user_settings: None,
            install_settings: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            delayed_initialize_interval_ms: default_delayed_initialize_interval_ms(),
            crash_check: true,
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<HostConfig>(HOST_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        let project = JsonStore::project(project_root);
        if let Some(project_config) = project.load_optional::<HostConfig>(HOST_CONFIG_FILE)? {
            config.merge(project_config);
        }

        Ok(config)
    }

    /// 특정 파일에서 로드
    pub fn load_from(path: &Path) -> Result<Self> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| HOST_CONFIG_FILE.to_string());
        Ok(JsonStore::new(dir).load_or_default(&name))
    }

    /// 다른 설정을 병합 (other가 우선)
    pub fn merge(&mut self, other: HostConfig) {
        for path in other.plugin_paths {
            if !self.plugin_paths.contains(&path) {
                self.plugin_paths.push(path);
            }
        }
        if other.user_settings.is_some() {
            self.user_settings = other.user_settings;
        }
        if other.install_settings.is_some() {
            self.install_settings = other.install_settings;
        }
        self.shutdown_timeout_ms = other.shutdown_timeout_ms;
        self.delayed_initialize_interval_ms = other.delayed_initialize_interval_ms;
        self.crash_check = other.crash_check;
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn delayed_initialize_interval(&self) -> Duration {
        Duration::from_millis(self.delayed_initialize_interval_ms)
    }

    /// 사용자 설정 파일 경로 (지정되지 않으면 글로벌 디렉토리)
    pub fn user_settings_path(&self) -> Option<PathBuf> {
        self.user_settings
            .clone()
            .or_else(|| JsonStore::global().ok().map(|s| s.file_path(SETTINGS_FILE)))
    }
}
