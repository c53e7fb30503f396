//! Crash Check - 로딩 중 크래시한 플러그인 감지
//!
//! 각 라이프사이클 단계 동안 락 파일에 플러그인 이름을 기록하고 단계가 끝나면 지웁니다.
//! 다음 시작 때 락 파일이 남아 있으면 그 플러그인이 이전 실행을 죽인 것으로 간주합니다.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// 크래시 체크
pub struct CrashCheck {
    path: Mutex<Option<PathBuf>>,
    enabled: AtomicBool,
}

impl CrashCheck {
    pub fn new(enabled: bool) -> Self {
        Self {
            path: Mutex::new(None),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// 락 파일 경로 설정 (보통 사용자 설정 파일 + ".lock")
    pub fn set_lock_file(&self, path: impl Into<PathBuf>) {
        *self.path.lock() = Some(path.into());
    }

    /// 설정 파일 경로로부터 락 파일 경로 유도
    pub fn lock_file_for(settings: &Path) -> PathBuf {
        let mut name = settings.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed) && self.path.lock().is_some()
    }

    pub fn lock_file(&self) -> Option<PathBuf> {
        self.path.lock().clone()
    }

    /// 이전 실행에서 남은 플러그인 이름 (확인 후 락 파일 삭제)
    pub fn take_problematic_plugin(&self) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let path = self.lock_file()?;
        let name = std::fs::read_to_string(&path).ok()?;
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove lock file {}: {}", path.display(), e);
        }
        let name = name.trim().to_string();
        (!name.is_empty()).then_some(name)
    }

    /// 단계 시작. 반환된 가드가 drop 될 때 락 파일 삭제
    pub fn guard(&self, plugin: &str) -> LockFileGuard {
        if !self.is_enabled() {
            return LockFileGuard { path: None };
        }
        let Some(path) = self.lock_file() else {
            return LockFileGuard { path: None };
        };

        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match std::fs::write(&path, plugin) {
            Ok(()) => LockFileGuard { path: Some(path) },
            Err(e) => {
                debug!("Cannot write lock file {}: {}", path.display(), e);
                LockFileGuard { path: None }
            }
        }
    }
}

/// 락 파일 가드
#[must_use]
pub struct LockFileGuard {
    path: Option<PathBuf>,
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let check = CrashCheck::new(true);
        check.set_lock_file(dir.path().join("settings.json.lock"));

        {
            let _guard = check.guard("Git");
            assert_eq!(
                std::fs::read_to_string(dir.path().join("settings.json.lock")).unwrap(),
                "Git"
            );
        }
        assert!(!dir.path().join("settings.json.lock").exists());
        assert_eq!(check.take_problematic_plugin(), None);
    }

    #[test]
    fn test_leftover_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = CrashCheck::lock_file_for(&dir.path().join("settings.json"));
        std::fs::write(&lock, "Crashy\n").unwrap();

        let check = CrashCheck::new(true);
        check.set_lock_file(&lock);
        assert_eq!(check.take_problematic_plugin().as_deref(), Some("Crashy"));
        assert!(!lock.exists());
    }

    #[test]
    fn test_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let check = CrashCheck::new(false);
        check.set_lock_file(dir.path().join("x.lock"));
        let _guard = check.guard("Git");
        assert!(!dir.path().join("x.lock").exists());
    }
}
