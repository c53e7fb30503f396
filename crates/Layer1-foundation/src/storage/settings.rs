//! Settings Store - 키/값 설정 저장소
//!
//! 플러그인 활성화 상태 같은 영속 설정을 `Group/Key` 형식의 키로 보관합니다.
//! 값은 문자열 리스트만 다룹니다 (`Plugins/Ignored` 등).

use super::JsonStore;
use crate::Result;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 설정 저장소 트레이트
pub trait SettingsStore: Send + Sync {
    /// 문자열 리스트 값 조회 (없으면 빈 리스트)
    fn string_list(&self, key: &str) -> Vec<String>;

    /// 문자열 리스트 값 설정
    fn set_string_list(&self, key: &str, values: Vec<String>);

    /// 키 존재 여부
    fn contains(&self, key: &str) -> bool;

    /// 키 삭제
    fn remove(&self, key: &str);

    /// 변경 사항을 영속화
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// 저장소 위치 (파일 기반인 경우)
    fn location(&self) -> Option<&Path> {
        None
    }
}

// ============================================================================
// MemorySettings - 메모리 저장소
// ============================================================================

/// 메모리 설정 저장소 (테스트 및 임시 세션용)
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Vec<String>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 값 설정
    pub fn with(self, key: &str, values: &[&str]) -> Self {
        self.set_string_list(key, values.iter().map(|v| v.to_string()).collect());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn string_list(&self, key: &str) -> Vec<String> {
        self.values.read().get(key).cloned().unwrap_or_default()
    }

    fn set_string_list(&self, key: &str, values: Vec<String>) {
        self.values.write().insert(key.to_string(), values);
    }

    fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

// ============================================================================
// JsonSettings - JSON 파일 저장소
// ============================================================================

/// JSON 파일 기반 설정 저장소
///
/// 파일 형식은 평면 객체입니다:
///
/// ```json
/// { "Plugins/Ignored": ["Welcome"], "Plugins/ForceEnabled": [] }
/// ```
pub struct JsonSettings {
    store: JsonStore,
    filename: String,
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
}

impl JsonSettings {
    /// 설정 파일 열기 (없으면 빈 설정)
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings.json".to_string());

        let store = JsonStore::new(dir);
        let values: BTreeMap<String, Value> = store.load_optional(&filename)?.unwrap_or_default();
        debug!("Opened settings {} ({} keys)", path.display(), values.len());

        Ok(Self {
            store,
            filename,
            path,
            values: RwLock::new(values),
        })
    }
}

impl SettingsStore for JsonSettings {
    fn string_list(&self, key: &str) -> Vec<String> {
        let values = self.values.read();
        match values.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            // 단일 문자열도 리스트로 취급
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            Some(Value::String(_)) | None => Vec::new(),
            Some(other) => {
                warn!("Settings key {} has unexpected value: {}", key, other);
                Vec::new()
            }
        }
    }

    fn set_string_list(&self, key: &str, values: Vec<String>) {
        let array = Value::Array(values.into_iter().map(Value::String).collect());
        self.values.write().insert(key.to_string(), array);
    }

    fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }

    fn sync(&self) -> Result<()> {
        let values = self.values.read().clone();
        self.store.save(&self.filename, &values)
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_settings() {
        let settings = MemorySettings::new().with("Plugins/Ignored", &["Welcome", "Help"]);
        assert!(settings.contains("Plugins/Ignored"));
        assert_eq!(settings.string_list("Plugins/Ignored"), vec!["Welcome", "Help"]);
        assert!(settings.string_list("Plugins/ForceEnabled").is_empty());

        settings.remove("Plugins/Ignored");
        assert!(!settings.contains("Plugins/Ignored"));
    }

    #[test]
    fn test_json_settings_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user").join("extsys.json");

        let settings = JsonSettings::open(&path).unwrap();
        settings.set_string_list("Plugins/ForceEnabled", vec!["Git".into()]);
        settings.sync().unwrap();
        assert!(path.exists());

        let reopened = JsonSettings::open(&path).unwrap();
        assert_eq!(reopened.string_list("Plugins/ForceEnabled"), vec!["Git"]);
        assert_eq!(reopened.location(), Some(path.as_path()));
    }

    #[test]
    fn test_json_settings_single_string_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"Plugins/Ignored": "Welcome"}"#).unwrap();

        let settings = JsonSettings::open(&path).unwrap();
        assert_eq!(settings.string_list("Plugins/Ignored"), vec!["Welcome"]);
    }
}
