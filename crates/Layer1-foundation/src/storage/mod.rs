//! Storage module for extsys
//!
//! - `json`: JSON - 범용 파일 저장/로드
//! - `settings`: 키/값 설정 저장소 (`Plugins/Ignored` 등)

mod json;
mod settings;

// JSON Storage (범용)
pub use json::JsonStore;

// Settings (플러그인 활성화 설정 영속화)
pub use settings::{JsonSettings, MemorySettings, SettingsStore};
