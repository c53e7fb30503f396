//! # extsys-foundation
//!
//! Foundation layer for extsys:
//! - Error: 호스트 레벨 에러 타입
//! - Storage: JsonStore (범용), SettingsStore (플러그인 활성화 설정)
//! - Config: HostConfig (플러그인 경로, 타임아웃)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  extsys-core (PluginManager)                 │
//! │        │                     │               │
//! │        ▼                     ▼               │
//! │   HostConfig          SettingsStore          │
//! │  (config.json)   (Plugins/Ignored, ...)      │
//! │        └──────────┬──────────┘               │
//! │                   ▼                          │
//! │               JsonStore                      │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{HostConfig, HOST_CONFIG_FILE, SETTINGS_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonSettings, JsonStore, MemorySettings, SettingsStore};
