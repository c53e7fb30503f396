//! Config - 호스트 설정 관리
//!
//! - `host.rs` - HostConfig (플러그인 경로, 설정 파일, 타임아웃)

mod host;

pub use host::{HostConfig, HOST_CONFIG_FILE, SETTINGS_FILE};
