//! Plugin Discovery - 플러그인 디스크립터 발견
//!
//! 검색 경로에서 디스크립터 파일을 찾습니다. 지원하는 구조:
//!
//! ```text
//! plugins/
//! ├── core.json            # 단일 디스크립터 파일
//! └── git/
//!     ├── plugin.json      # 디렉토리 디스크립터
//!     └── libgit.so
//! ```
//!
//! 결과 순서 = 검색 경로 순서, 경로 안에서는 파일 경로 정렬 순. 이 순서가 발견 순서가 됩니다.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use extsys_foundation::Result;

/// 디렉토리 디스크립터 파일명
pub const PLUGIN_DESCRIPTOR_FILE: &str = "plugin.json";

/// 플러그인 발견 시스템
pub struct PluginDiscovery {
    /// 검색 경로들 (발견 순서)
    search_paths: Vec<PathBuf>,
}

impl PluginDiscovery {
    /// 새 발견 시스템 생성
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// 기본 경로: 프로젝트(.extsys/plugins) → 사용자(~/.extsys/plugins)
    pub fn with_default_paths(working_dir: &Path) -> Self {
        let mut search_paths = vec![working_dir.join(".extsys").join("plugins")];
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".extsys").join("plugins"));
        }
        Self { search_paths }
    }

    /// 검색 경로 추가
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// 모든 디스크립터 발견
    pub async fn discover(&self) -> Vec<PathBuf> {
        let mut descriptors = Vec::new();

        for path in &self.search_paths {
            if !path.exists() {
                debug!("Plugin path {} does not exist", path.display());
                continue;
            }

            match Self::scan_directory(path).await {
                Ok(found) => {
                    for descriptor in found {
                        if !descriptors.contains(&descriptor) {
                            descriptors.push(descriptor);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to scan plugin directory {}: {}", path.display(), e);
                }
            }
        }

        info!("Discovered {} plugin descriptors", descriptors.len());
        descriptors
    }

    /// 디렉토리 한 단계 스캔
    async fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                let descriptor = path.join(PLUGIN_DESCRIPTOR_FILE);
                if fs::metadata(&descriptor).await.is_ok() {
                    found.push(descriptor);
                }
            } else if path.extension().is_some_and(|e| e == "json") {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }
}
