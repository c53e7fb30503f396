//! Plugin Metadata - 플러그인 메타데이터 정의 및 읽기
//!
//! 플러그인 디스크립터(JSON)를 `PluginSpec`(state = Read)으로 변환합니다.
//!
//! ```json
//! {
//!   "name": "Git",
//!   "version": "4.2.0",
//!   "compatVersion": "4.0.0",
//!   "vendor": "extsys",
//!   "dependencies": [
//!     { "name": "Editor", "version": "4.0.0", "type": "required" }
//!   ],
//!   "recommends": ["EditorExtras"]
//! }
//! ```
//!
//! 키는 camelCase이며 `Name`, `CompatVersion` 같은 PascalCase 표기도 허용됩니다.

use super::loader::StaticPlugin;
use super::spec::PluginSpec;
use super::version::is_valid_version;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// ReadError
// ============================================================================

/// 메타데이터 읽기 에러
#[derive(Debug, Error)]
pub enum ReadError {
    /// 파일을 열 수 없음
    #[error("Cannot open file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 필수 필드 누락 또는 잘못된 값
    #[error("Malformed metadata in {location}: {message}")]
    MalformedMetadata {
        location: String,
        message: String,
        /// 파싱 실패 전에 알아낸 플러그인 이름 (있는 경우)
        name: Option<String>,
    },
}

// ============================================================================
// PluginDependency
// ============================================================================

/// 의존성 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DependencyKind {
    /// 찾지 못하면 플러그인이 Resolved로 승격되지 않음
    #[default]
    #[serde(rename = "required", alias = "Required")]
    Required,

    /// 없어도 됨. 있으면 먼저 로드됨
    #[serde(rename = "optional", alias = "Optional")]
    Optional,

    /// 테스트 실행 시에만 강제로 로드됨
    #[serde(rename = "test", alias = "Test")]
    Test,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// 플러그인 의존성
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginDependency {
    /// 의존하는 플러그인 이름
    #[serde(alias = "Name")]
    pub name: String,

    /// 요구 버전 (비어 있으면 모든 버전 허용)
    #[serde(default, alias = "Version")]
    pub version: String,

    /// 의존성 종류
    #[serde(default, rename = "type", alias = "Type")]
    pub kind: DependencyKind,
}

impl PluginDependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind: DependencyKind::Required,
        }
    }

    pub fn optional(mut self) -> Self {
        self.kind = DependencyKind::Optional;
        self
    }

    pub fn test(mut self) -> Self {
        self.kind = DependencyKind::Test;
        self
    }
}

impl std::fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}", self.name, self.version)?;
        match self.kind {
            DependencyKind::Required => {}
            DependencyKind::Optional => write!(f, ", optional")?,
            DependencyKind::Test => write!(f, ", test")?,
        }
        write!(f, ")")
    }
}

/// 플러그인이 받는 커맨드라인 인자 설명
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginArgumentDescription {
    /// 옵션 이름 (예: "-git-log-limit")
    #[serde(alias = "name", alias = "Name")]
    pub flag: String,

    /// 파라미터 이름. 비어 있으면 값을 받지 않는 플래그
    #[serde(default, alias = "Parameter")]
    pub parameter: String,

    /// 도움말
    #[serde(default, alias = "description", alias = "Description")]
    pub help: String,
}

/// 약관 (수락 전에는 설정상 활성화되지 않음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsAndConditions {
    #[serde(default, alias = "Version")]
    pub version: u32,

    #[serde(alias = "Text")]
    pub text: String,
}

// ============================================================================
// PluginMetaData - 디스크립터 구조
// ============================================================================

/// 플러그인 디스크립터 (JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetaData {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(alias = "Version")]
    pub version: String,

    /// 하위 호환을 보장하는 가장 오래된 버전 (비어 있으면 version과 동일)
    #[serde(default, alias = "CompatVersion")]
    pub compat_version: String,

    #[serde(default, alias = "Vendor")]
    pub vendor: String,

    #[serde(default, alias = "Copyright")]
    pub copyright: String,

    #[serde(default, alias = "License", deserialize_with = "string_or_lines")]
    pub license: String,

    #[serde(default, alias = "Description", deserialize_with = "string_or_lines")]
    pub description: String,

    #[serde(default, alias = "LongDescription", deserialize_with = "string_or_lines")]
    pub long_description: String,

    #[serde(default, alias = "Url")]
    pub url: String,

    #[serde(default, alias = "Category")]
    pub category: String,

    #[serde(default, alias = "Revision")]
    pub revision: String,

    /// 플랫폼 정규식 (예: "linux|macos")
    #[serde(default, alias = "Platform", skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, alias = "Required")]
    pub required: bool,

    #[serde(default, alias = "Experimental")]
    pub experimental: bool,

    #[serde(default, alias = "DisabledByDefault")]
    pub disabled_by_default: bool,

    #[serde(default, alias = "Dependencies")]
    pub dependencies: Vec<PluginDependency>,

    #[serde(default, alias = "Arguments")]
    pub arguments: Vec<PluginArgumentDescription>,

    /// 함께 활성화를 권장하는 플러그인 이름
    #[serde(default, alias = "Recommends")]
    pub recommends: Vec<String>,

    #[serde(default, alias = "TermsAndConditions", skip_serializing_if = "Option::is_none")]
    pub terms_and_conditions: Option<TermsAndConditions>,

    /// 공유 라이브러리 경로 (디스크립터 기준 상대 경로). 없으면 정적 플러그인
    #[serde(default, alias = "Library", skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
}

impl PluginMetaData {
    /// 새 메타데이터 생성
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            compat_version: String::new(),
            vendor: String::new(),
            copyright: String::new(),
            license: String::new(),
            description: String::new(),
            long_description: String::new(),
            url: String::new(),
            category: String::new(),
            revision: String::new(),
            platform: None,
            required: false,
            experimental: false,
            disabled_by_default: false,
            dependencies: vec![],
            arguments: vec![],
            recommends: vec![],
            terms_and_conditions: None,
            library: None,
        }
    }

    /// 빌더 패턴: 호환 버전 설정
    pub fn with_compat_version(mut self, version: impl Into<String>) -> Self {
        self.compat_version = version.into();
        self
    }

    /// 빌더 패턴: 의존성 추가
    pub fn with_dependency(mut self, dep: PluginDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    /// 빌더 패턴: 추천 플러그인 추가
    pub fn with_recommends(mut self, name: impl Into<String>) -> Self {
        self.recommends.push(name.into());
        self
    }

    /// 빌더 패턴: 인자 설명 추가
    pub fn with_argument(mut self, flag: &str, parameter: &str, help: &str) -> Self {
        self.arguments.push(PluginArgumentDescription {
            flag: flag.to_string(),
            parameter: parameter.to_string(),
            help: help.to_string(),
        });
        self
    }

    /// 빌더 패턴: 카테고리 설정
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// 빌더 패턴: 플랫폼 정규식 설정
    pub fn with_platform(mut self, pattern: impl Into<String>) -> Self {
        self.platform = Some(pattern.into());
        self
    }

    /// 실효 호환 버전
    pub fn effective_compat_version(&self) -> &str {
        if self.compat_version.is_empty() {
            &self.version
        } else {
            &self.compat_version
        }
    }
}

/// 문자열 또는 문자열 배열(줄 단위)을 하나의 문자열로
fn string_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lines {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Lines>::deserialize(deserializer)? {
        Some(Lines::One(s)) => s,
        Some(Lines::Many(lines)) => lines.join("\n"),
        None => String::new(),
    })
}

// ============================================================================
// MetadataReader
// ============================================================================

/// 메타데이터 리더
pub struct MetadataReader;

impl MetadataReader {
    /// 디스크립터 파일 읽기
    pub fn read(path: &Path) -> Result<PluginSpec, ReadError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let location = path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let metadata = Self::parse_str(&content, &path.display().to_string())?;
        let platform = Self::validate(&metadata, &path.display().to_string())?;

        debug!("Read plugin metadata: {} at {}", metadata.name, path.display());
        Ok(PluginSpec::new(
            metadata,
            platform,
            Some(path.to_path_buf()),
            location,
        ))
    }

    /// 정적으로 링크된 플러그인의 내장 메타데이터 읽기 (파일 IO 없음)
    pub fn read_static(plugin: &StaticPlugin) -> Result<PluginSpec, ReadError> {
        let location = "<static>";
        let metadata = Self::parse_str(plugin.metadata(), location)?;
        let platform = Self::validate(&metadata, location)?;

        debug!("Read static plugin metadata: {}", metadata.name);
        Ok(PluginSpec::new(metadata, platform, None, location.to_string()))
    }

    /// 이미 구성된 메타데이터로 스펙 생성
    pub fn from_metadata(metadata: PluginMetaData, location: &str) -> Result<PluginSpec, ReadError> {
        let platform = Self::validate(&metadata, location)?;
        Ok(PluginSpec::new(metadata, platform, None, location.to_string()))
    }

    /// JSON 문자열 파싱 (주석 허용)
    pub fn parse_str(content: &str, location: &str) -> Result<PluginMetaData, ReadError> {
        let content = strip_json_comments(content);

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ReadError::MalformedMetadata {
                location: location.to_string(),
                message: e.to_string(),
                name: None,
            })?;

        let name = value
            .get("name")
            .or_else(|| value.get("Name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        serde_json::from_value(value).map_err(|e| ReadError::MalformedMetadata {
            location: location.to_string(),
            message: e.to_string(),
            name,
        })
    }

    /// 필드 검증 및 플랫폼 정규식 컴파일
    fn validate(metadata: &PluginMetaData, location: &str) -> Result<Option<Regex>, ReadError> {
        let malformed = |message: String| ReadError::MalformedMetadata {
            location: location.to_string(),
            message,
            name: Some(metadata.name.clone()).filter(|n| !n.is_empty()),
        };

        if metadata.name.trim().is_empty() {
            return Err(malformed("\"name\" must not be empty".to_string()));
        }
        if !is_valid_version(&metadata.version) {
            return Err(malformed(format!(
                "Invalid version \"{}\"",
                metadata.version
            )));
        }
        if !metadata.compat_version.is_empty() && !is_valid_version(&metadata.compat_version) {
            return Err(malformed(format!(
                "Invalid compatVersion \"{}\"",
                metadata.compat_version
            )));
        }
        for dep in &metadata.dependencies {
            if dep.name.trim().is_empty() {
                return Err(malformed("Dependency without a name".to_string()));
            }
            if !dep.version.is_empty() && !is_valid_version(&dep.version) {
                return Err(malformed(format!(
                    "Invalid version \"{}\" for dependency \"{}\"",
                    dep.version, dep.name
                )));
            }
        }
        for arg in &metadata.arguments {
            if arg.flag.is_empty() {
                return Err(malformed("Argument without a name".to_string()));
            }
        }

        match metadata.platform.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(Some)
                .map_err(|e| malformed(format!("Invalid platform specification \"{}\": {}", pattern, e))),
            None => Ok(None),
        }
    }
}

/// JSON 주석 제거 (`//`, `/* */`). 문자열 내부는 유지
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            output.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            output.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            output.push(c);
            continue;
        }

        if !in_string && c == '/' {
            match chars.peek() {
                Some('/') => {
                    // 라인 주석 스킵
                    for c in chars.by_ref() {
                        if c == '\n' {
                            output.push(c);
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    // 블록 주석 스킵
                    chars.next();
                    let mut prev = '\0';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }

        output.push(c);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::spec::PluginState;

    const GIT_JSON: &str = r#"{
        // 버전 관리 플러그인
        "name": "Git",
        "version": "4.2.0",
        "compatVersion": "4.0.0",
        "vendor": "extsys",
        "license": ["MIT", "see LICENSE"],
        "category": "Version Control",
        "dependencies": [
            { "name": "Editor", "version": "4.0.0" },
            { "name": "Diff", "version": "1.0", "type": "optional" }
        ],
        "arguments": [
            { "name": "-git-log-limit", "parameter": "count", "description": "Log entries" }
        ],
        /* 추천 */
        "recommends": ["EditorExtras"]
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let meta = MetadataReader::parse_str(GIT_JSON, "test").unwrap();
        assert_eq!(meta.name, "Git");
        assert_eq!(meta.compat_version, "4.0.0");
        assert_eq!(meta.license, "MIT\nsee LICENSE");
        assert_eq!(meta.dependencies.len(), 2);
        assert_eq!(meta.dependencies[0].kind, DependencyKind::Required);
        assert_eq!(meta.dependencies[1].kind, DependencyKind::Optional);
        assert_eq!(meta.arguments[0].flag, "-git-log-limit");
        assert_eq!(meta.arguments[0].parameter, "count");
        assert_eq!(meta.recommends, vec!["EditorExtras"]);
    }

    #[test]
    fn test_parse_pascal_case_keys() {
        let json = r#"{
            "Name": "Core", "Version": "1.0", "CompatVersion": "1.0",
            "Dependencies": [ { "Name": "Utils", "Version": "1.0", "Type": "Test" } ]
        }"#;
        let meta = MetadataReader::parse_str(json, "test").unwrap();
        assert_eq!(meta.name, "Core");
        assert_eq!(meta.dependencies[0].kind, DependencyKind::Test);
    }

    #[test]
    fn test_missing_version_is_malformed() {
        let err = MetadataReader::parse_str(r#"{"name": "Core"}"#, "core.json").unwrap_err();
        match err {
            ReadError::MalformedMetadata { name, .. } => assert_eq!(name.as_deref(), Some("Core")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_version_is_malformed() {
        let meta = PluginMetaData::new("Core", "1.2.x");
        assert!(matches!(
            MetadataReader::from_metadata(meta, "test"),
            Err(ReadError::MalformedMetadata { .. })
        ));
    }

    #[test]
    fn test_invalid_platform_regex() {
        let meta = PluginMetaData::new("Core", "1.0").with_platform("(");
        assert!(MetadataReader::from_metadata(meta, "test").is_err());
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("git.json");
        std::fs::write(&path, GIT_JSON).unwrap();

        let spec = MetadataReader::read(&path).unwrap();
        assert_eq!(spec.name(), "Git");
        assert_eq!(spec.state(), PluginState::Read);
        assert_eq!(spec.file_path(), Some(path.as_path()));
        assert_eq!(spec.location(), dir.path().display().to_string());
    }

    #[test]
    fn test_read_missing_file() {
        let err = MetadataReader::read(Path::new("/nonexistent/plugin.json")).unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }

    #[test]
    fn test_dependency_display() {
        let dep = PluginDependency::new("Core", "1.0").optional();
        assert_eq!(dep.to_string(), "Core (1.0, optional)");
    }

    #[test]
    fn test_strip_comments_keeps_strings() {
        let out = strip_json_comments(r#"{"url": "http://x//y"} // tail"#);
        assert_eq!(out.trim(), r#"{"url": "http://x//y"}"#);
    }
}
