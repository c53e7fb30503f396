//! Plugin Version - 버전 문자열 검증 및 비교
//!
//! 버전 형식: `MAJOR[.MINOR[.PATCH]][_BUILD]` (모두 숫자)
//!
//! 의존성 매칭은 "호환 밴드"로 결정됩니다. 플러그인은 자신의 `version`과
//! 하위 호환을 보장하는 가장 오래된 `compatVersion`을 선언하고, 요구 버전 `R`에 대해
//! `compatVersion <= R <= version` 이면 의존성을 만족합니다 (양쪽 모두 포함).

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;

lazy_static! {
    static ref VERSION_REGEX: Regex =
        Regex::new(r"^([0-9]+)(?:[.]([0-9]+))?(?:[.]([0-9]+))?(?:_([0-9]+))?$")
            .expect("version pattern is valid");
}

/// 파싱된 플러그인 버전
///
/// 생략된 구성요소는 0으로 채워지므로 `1.2` 와 `1.2.0` 은 같은 값입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PluginVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub build: u64,
}

impl PluginVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            build: 0,
        }
    }

    /// 버전 문자열 파싱 (예: "1.2.3", "4.0_2")
    pub fn parse(s: &str) -> Option<Self> {
        let caps = VERSION_REGEX.captures(s)?;
        let component = |i: usize| -> Option<u64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };

        Some(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
            build: component(4)?,
        })
    }
}

impl std::fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, "_{}", self.build)?;
        }
        Ok(())
    }
}

/// 유효한 버전 문자열인지 확인
pub fn is_valid_version(version: &str) -> bool {
    PluginVersion::parse(version).is_some()
}

/// 두 버전 문자열 비교
///
/// 어느 한쪽이라도 유효하지 않으면 `Equal` 을 반환합니다.
pub fn compare_versions(version1: &str, version2: &str) -> Ordering {
    match (PluginVersion::parse(version1), PluginVersion::parse(version2)) {
        (Some(v1), Some(v2)) => v1.cmp(&v2),
        _ => Ordering::Equal,
    }
}

/// 후보 플러그인이 요구 버전을 만족하는지 확인
///
/// `required` 가 비어 있으면 어떤 버전이든 만족합니다.
pub fn satisfies(candidate_version: &str, candidate_compat_version: &str, required: &str) -> bool {
    if required.is_empty() {
        return true;
    }
    compare_versions(candidate_version, required) != Ordering::Less
        && compare_versions(candidate_compat_version, required) != Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = PluginVersion::parse("1.2.3").unwrap();
        assert_eq!(v, PluginVersion::new(1, 2, 3));

        let v = PluginVersion::parse("4_7").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.build), (4, 0, 0, 7));
        assert_eq!(v.to_string(), "4.0.0_7");
    }

    #[test]
    fn test_valid_versions() {
        assert!(is_valid_version("1"));
        assert!(is_valid_version("1.2"));
        assert!(is_valid_version("1.2.3"));
        assert!(is_valid_version("1.2.3_4"));

        assert!(!is_valid_version(""));
        assert!(!is_valid_version("1.2.x"));
        assert!(!is_valid_version("1.2.3.4"));
        assert!(!is_valid_version("v1.0"));
        assert!(!is_valid_version("1..2"));
    }

    #[test]
    fn test_compare_numeric_segments() {
        assert_eq!(compare_versions("2.10.0", "2.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("2.9.0", "2.10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.0_2", "1.0.0_1"), Ordering::Greater);
    }

    #[test]
    fn test_compare_padding() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1", "1.0.0_0"), Ordering::Equal);
    }

    #[test]
    fn test_compare_invalid_is_equal() {
        assert_eq!(compare_versions("1.2.x", "9.9"), Ordering::Equal);
    }

    #[test]
    fn test_satisfies_band_inclusive() {
        // Core 4.2.0 은 4.0.0 까지 호환
        assert!(satisfies("4.2.0", "4.0.0", "4.0.0"));
        assert!(satisfies("4.2.0", "4.0.0", "4.1.5"));
        assert!(satisfies("4.2.0", "4.0.0", "4.2.0"));

        assert!(!satisfies("4.2.0", "4.0.0", "4.2.1"));
        assert!(!satisfies("4.2.0", "4.0.0", "3.9.9"));
    }

    #[test]
    fn test_satisfies_empty_requirement() {
        assert!(satisfies("0.1", "0.1", ""));
    }
}
