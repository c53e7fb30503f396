//! Error types for extsys
//!
//! 모든 에러를 중앙에서 관리
//!
//! 플러그인 단위의 실패(의존성 누락, 초기화 실패 등)는 이 타입으로 전파되지 않고
//! `PluginSpec`에 기록됩니다. 여기의 에러는 호스트 레벨(설정, IO, 잘못된 입력)용입니다.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// extsys 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 플러그인 관련
    // ========================================================================
    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::PluginNotFound(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::Validation(_)
                | Error::Cancelled
        )
    }

    /// 플러그인 에러 생성 헬퍼
    pub fn plugin(message: impl Into<String>) -> Self {
        Error::Plugin(message.into())
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::plugin("initialize returned false");
        assert_eq!(err.to_string(), "Plugin error: initialize returned false");
    }

    #[test]
    fn test_user_facing() {
        assert!(Error::PluginNotFound("Core".into()).is_user_facing());
        assert!(!Error::Internal("boom".into()).is_user_facing());
        assert!(Error::Timeout("shutdown".into()).is_retryable());
    }

    #[test]
    fn test_from_str() {
        let err: Error = "oops".into();
        assert!(matches!(err, Error::Internal(ref m) if m == "oops"));
    }
}
