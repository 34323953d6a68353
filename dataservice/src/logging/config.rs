//! 로깅 설정 관리

use serde::{Deserialize, Serialize};

/// 로깅 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 기본 필터 지시자 (RUST_LOG가 있으면 무시됨, 기본값: "info")
    pub level: String,

    /// ANSI 색상 출력 여부 (기본값: true)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        Self::from_values(std::env::var("LOG_LEVEL").ok(), std::env::var("LOG_ANSI").ok())
    }

    fn from_values(level: Option<String>, ansi: Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = level.filter(|v| !v.trim().is_empty()) {
            config.level = level.trim().to_string();
        }
        if let Some(val) = ansi {
            config.ansi = val.to_lowercase() != "false";
        }

        config
    }
}
