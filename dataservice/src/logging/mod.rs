//! 로깅 초기화
//!
//! `tracing-subscriber`의 fmt 구독자를 설치합니다. `RUST_LOG`가 설정되어 있으면
//! 그 값이 기본 지시자보다 우선합니다.
//!
//! # 사용 예시
//! ```rust,no_run
//! dataservice::logging::init_tracing("info");
//! ```

pub mod config;

pub use config::LoggingConfig;

use tracing_subscriber::EnvFilter;

/// 구독자 설치. 이미 설치되어 있으면 `false`를 반환합니다.
///
/// 우선순위: `RUST_LOG` > `LOG_LEVEL` > `default_directive`
pub fn init_tracing(default_directive: &str) -> bool {
    let mut config = LoggingConfig::from_env();
    let level_set = std::env::var("LOG_LEVEL").map(|v| !v.trim().is_empty()).unwrap_or(false);
    if !level_set {
        config.level = default_directive.to_string();
    }
    init_with(&config)
}

/// 설정으로 구독자 설치
pub fn init_with(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok()
}
