//! Data Service Error Management
//!
//! 데이터 서비스의 모든 에러를 하나의 열거형으로 관리합니다.
//! 호출자는 `kind()`로 에러 종류를 구분하고, 병렬 배치에서는 같은 값을 슬롯에 기록합니다.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::service::db::query::Dialect;

/// 공통 데이터 서비스 에러 정의
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    // 연결 관련 에러
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    // 쿼리 명세 에러 (DB 접근 전에 발생)
    #[error("invalid query spec: {0}")]
    QuerySpec(String),

    #[error("{dialect} cannot compile {construct}")]
    SqlCompilation { dialect: Dialect, construct: String },

    // 암호화 관련 에러
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // 스키마 변경 에러
    #[error("schema operation failed at step {step} ({statement}): {message}")]
    SchemaOperation {
        step: usize,
        statement: String,
        message: String,
    },

    // 병렬 실행 결과 에러
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    // 데이터베이스 에러
    #[error("database error: {0}")]
    Database(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// 에러 종류 (배치 결과 직렬화에 사용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ConnectionNotFound,
    QuerySpec,
    SqlCompilation,
    Encryption,
    Decryption,
    SchemaOperation,
    BatchNotFound,
    Database,
    Timeout,
    Configuration,
    Internal,
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::ConnectionNotFound(_) => ErrorKind::ConnectionNotFound,
            DataError::QuerySpec(_) => ErrorKind::QuerySpec,
            DataError::SqlCompilation { .. } => ErrorKind::SqlCompilation,
            DataError::Encryption(_) => ErrorKind::Encryption,
            DataError::Decryption(_) => ErrorKind::Decryption,
            DataError::SchemaOperation { .. } => ErrorKind::SchemaOperation,
            DataError::BatchNotFound(_) => ErrorKind::BatchNotFound,
            DataError::Database(_) => ErrorKind::Database,
            DataError::Timeout(_) => ErrorKind::Timeout,
            DataError::Configuration(_) => ErrorKind::Configuration,
            DataError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn unsupported(dialect: Dialect, construct: impl Into<String>) -> Self {
        DataError::SqlCompilation {
            dialect,
            construct: construct.into(),
        }
    }

    /// 에러의 심각도를 반환합니다.
    ///
    /// # Returns
    /// * `ErrorSeverity` - 에러의 심각도 레벨
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical: 시스템 장애
            DataError::Configuration(_) | DataError::Internal(_) => ErrorSeverity::Critical,

            // High: 실행 실패
            DataError::Database(_)
            | DataError::SchemaOperation { .. }
            | DataError::Decryption(_)
            | DataError::Encryption(_)
            | DataError::Timeout(_) => ErrorSeverity::High,

            // Medium: 호출자 입력 오류
            DataError::QuerySpec(_)
            | DataError::SqlCompilation { .. }
            | DataError::ConnectionNotFound(_) => ErrorSeverity::Medium,

            // Low: 만료된 배치 조회 등
            DataError::BatchNotFound(_) => ErrorSeverity::Low,
        }
    }

    /// 에러를 로깅합니다.
    ///
    /// 심각도에 따라 적절한 로깅 레벨을 사용합니다.
    pub fn log(&self, context: &str) {
        let error_msg = self.to_string();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!("[CRITICAL] {} - {}", context, error_msg);
            }
            ErrorSeverity::High => {
                error!("[HIGH] {} - {}", context, error_msg);
            }
            ErrorSeverity::Medium => {
                warn!("[MEDIUM] {} - {}", context, error_msg);
            }
            ErrorSeverity::Low => {
                info!("[LOW] {} - {}", context, error_msg);
            }
        }
    }
}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Critical, // 시스템 장애
    High,     // 실행 실패
    Medium,   // 입력 오류
    Low,      // 일반적인 경고
}

// SqlxError conversion
impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DataError::Database(db_err.to_string()),
            sqlx::Error::PoolTimedOut => {
                DataError::Timeout("database connection pool timeout".to_string())
            }
            sqlx::Error::PoolClosed => DataError::Database("database pool is closed".to_string()),
            sqlx::Error::Configuration(e) => {
                DataError::Configuration(format!("database configuration error: {e}"))
            }
            _ => DataError::Database(err.to_string()),
        }
    }
}

pub type DataResult<T> = Result<T, DataError>;
