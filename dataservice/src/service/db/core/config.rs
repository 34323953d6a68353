//! 데이터 서비스 설정 모듈
//!
//! 빌더 패턴으로 연결, 쿼리, 풀, 병렬 실행, 암호화 설정을 관리

use crate::security::key_manager::KeyMaterial;
use crate::security::crypto::CipherAlgorithm;
use crate::service::db::query::RawSqlPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// 데이터 서비스 설정
#[derive(Debug, Clone, Default)]
pub struct DataServiceConfig {
    /// 이름이 있는 정적 연결들
    pub connections: BTreeMap<String, ConnectionConfig>,

    /// 테넌트 연결 템플릿 (`tenant_<id>`)
    pub tenants: Option<TenantConfig>,

    /// 쿼리 실행 설정
    pub query_config: QueryConfig,

    /// 연결 풀 설정
    pub pool_config: PoolConfig,

    /// 병렬 실행 설정
    pub executor_config: ExecutorConfig,

    /// 컬럼 암호화 설정
    pub encryption_config: EncryptionConfig,
}

/// 정적 연결 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

/// 테넌트 연결 설정
///
/// `url_template`의 `{id}` 자리에 테넌트 식별자가 들어갑니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub url_template: String,
    pub max_connections: Option<u32>,
}

/// 쿼리 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// 쿼리 로깅 활성화
    pub enable_query_logging: bool,

    /// 느린 쿼리 로깅 (임계값: ms)
    pub slow_query_threshold_ms: u64,

    /// raw SQL 조각 허용 정책
    pub raw_sql_policy: RawSqlPolicy,
}

/// 연결 풀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// 풀의 최대 연결 수
    pub max_connections: u32,

    /// 연결 타임아웃
    pub connect_timeout: Duration,

    /// 유휴 연결 타임아웃
    pub idle_timeout: Duration,

    /// 최대 연결 수명
    pub max_lifetime: Duration,

    /// 연결 재시도 활성화
    pub enable_retry: bool,

    /// 최대 재시도 횟수
    pub max_retries: u32,

    /// 재시도 지연 시간
    pub retry_delay: Duration,
}

/// 병렬 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// 동시에 실행되는 작업 수 상한
    pub worker_count: usize,

    /// 연결 하나에 동시에 실행되는 작업 수 상한
    pub per_connection_limit: usize,

    /// 배치 결과 보관 기간
    pub result_ttl: Duration,

    /// 만료된 배치 정리 주기
    pub sweep_interval: Duration,
}

/// 컬럼 암호화 설정
#[derive(Clone, Default)]
pub struct EncryptionConfig {
    /// 버전이 붙은 키 목록
    pub keys: Vec<KeyMaterial>,

    /// 새 암호문에 사용할 키 버전 (없으면 가장 높은 버전)
    pub active_version: Option<u32>,

    /// 검색용 해시 컬럼에 섞는 pepper
    pub hash_pepper: String,

    /// 컬럼 등록 시 기본 알고리즘
    pub default_algorithm: CipherAlgorithm,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key_versions", &self.keys.iter().map(|k| k.version).collect::<Vec<_>>())
            .field("active_version", &self.active_version)
            .field("hash_pepper", &"***")
            .field("default_algorithm", &self.default_algorithm)
            .finish()
    }
}

impl DataServiceConfig {
    /// Create new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for a named connection
    pub fn with_connection(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.connections.insert(
            name.into(),
            ConnectionConfig {
                url: url.into(),
                max_connections: None,
            },
        );
        self
    }

    /// Builder method for tenant connections
    pub fn with_tenant_template(mut self, url_template: impl Into<String>) -> Self {
        self.tenants = Some(TenantConfig {
            url_template: url_template.into(),
            max_connections: None,
        });
        self
    }

    /// Builder method for query configuration
    pub fn with_query_config(mut self, config: QueryConfig) -> Self {
        self.query_config = config;
        self
    }

    /// Builder method for pool configuration
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Builder method for parallel executor configuration
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    /// Builder method for encryption configuration
    pub fn with_encryption(mut self, config: EncryptionConfig) -> Self {
        self.encryption_config = config;
        self
    }

    /// Builder method for raw SQL policy
    pub fn with_raw_sql_policy(mut self, policy: RawSqlPolicy) -> Self {
        self.query_config.raw_sql_policy = policy;
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enable_query_logging: true,
            slow_query_threshold_ms: 1000,
            raw_sql_policy: RawSqlPolicy::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
            enable_retry: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(4),
            per_connection_limit: 4,
            result_ttl: Duration::from_secs(86_400),
            sweep_interval: Duration::from_secs(300),
        }
    }
}
