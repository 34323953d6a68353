//! 데이터 서비스 환경 설정
//!
//! .env 파일과 환경 변수에서 연결, 풀, 병렬 실행, 암호화 설정을 읽어옵니다.
//!
//! * `DATA_CONN_<NAME>` - 정적 연결 URL (이름은 소문자로 변환)
//! * `DATA_TENANT_URL_TEMPLATE` - `{id}`를 포함한 테넌트 URL
//! * `DATA_POOL_MAX_CONNECTIONS`, `DATA_POOL_CONNECT_TIMEOUT_SECS`, `DATA_POOL_MAX_RETRIES`
//! * `DATA_PARALLEL_WORKERS`, `DATA_PER_CONNECTION_LIMIT`, `DATA_RESULT_TTL_SECS`, `DATA_SWEEP_INTERVAL_SECS`
//! * `DATA_ENCRYPTION_KEYS`, `DATA_ENCRYPTION_ACTIVE_VERSION`, `DATA_HASH_PEPPER`
//! * `DATA_RAW_SQL_POLICY` - `trusted` | `guarded`

use dotenv::dotenv;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::security::key_manager::KeyMaterial;
use crate::service::db::core::config::{DataServiceConfig, TenantConfig};
use crate::service::db::query::RawSqlPolicy;
use crate::tool::error::DataError;

const CONNECTION_PREFIX: &str = "DATA_CONN_";

/// .env 파일 로드 - 현재 디렉토리, 없으면 상위 디렉토리
pub fn load_env_file() {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let workspace_env = current_dir.join(".env");
    let parent_env = current_dir.parent().map(|p| p.join(".env"));

    if workspace_env.exists() {
        dotenv::from_path(&workspace_env).ok();
        info!("환경 파일 로드: {:?}", workspace_env);
        return;
    }
    // 서브패키지에서 실행되는 경우
    if let Some(parent_env) = parent_env {
        if parent_env.exists() {
            dotenv::from_path(&parent_env).ok();
            info!("환경 파일 로드: {:?}", parent_env);
            return;
        }
    }

    if dotenv().is_err() {
        warn!(".env 파일을 찾을 수 없어서 환경 변수를 직접 사용합니다.");
    }
}

impl DataServiceConfig {
    /// .env 파일과 프로세스 환경 변수로 설정 생성
    pub fn from_env() -> Result<Self, DataError> {
        load_env_file();
        Self::from_vars(std::env::vars())
    }

    /// 주어진 변수 목록으로 설정 생성
    pub fn from_vars<I>(vars: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        let mut config = DataServiceConfig::new();

        for (key, url) in &vars {
            let Some(name) = key.strip_prefix(CONNECTION_PREFIX) else {
                continue;
            };
            if name.is_empty() || url.trim().is_empty() {
                warn!("빈 연결 설정 무시: {}", key);
                continue;
            }
            config = config.with_connection(name.to_ascii_lowercase(), url.trim());
        }

        if let Some(template) = non_empty(&vars, "DATA_TENANT_URL_TEMPLATE") {
            config.tenants = Some(TenantConfig {
                url_template: template.to_string(),
                max_connections: None,
            });
        }

        // 풀
        if let Some(max) = parse::<u32>(&vars, "DATA_POOL_MAX_CONNECTIONS")? {
            config.pool_config.max_connections = max;
        }
        if let Some(secs) = parse::<u64>(&vars, "DATA_POOL_CONNECT_TIMEOUT_SECS")? {
            config.pool_config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse::<u32>(&vars, "DATA_POOL_MAX_RETRIES")? {
            config.pool_config.max_retries = retries;
            config.pool_config.enable_retry = retries > 0;
        }

        // 병렬 실행
        if let Some(workers) = parse::<usize>(&vars, "DATA_PARALLEL_WORKERS")? {
            config.executor_config.worker_count = workers;
        }
        if let Some(limit) = parse::<usize>(&vars, "DATA_PER_CONNECTION_LIMIT")? {
            config.executor_config.per_connection_limit = limit;
        }
        if let Some(secs) = parse::<u64>(&vars, "DATA_RESULT_TTL_SECS")? {
            config.executor_config.result_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&vars, "DATA_SWEEP_INTERVAL_SECS")? {
            config.executor_config.sweep_interval = Duration::from_secs(secs);
        }

        // 암호화
        if let Some(keys) = non_empty(&vars, "DATA_ENCRYPTION_KEYS") {
            config.encryption_config.keys = KeyMaterial::parse_list(keys)?;
        }
        config.encryption_config.active_version = parse::<u32>(&vars, "DATA_ENCRYPTION_ACTIVE_VERSION")?;
        if let Some(pepper) = non_empty(&vars, "DATA_HASH_PEPPER") {
            config.encryption_config.hash_pepper = pepper.to_string();
        }

        if let Some(policy) = parse::<RawSqlPolicy>(&vars, "DATA_RAW_SQL_POLICY")? {
            config.query_config.raw_sql_policy = policy;
        }

        if config.connections.is_empty() && config.tenants.is_none() {
            warn!("DATA_CONN_* 환경변수가 없어서 연결이 하나도 설정되지 않았습니다.");
        }

        Ok(config)
    }
}

fn non_empty<'a>(vars: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse<T: FromStr>(vars: &BTreeMap<String, String>, key: &str) -> Result<Option<T>, DataError> {
    match non_empty(vars, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| DataError::Configuration(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(None),
    }
}
