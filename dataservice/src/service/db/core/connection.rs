//! 연결 관리 모듈
//!
//! 논리 연결 이름을 연결 정보로 해석하고, 이름마다 하나의 연결 풀을 지연 생성합니다.

use crate::service::db::core::config::{DataServiceConfig, PoolConfig, QueryConfig, TenantConfig};
use crate::service::db::core::executor::QueryExecutor;
use crate::service::db::core::types::ConnectionStats;
use crate::service::db::query::dialect::redact_url;
use crate::service::db::query::Dialect;
use crate::tool::error::DataError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Pool;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

const TENANT_PREFIX: &str = "tenant_";

static TENANT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("tenant id pattern is valid"));

/// 연결의 데이터 격리 경계
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolationBoundary {
    /// 정적 연결 (여러 호출자가 공유)
    Shared,
    /// 테넌트 전용 연결
    Tenant(String),
}

/// 해석된 연결 정보
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub name: String,
    pub dialect: Dialect,
    pub url: String,
    pub isolation: IsolationBoundary,
    pub max_connections: u32,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("url", &redact_url(&self.url))
            .field("isolation", &self.isolation)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl ConnectionDescriptor {
    fn is_memory_sqlite(&self) -> bool {
        self.dialect == Dialect::Sqlite && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }
}

/// 백엔드별 연결 풀
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    async fn connect(descriptor: &ConnectionDescriptor, config: &PoolConfig) -> Result<Self, DataError> {
        let max_connections = descriptor.max_connections.max(1);

        let pool = match descriptor.dialect {
            Dialect::MySql => DbPool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(config.connect_timeout)
                    .idle_timeout(Some(config.idle_timeout))
                    .max_lifetime(Some(config.max_lifetime))
                    .connect(&descriptor.url)
                    .await?,
            ),
            Dialect::Postgres => DbPool::Postgres(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(config.connect_timeout)
                    .idle_timeout(Some(config.idle_timeout))
                    .max_lifetime(Some(config.max_lifetime))
                    .connect(&descriptor.url)
                    .await?,
            ),
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::from_str(&descriptor.url)?.create_if_missing(true);
                let pool_options = SqlitePoolOptions::new().acquire_timeout(config.connect_timeout);

                // 메모리 DB는 연결마다 별도 DB이므로 연결 하나를 계속 유지합니다.
                let pool_options = if descriptor.is_memory_sqlite() {
                    pool_options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    pool_options
                        .max_connections(max_connections)
                        .idle_timeout(Some(config.idle_timeout))
                        .max_lifetime(Some(config.max_lifetime))
                };
                DbPool::Sqlite(pool_options.connect_with(options).await?)
            }
        };
        Ok(pool)
    }

    fn size(&self) -> u32 {
        match self {
            DbPool::MySql(pool) => pool.size(),
            DbPool::Postgres(pool) => pool.size(),
            DbPool::Sqlite(pool) => pool.size(),
        }
    }

    fn num_idle(&self) -> u32 {
        let idle = match self {
            DbPool::MySql(pool) => pool.num_idle(),
            DbPool::Postgres(pool) => pool.num_idle(),
            DbPool::Sqlite(pool) => pool.num_idle(),
        };
        idle as u32
    }

    async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// 내부 통계 추적기
#[derive(Default)]
struct ConnectionStatistics {
    total_connections: AtomicU32, // 연결 획득 횟수
    connection_errors: AtomicU64, // 연결 오류 수
    total_queries: AtomicU64,     // 총 쿼리 수
}

/// 논리 연결 하나의 연결 풀
pub struct Database {
    descriptor: Arc<ConnectionDescriptor>,
    pool: DbPool,
    config: PoolConfig,
    stats: ConnectionStatistics,
}

impl Database {
    pub async fn connect(descriptor: Arc<ConnectionDescriptor>, config: &PoolConfig) -> Result<Self, DataError> {
        info!("연결 풀 생성: {} ({})", descriptor.name, descriptor.dialect);

        let pool = DbPool::connect(&descriptor, config).await.map_err(|e| {
            error!("연결 풀 생성 실패: {} - {}", descriptor.name, e);
            e
        })?;

        Ok(Self {
            descriptor,
            pool,
            config: config.clone(),
            stats: ConnectionStatistics::default(),
        })
    }

    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        &self.descriptor
    }

    pub fn dialect(&self) -> Dialect {
        self.descriptor.dialect
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Get connection with retry logic
    pub(crate) async fn acquire<DB: sqlx::Database>(&self, pool: &Pool<DB>) -> Result<PoolConnection<DB>, DataError> {
        let max_attempts = if self.config.enable_retry {
            self.config.max_retries.max(1)
        } else {
            1
        };
        let mut attempts = 0;

        loop {
            attempts += 1;

            match pool.acquire().await {
                Ok(conn) => {
                    self.stats.total_connections.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Connection acquired on {} (attempt {}/{})",
                        self.descriptor.name, attempts, max_attempts
                    );
                    return Ok(conn);
                }
                Err(e) => {
                    self.stats.connection_errors.fetch_add(1, Ordering::Relaxed);

                    if attempts >= max_attempts {
                        error!(
                            "Failed to acquire connection on {} after {} attempts: {}",
                            self.descriptor.name, attempts, e
                        );
                        return Err(DataError::from(e));
                    }

                    warn!("Connection attempt {} on {} failed, retrying: {}", attempts, self.descriptor.name, e);
                    tokio::time::sleep(self.config.retry_delay * attempts).await;
                }
            }
        }
    }

    /// Increment query counter
    pub fn record_query(&self) {
        self.stats.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        let size = self.pool.size();
        let idle = self.pool.num_idle().min(size);

        ConnectionStats {
            active_connections: size - idle,
            idle_connections: idle,
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            max_connections: self.descriptor.max_connections,
            connection_errors: self.stats.connection_errors.load(Ordering::Relaxed),
            total_queries: self.stats.total_queries.load(Ordering::Relaxed),
        }
    }

    /// Gracefully close all connections
    pub async fn close(&self) {
        info!("Closing database connection pool: {}", self.descriptor.name);
        self.pool.close().await;
    }
}

/// 논리 연결 이름 해석기
///
/// 정적 연결을 먼저 찾고, 없으면 `tenant_<id>` 형식을 테넌트 템플릿으로 해석합니다.
/// 해석된 테넌트 정보는 프로세스 수명 동안 캐시됩니다.
pub struct ConnectionRegistry {
    connections: HashMap<String, Arc<ConnectionDescriptor>>,
    tenants: Option<(TenantConfig, Dialect)>,
    tenant_cache: DashMap<String, Arc<ConnectionDescriptor>>,
    executors: DashMap<String, Arc<OnceCell<Arc<QueryExecutor>>>>,
    pool_config: PoolConfig,
    query_config: QueryConfig,
}

impl ConnectionRegistry {
    pub fn new(config: &DataServiceConfig) -> Result<Self, DataError> {
        let mut connections = HashMap::new();
        for (name, connection) in &config.connections {
            let descriptor = ConnectionDescriptor {
                name: name.clone(),
                dialect: Dialect::from_url(&connection.url)?,
                url: connection.url.clone(),
                isolation: IsolationBoundary::Shared,
                max_connections: connection
                    .max_connections
                    .unwrap_or(config.pool_config.max_connections),
            };
            debug!("정적 연결 등록: {:?}", descriptor);
            connections.insert(name.clone(), Arc::new(descriptor));
        }

        let tenants = match &config.tenants {
            Some(tenants) => {
                if !tenants.url_template.contains("{id}") {
                    return Err(DataError::Configuration(
                        "tenant url template must contain {id}".to_string(),
                    ));
                }
                Some((tenants.clone(), Dialect::from_url(&tenants.url_template)?))
            }
            None => None,
        };

        Ok(Self {
            connections,
            tenants,
            tenant_cache: DashMap::new(),
            executors: DashMap::new(),
            pool_config: config.pool_config.clone(),
            query_config: config.query_config.clone(),
        })
    }

    /// 논리 이름을 연결 정보로 해석합니다. DB에는 접근하지 않습니다.
    pub fn resolve(&self, name: &str) -> Result<Arc<ConnectionDescriptor>, DataError> {
        if let Some(descriptor) = self.connections.get(name) {
            return Ok(descriptor.clone());
        }
        if let Some(descriptor) = self.tenant_cache.get(name) {
            return Ok(descriptor.clone());
        }

        let not_found = || DataError::ConnectionNotFound(name.to_string());
        let id = name.strip_prefix(TENANT_PREFIX).ok_or_else(not_found)?;
        let (tenants, dialect) = self.tenants.as_ref().ok_or_else(not_found)?;
        if !TENANT_ID.is_match(id) {
            return Err(not_found());
        }

        let descriptor = self
            .tenant_cache
            .entry(name.to_string())
            .or_insert_with(|| {
                let url = tenants.url_template.replace("{id}", id);
                info!("테넌트 연결 해석: {} → {}", name, redact_url(&url));
                Arc::new(ConnectionDescriptor {
                    name: name.to_string(),
                    dialect: *dialect,
                    url,
                    isolation: IsolationBoundary::Tenant(id.to_string()),
                    max_connections: tenants.max_connections.unwrap_or(self.pool_config.max_connections),
                })
            })
            .clone();
        Ok(descriptor)
    }

    /// 연결 이름마다 하나의 실행기를 지연 생성합니다.
    pub async fn connect(&self, descriptor: &Arc<ConnectionDescriptor>) -> Result<Arc<QueryExecutor>, DataError> {
        let cell = self.executors.entry(descriptor.name.clone()).or_default().clone();

        let executor = cell
            .get_or_try_init(|| async {
                let database = Database::connect(descriptor.clone(), &self.pool_config).await?;
                Ok::<_, DataError>(Arc::new(QueryExecutor::new(
                    Arc::new(database),
                    self.query_config.clone(),
                )))
            })
            .await?;
        Ok(executor.clone())
    }

    /// 정적 연결 이름 목록
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    /// 캐시된 테넌트 연결 정보와 풀을 제거합니다.
    pub async fn evict_tenant(&self, id: &str) -> bool {
        let name = format!("{TENANT_PREFIX}{id}");
        let removed = self.tenant_cache.remove(&name).is_some();

        if let Some((_, cell)) = self.executors.remove(&name) {
            if let Some(executor) = cell.get() {
                executor.database().close().await;
            }
        }
        if removed {
            info!("테넌트 연결 제거: {}", name);
        }
        removed
    }

    /// 열린 풀 통계
    pub fn stats(&self) -> Vec<(String, ConnectionStats)> {
        let mut stats: Vec<(String, ConnectionStats)> = self
            .executors
            .iter()
            .filter_map(|entry| entry.value().get().map(|executor| (entry.key().clone(), executor.database().stats())))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub async fn close_all(&self) {
        let cells: Vec<Arc<OnceCell<Arc<QueryExecutor>>>> =
            self.executors.iter().map(|entry| entry.value().clone()).collect();
        for cell in cells {
            if let Some(executor) = cell.get() {
                executor.database().close().await;
            }
        }
    }
}
