//! 쿼리 실행 모듈
//!
//! 컴파일된 문장을 bind 값과 함께 실행하고, 결과 행을 JSON 맵으로 변환합니다.

use crate::service::db::core::config::QueryConfig;
use crate::service::db::core::connection::{Database, DbPool};
use crate::service::db::core::types::{AffectedInfo, Row, Statement};
use crate::service::db::query::Dialect;
use crate::tool::error::DataError;
use serde_json::{Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Decimal;
use sqlx::{Column, MySql, Postgres, Row as _, Sqlite, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// JSON 값을 sqlx 쿼리에 순서대로 bind 합니다.
macro_rules! bind_values {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for value in $params {
            query = match value {
                Value::String(s) => query.bind(s.clone()),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else if let Some(f) = n.as_f64() {
                        query.bind(f)
                    } else {
                        query.bind(n.to_string())
                    }
                }
                Value::Bool(b) => query.bind(*b),
                Value::Null => query.bind(Option::<String>::None),
                other => query.bind(other.to_string()),
            };
        }
        query
    }};
}

/// 데이터베이스 작업을 위한 쿼리 실행기
pub struct QueryExecutor {
    /// 연결 풀
    database: Arc<Database>,

    /// 쿼리 설정
    config: QueryConfig,
}

impl QueryExecutor {
    /// 새 쿼리 실행기 생성
    pub fn new(database: Arc<Database>, config: QueryConfig) -> Self {
        Self { database, config }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn dialect(&self) -> Dialect {
        self.database.dialect()
    }

    /// SELECT 쿼리 실행
    pub async fn select(&self, statement: &Statement) -> Result<Vec<Row>, DataError> {
        self.log_query(statement);
        let start = Instant::now();

        let rows = match self.database.pool() {
            DbPool::MySql(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let rows = bind_values!(sqlx::query::<MySql>(&statement.sql), &statement.params)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("SELECT", e))?;
                rows.iter().map(mysql_row_to_map).collect::<Result<Vec<_>, _>>()?
            }
            DbPool::Postgres(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let rows = bind_values!(sqlx::query::<Postgres>(&statement.sql), &statement.params)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("SELECT", e))?;
                rows.iter().map(pg_row_to_map).collect::<Result<Vec<_>, _>>()?
            }
            DbPool::Sqlite(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let rows = bind_values!(sqlx::query::<Sqlite>(&statement.sql), &statement.params)
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("SELECT", e))?;
                rows.iter().map(sqlite_row_to_map).collect::<Result<Vec<_>, _>>()?
            }
        };

        self.database.record_query();
        let elapsed = start.elapsed();
        self.check_slow_query(&statement.sql, elapsed.as_millis() as u64);

        debug!("Query returned {} rows in {:?}", rows.len(), elapsed);
        Ok(rows)
    }

    /// Execute INSERT/UPDATE/DELETE query
    pub async fn execute(&self, statement: &Statement) -> Result<AffectedInfo, DataError> {
        self.log_query(statement);
        let start = Instant::now();

        let info = match self.database.pool() {
            DbPool::MySql(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let result = bind_values!(sqlx::query::<MySql>(&statement.sql), &statement.params)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("Execute", e))?;
                AffectedInfo {
                    affected_rows: result.rows_affected(),
                    last_insert_id: (result.last_insert_id() > 0).then(|| result.last_insert_id() as i64),
                }
            }
            DbPool::Postgres(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let result = bind_values!(sqlx::query::<Postgres>(&statement.sql), &statement.params)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("Execute", e))?;
                AffectedInfo {
                    affected_rows: result.rows_affected(),
                    last_insert_id: None,
                }
            }
            DbPool::Sqlite(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                let result = bind_values!(sqlx::query::<Sqlite>(&statement.sql), &statement.params)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| self.query_error("Execute", e))?;
                AffectedInfo {
                    affected_rows: result.rows_affected(),
                    last_insert_id: (result.last_insert_rowid() > 0).then(|| result.last_insert_rowid()),
                }
            }
        };

        self.database.record_query();
        self.check_slow_query(&statement.sql, start.elapsed().as_millis() as u64);
        Ok(info)
    }

    /// DDL/DCL 문장 실행 (bind 값 없이 그대로 전송)
    pub async fn execute_ddl(&self, sql: &str) -> Result<u64, DataError> {
        if self.config.enable_query_logging {
            debug!("Executing DDL: {}", sql);
        }
        let start = Instant::now();

        let affected = match self.database.pool() {
            DbPool::MySql(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                sqlx::Executor::execute(&mut *conn, sql).await.map(|r| r.rows_affected())
            }
            DbPool::Postgres(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                sqlx::Executor::execute(&mut *conn, sql).await.map(|r| r.rows_affected())
            }
            DbPool::Sqlite(pool) => {
                let mut conn = self.database.acquire(pool).await?;
                sqlx::Executor::execute(&mut *conn, sql).await.map(|r| r.rows_affected())
            }
        }
        .map_err(|e| self.query_error("DDL", e))?;

        self.database.record_query();
        self.check_slow_query(sql, start.elapsed().as_millis() as u64);
        Ok(affected)
    }

    /// Perform health check
    pub async fn health_check(&self) -> Result<bool, DataError> {
        let rows = self.select(&Statement::raw("SELECT 1 AS health")).await?;
        let healthy = rows.len() == 1;
        debug!("Database health check on {}: {}", self.database.descriptor().name, healthy);
        Ok(healthy)
    }

    fn query_error(&self, operation: &str, e: sqlx::Error) -> DataError {
        warn!("{} failed on {}: {}", operation, self.database.descriptor().name, e);
        DataError::from(e)
    }

    /// Log query if enabled
    fn log_query(&self, statement: &Statement) {
        if self.config.enable_query_logging {
            if statement.params.is_empty() {
                debug!("Executing query: {}", statement.sql);
            } else {
                debug!("Executing query: {} | {} params", statement.sql, statement.params.len());
            }
        }
    }

    /// Check for slow queries
    fn check_slow_query(&self, sql: &str, elapsed_ms: u64) {
        if elapsed_ms > self.config.slow_query_threshold_ms {
            warn!(
                "Slow query detected ({} ms): {}",
                elapsed_ms,
                sql.chars().take(200).collect::<String>()
            );
        }
    }
}

fn float_value(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// DECIMAL/NUMERIC 텍스트. f64로 표현되면 숫자, 아니면 문자열 그대로
fn decimal_value(text: String) -> Value {
    match text.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(text),
    }
}

/// MySQL 행을 JSON 맵으로 변환
fn mysql_row_to_map(row: &MySqlRow) -> Result<Row, DataError> {
    let mut result = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let type_name = column.type_info().name();

        let value = match type_name {
            "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            name if name.ends_with("UNSIGNED") => row.try_get_unchecked::<Option<u64>, _>(index)?.map(Value::from),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                row.try_get_unchecked::<Option<i64>, _>(index)?.map(Value::from)
            }
            "FLOAT" => row.try_get::<Option<f32>, _>(index)?.map(|v| float_value(v as f64)),
            "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map(float_value),
            "DECIMAL" => row.try_get_unchecked::<Option<String>, _>(index)?.map(decimal_value),
            "DATETIME" | "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "JSON" => row.try_get::<Option<Value>, _>(index)?,
            // 문자열이 아닌 바이너리는 hex로
            _ => match row.try_get_unchecked::<Option<String>, _>(index) {
                Ok(text) => text.map(Value::String),
                Err(_) => row
                    .try_get_unchecked::<Option<Vec<u8>>, _>(index)?
                    .map(|bytes| Value::String(hex::encode(bytes))),
            },
        };

        result.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }

    Ok(result)
}

/// PostgreSQL 행을 JSON 맵으로 변환
fn pg_row_to_map(row: &PgRow) -> Result<Row, DataError> {
    let mut result = Row::new();

    for column in row.columns() {
        let index = column.ordinal();

        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| float_value(v as f64)),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(float_value),
            "NUMERIC" => row
                .try_get::<Option<Decimal>, _>(index)?
                .map(|v| decimal_value(v.to_string())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
                .map(|v| Value::String(v.to_rfc3339())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "TIME" => row
                .try_get::<Option<chrono::NaiveTime>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(index)?
                .map(|v| Value::String(v.to_string())),
            "BYTEA" => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(|bytes| Value::String(hex::encode(bytes))),
            _ => row.try_get::<Option<String>, _>(index)?.map(Value::String),
        };

        result.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }

    Ok(result)
}

/// SQLite 행을 JSON 맵으로 변환 (값의 저장 클래스 기준)
fn sqlite_row_to_map(row: &SqliteRow) -> Result<Row, DataError> {
    let mut result = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let declared = column.type_info().name().to_ascii_uppercase();

        let raw = row.try_get_raw(index)?;
        let storage = (!raw.is_null()).then(|| raw.type_info().name().to_string());

        let value = match storage.as_deref() {
            None => Value::Null,
            Some("INTEGER") if declared == "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
            Some("INTEGER") => Value::from(row.try_get_unchecked::<i64, _>(index)?),
            Some("REAL") => float_value(row.try_get_unchecked::<f64, _>(index)?),
            Some("BLOB") => Value::String(hex::encode(row.try_get_unchecked::<Vec<u8>, _>(index)?)),
            Some(_) => Value::String(row.try_get_unchecked::<String, _>(index)?),
        };

        result.insert(column.name().to_string(), value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::db::core::config::PoolConfig;
    use crate::service::db::core::connection::{ConnectionDescriptor, IsolationBoundary};
    use serde_json::json;

    async fn memory_executor() -> QueryExecutor {
        let descriptor = Arc::new(ConnectionDescriptor {
            name: "memory".into(),
            dialect: Dialect::Sqlite,
            url: "sqlite::memory:".into(),
            isolation: IsolationBoundary::Shared,
            max_connections: 1,
        });
        let database = Database::connect(descriptor, &PoolConfig::default()).await.unwrap();
        QueryExecutor::new(Arc::new(database), QueryConfig::default())
    }

    #[tokio::test]
    async fn test_sqlite_values_map_to_json() {
        let executor = memory_executor().await;
        executor
            .execute_ddl("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL, active BOOLEAN, note TEXT)")
            .await
            .unwrap();

        let info = executor
            .execute(&Statement::new(
                "INSERT INTO t (name, score, active, note) VALUES (?, ?, ?, ?)",
                vec![json!("kim"), json!(1.5), json!(true), Value::Null],
            ))
            .await
            .unwrap();
        assert_eq!(info.affected_rows, 1);
        assert_eq!(info.last_insert_id, Some(1));

        let rows = executor.select(&Statement::raw("SELECT * FROM t")).await.unwrap();
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"id": 1, "name": "kim", "score": 1.5, "active": true, "note": null})
        );
    }

    #[tokio::test]
    async fn test_database_errors_are_reported() {
        let executor = memory_executor().await;
        let result = executor.select(&Statement::raw("SELECT * FROM missing_table")).await;
        assert!(matches!(result, Err(DataError::Database(_))));
        assert!(executor.health_check().await.unwrap());
        assert!(executor.database().stats().total_queries >= 1);
    }

    #[tokio::test]
    async fn test_undecodable_values_are_errors() {
        let executor = memory_executor().await;
        let result = executor
            .select(&Statement::raw("SELECT CAST(x'ff' AS TEXT) AS broken"))
            .await;
        assert!(matches!(result, Err(DataError::Database(_))));
    }

    #[test]
    fn test_decimal_text_becomes_number() {
        assert_eq!(decimal_value("12.50".to_string()), json!(12.5));
        assert_eq!(decimal_value("-3".to_string()), json!(-3.0));
        assert_eq!(decimal_value("NaN".to_string()), json!("NaN"));
    }
}
