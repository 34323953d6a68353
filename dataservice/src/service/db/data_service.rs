//! 데이터 서비스 - 연결, 쿼리, 암호화, 스키마, 병렬 실행을 묶는 진입점
//!
//! 모든 요청은 같은 순서로 처리됩니다.
//! 연결 이름 해석 → 암호화 컬럼 조건 변환 → SQL 컴파일 → 풀 획득 → 실행 → 결과 복호화

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::security::crypto::{EncryptedColumnSpec, EncryptionCodec};
use crate::service::db::core::config::DataServiceConfig;
use crate::service::db::core::connection::{ConnectionDescriptor, ConnectionRegistry};
use crate::service::db::core::executor::QueryExecutor;
use crate::service::db::core::types::{AffectedInfo, Row, Statement};
use crate::service::db::query::dialect::split_alias;
use crate::service::db::query::{collapse_condition_map, Condition, ConditionMap, QueryCompiler, QuerySpec};
use crate::service::db::schema::{
    AlterAction, SchemaChange, SchemaOperator, SchemaOutcome, TableBlueprint, TableCatalog,
    DEFAULT_SOFT_DELETE_COLUMN,
};
use crate::service::parallel::{
    Action, BatchResult, BatchTicket, JobHandle, Operation, OperationData, OperationRunner, ParallelExecutor,
};
use crate::tool::error::DataError;

struct DataServiceInner {
    config: DataServiceConfig,
    registry: ConnectionRegistry,
    codec: Arc<EncryptionCodec>,
    catalog: Arc<TableCatalog>,
    schema: SchemaOperator,
    parallel: ParallelExecutor,
}

/// 데이터 서비스
///
/// 복제 비용이 낮으며 모든 복제본이 같은 풀과 카탈로그를 공유합니다.
#[derive(Clone)]
pub struct DataService {
    inner: Arc<DataServiceInner>,
}

impl DataService {
    /// 새 서비스 인스턴스 생성
    ///
    /// 풀은 연결이 처음 사용될 때 만들어지므로 여기서는 DB에 접속하지 않습니다.
    pub fn new(config: DataServiceConfig) -> Result<Self, DataError> {
        info!("데이터 서비스 초기화 중");

        let registry = ConnectionRegistry::new(&config)?;

        let encryption = &config.encryption_config;
        if encryption.hash_pepper.is_empty() {
            warn!("⚠️  DATA_HASH_PEPPER is empty; searchable hashes are only as strong as plain SHA-256");
        }
        let codec = Arc::new(EncryptionCodec::from_provider(
            encryption,
            encryption.hash_pepper.as_bytes(),
            encryption.default_algorithm,
        )?);
        let catalog = Arc::new(TableCatalog::new());
        let schema = SchemaOperator::new(codec.clone(), catalog.clone(), config.query_config.raw_sql_policy);
        let parallel = ParallelExecutor::new(&config.executor_config);

        info!("  └─ Connections: {:?}", registry.names());

        Ok(Self {
            inner: Arc::new(DataServiceInner {
                config,
                registry,
                codec,
                catalog,
                schema,
                parallel,
            }),
        })
    }

    /// 환경 변수 설정으로 생성
    pub fn from_env() -> Result<Self, DataError> {
        Self::new(DataServiceConfig::from_env()?)
    }

    pub fn config(&self) -> &DataServiceConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn codec(&self) -> &Arc<EncryptionCodec> {
        &self.inner.codec
    }

    pub fn catalog(&self) -> &Arc<TableCatalog> {
        &self.inner.catalog
    }

    // === 조회 ===

    /// 선언형 SELECT
    pub async fn query(&self, connection: &str, table: &str, spec: &QuerySpec) -> Result<Vec<Row>, DataError> {
        let descriptor = self.resolve(connection)?;
        let base = base_table(table);

        let spec = self.inner.codec.searchable_query(&descriptor.name, table, spec)?;
        let statement = self
            .compiler(&descriptor)
            .compile_scoped(table, &spec, &self.soft_delete_scope(&descriptor))?;

        let executor = self.inner.registry.connect(&descriptor).await?;
        let rows = executor.select(&statement).await?;
        self.decrypt_rows(&descriptor, base, rows)
    }

    /// `{"column": value}` 형식의 조건으로 조회
    pub async fn fetch(&self, connection: &str, table: &str, conditions: &ConditionMap) -> Result<Vec<Row>, DataError> {
        let spec = QuerySpec {
            conditions: collapse_condition_map(conditions)?,
            ..QuerySpec::default()
        };
        self.query(connection, table, &spec).await
    }

    /// 조건에 맞는 행 수
    pub async fn fetch_count(&self, connection: &str, table: &str, conditions: &ConditionMap) -> Result<i64, DataError> {
        let conditions = collapse_condition_map(conditions)?;
        self.count(connection, table, &conditions).await
    }

    pub async fn count(&self, connection: &str, table: &str, conditions: &[Condition]) -> Result<i64, DataError> {
        let descriptor = self.resolve(connection)?;
        let base = base_table(table);

        let conditions = self.searchable(&descriptor, base, conditions)?;
        let statement = self
            .compiler(&descriptor)
            .compile_count(table, &conditions, &self.soft_delete_scope(&descriptor))?;

        let executor = self.inner.registry.connect(&descriptor).await?;
        let rows = executor.select(&statement).await?;
        let aggregate = rows.first().and_then(|row| row.get("aggregate"));
        match aggregate {
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| DataError::Internal(format!("count result out of range: {n}"))),
            Some(Value::String(text)) => text
                .parse::<i64>()
                .map_err(|_| DataError::Internal(format!("count result is not a number: {text}"))),
            _ => Err(DataError::Internal("count query returned no aggregate".to_string())),
        }
    }

    // === 쓰기 ===

    pub async fn insert(&self, connection: &str, table: &str, row: Row) -> Result<AffectedInfo, DataError> {
        self.insert_many(connection, table, vec![row]).await
    }

    /// 다중 행 INSERT. 모든 행은 같은 컬럼 집합을 가져야 합니다.
    pub async fn insert_many(&self, connection: &str, table: &str, rows: Vec<Row>) -> Result<AffectedInfo, DataError> {
        let descriptor = self.resolve(connection)?;
        let rows = self.encrypt_rows(&descriptor, table, rows)?;
        let statement = self.compiler(&descriptor).compile_insert(table, &rows)?;

        debug!("insert {} row(s) into {}.{}", rows.len(), descriptor.name, table);
        self.run_write(&descriptor, &statement).await
    }

    pub async fn update(
        &self,
        connection: &str,
        table: &str,
        values: Row,
        conditions: &[Condition],
    ) -> Result<AffectedInfo, DataError> {
        require_conditions(conditions, "update")?;
        let descriptor = self.resolve(connection)?;

        let values = self.inner.codec.encrypt_row(&descriptor.name, table, values)?;
        let conditions = self.searchable(&descriptor, table, conditions)?;
        let statement = self.compiler(&descriptor).compile_update(table, &values, &conditions)?;
        self.run_write(&descriptor, &statement).await
    }

    /// `{"column": value}` 조건으로 갱신
    pub async fn edit(
        &self,
        connection: &str,
        table: &str,
        values: Row,
        conditions: &ConditionMap,
    ) -> Result<AffectedInfo, DataError> {
        let conditions = collapse_condition_map(conditions)?;
        self.update(connection, table, values, &conditions).await
    }

    /// 고유 키 충돌 시 갱신하는 INSERT
    ///
    /// 암호문은 매번 달라지므로 암호화 컬럼은 고유 키로 쓸 수 없습니다.
    pub async fn upsert(
        &self,
        connection: &str,
        table: &str,
        rows: Vec<Row>,
        unique_by: &[String],
        update_columns: Option<&[String]>,
    ) -> Result<AffectedInfo, DataError> {
        let descriptor = self.resolve(connection)?;
        let encrypted = self.inner.codec.columns(&descriptor.name, table);

        if let Some(spec) = encrypted.iter().find(|spec| unique_by.contains(&spec.column)) {
            return Err(DataError::QuerySpec(format!(
                "encrypted column '{}' cannot be an upsert key",
                spec.column
            )));
        }

        // 갱신 대상 암호화 컬럼의 해시도 함께 갱신
        let update_columns: Option<Vec<String>> = update_columns.map(|columns| {
            let mut expanded = columns.to_vec();
            for spec in &encrypted {
                if let Some(hash_column) = &spec.hash_column {
                    if columns.contains(&spec.column) && !expanded.contains(hash_column) {
                        expanded.push(hash_column.clone());
                    }
                }
            }
            expanded
        });

        let rows = self.encrypt_rows(&descriptor, table, rows)?;
        let statement =
            self.compiler(&descriptor)
                .compile_upsert(table, &rows, unique_by, update_columns.as_deref())?;
        self.run_write(&descriptor, &statement).await
    }

    /// 삭제. soft delete가 켜진 테이블은 삭제 시각만 기록합니다.
    pub async fn delete(&self, connection: &str, table: &str, conditions: &[Condition]) -> Result<AffectedInfo, DataError> {
        require_conditions(conditions, "delete")?;
        let descriptor = self.resolve(connection)?;

        match self.inner.catalog.soft_delete_column(&descriptor.name, table) {
            Some(column) => self.run_soft_delete(&descriptor, table, &column, conditions).await,
            None => self.run_delete(&descriptor, table, conditions).await,
        }
    }

    pub async fn soft_delete(
        &self,
        connection: &str,
        table: &str,
        conditions: &[Condition],
    ) -> Result<AffectedInfo, DataError> {
        require_conditions(conditions, "softDelete")?;
        let descriptor = self.resolve(connection)?;
        let column = self.soft_delete_column(&descriptor, table)?;
        self.run_soft_delete(&descriptor, table, &column, conditions).await
    }

    /// soft delete 여부와 관계없이 행을 제거합니다.
    pub async fn permanent_delete(
        &self,
        connection: &str,
        table: &str,
        conditions: &[Condition],
    ) -> Result<AffectedInfo, DataError> {
        require_conditions(conditions, "permanentDelete")?;
        let descriptor = self.resolve(connection)?;
        self.run_delete(&descriptor, table, conditions).await
    }

    pub async fn restore(&self, connection: &str, table: &str, conditions: &[Condition]) -> Result<AffectedInfo, DataError> {
        require_conditions(conditions, "restore")?;
        let descriptor = self.resolve(connection)?;
        let column = self.soft_delete_column(&descriptor, table)?;

        let conditions = self.searchable(&descriptor, table, conditions)?;
        let statement = self.compiler(&descriptor).compile_restore(table, &column, &conditions)?;
        self.run_write(&descriptor, &statement).await
    }

    // === 스키마 ===

    /// 스키마 변경 적용. 모든 단계가 컴파일된 뒤에만 실행이 시작됩니다.
    pub async fn apply_schema(&self, connection: &str, table: &str, change: &SchemaChange) -> Result<SchemaOutcome, DataError> {
        let descriptor = self.resolve(connection)?;
        let steps = self.inner.schema.plan(&descriptor, table, change)?;
        let executor = self.inner.registry.connect(&descriptor).await?;
        self.inner.schema.run(&descriptor.name, &executor, table, steps).await
    }

    pub async fn create_table(
        &self,
        connection: &str,
        table: &str,
        blueprint: &TableBlueprint,
    ) -> Result<SchemaOutcome, DataError> {
        self.apply_schema(connection, table, &SchemaChange::CreateTable(blueprint.clone()))
            .await
    }

    pub async fn alter_table(
        &self,
        connection: &str,
        table: &str,
        actions: Vec<AlterAction>,
    ) -> Result<SchemaOutcome, DataError> {
        self.apply_schema(connection, table, &SchemaChange::AlterTable { actions }).await
    }

    pub async fn drop_table(&self, connection: &str, table: &str) -> Result<SchemaOutcome, DataError> {
        self.apply_schema(connection, table, &SchemaChange::DropTable).await
    }

    pub async fn create_view(&self, connection: &str, view: &str, sql: &str) -> Result<SchemaOutcome, DataError> {
        self.apply_schema(connection, view, &SchemaChange::CreateView { sql: sql.to_string() })
            .await
    }

    pub async fn drop_view(&self, connection: &str, view: &str) -> Result<SchemaOutcome, DataError> {
        self.apply_schema(connection, view, &SchemaChange::DropView).await
    }

    pub async fn grant(
        &self,
        connection: &str,
        table: &str,
        privileges: &[String],
        principal: &str,
    ) -> Result<SchemaOutcome, DataError> {
        let change = SchemaChange::Grant {
            privileges: privileges.to_vec(),
            principal: principal.to_string(),
        };
        self.apply_schema(connection, table, &change).await
    }

    pub async fn revoke(
        &self,
        connection: &str,
        table: &str,
        privileges: &[String],
        principal: &str,
    ) -> Result<SchemaOutcome, DataError> {
        let change = SchemaChange::Revoke {
            privileges: privileges.to_vec(),
            principal: principal.to_string(),
        };
        self.apply_schema(connection, table, &change).await
    }

    // === 암호화 / 카탈로그 ===

    /// 단일 값 암호화 (연결 이름이 AAD로 묶입니다)
    pub fn encrypt(&self, connection: &str, plaintext: &str) -> Result<String, DataError> {
        let descriptor = self.resolve(connection)?;
        self.inner.codec.encrypt(&descriptor.name, plaintext)
    }

    pub fn decrypt(&self, connection: &str, ciphertext: &str) -> Result<String, DataError> {
        let descriptor = self.resolve(connection)?;
        self.inner.codec.decrypt(&descriptor.name, ciphertext)
    }

    /// 새 활성 키를 추가하고 버전을 반환합니다. 이전 키는 복호화용으로 유지됩니다.
    pub fn rotate_encryption_key(&self, key: Option<Vec<u8>>) -> Result<u32, DataError> {
        self.inner.codec.rotate_key(key)
    }

    /// 이미 존재하는 테이블의 암호화 컬럼을 등록합니다.
    pub fn register_encrypted_column(
        &self,
        connection: &str,
        table: &str,
        spec: EncryptedColumnSpec,
    ) -> Result<(), DataError> {
        let descriptor = self.resolve(connection)?;
        self.inner.codec.register_column(&descriptor.name, table, spec);
        Ok(())
    }

    /// 이미 존재하는 테이블에 soft delete를 켭니다.
    pub fn enable_soft_delete(&self, connection: &str, table: &str, column: Option<&str>) -> Result<(), DataError> {
        let descriptor = self.resolve(connection)?;
        let column = column.unwrap_or(DEFAULT_SOFT_DELETE_COLUMN);
        self.inner.catalog.enable_soft_delete(&descriptor.name, table, column);
        Ok(())
    }

    // === 병렬 실행 ===

    /// 배치를 등록하고 즉시 반환합니다. 결과는 `get_parallel_results`로 조회합니다.
    pub fn parallel_execute(&self, operations: Vec<Operation>) -> Result<BatchTicket, DataError> {
        self.inner.parallel.execute(self.runner(), operations)
    }

    /// 배치 상태 스냅샷 (배치는 유지됩니다)
    pub fn get_parallel_results(&self, batch_id: &str) -> Result<BatchResult, DataError> {
        self.inner.parallel.store().get(batch_id)
    }

    /// 배치 결과를 가져오고 저장소에서 제거합니다.
    pub fn consume_parallel_results(&self, batch_id: &str) -> Result<BatchResult, DataError> {
        self.inner.parallel.store().consume(batch_id)
    }

    /// 작업 하나를 백그라운드로 실행합니다.
    pub fn submit(&self, operation: Operation) -> Result<JobHandle, DataError> {
        self.inner.parallel.submit(self.runner(), operation)
    }

    /// 작업 하나를 현재 task에서 실행합니다.
    pub async fn execute_operation(&self, operation: &Operation) -> Result<OperationData, DataError> {
        let connection = operation.connection.as_str();
        let table = operation.table.as_str();

        let data = match operation.action()? {
            Action::Select(spec) => OperationData::Rows(self.query(connection, table, &spec).await?),
            Action::Fetch(conditions) => OperationData::Rows(self.fetch(connection, table, &conditions).await?),
            Action::Count(conditions) => OperationData::Count(self.fetch_count(connection, table, &conditions).await?),
            Action::Insert(rows) => OperationData::Affected(self.insert_many(connection, table, rows).await?),
            Action::Update(params) => {
                OperationData::Affected(self.update(connection, table, params.values, &params.conditions).await?)
            }
            Action::Upsert(params) => OperationData::Affected(
                self.upsert(connection, table, params.rows, &params.unique_by, params.update.as_deref())
                    .await?,
            ),
            Action::Delete(conditions) => OperationData::Affected(self.delete(connection, table, &conditions).await?),
            Action::SoftDelete(conditions) => {
                OperationData::Affected(self.soft_delete(connection, table, &conditions).await?)
            }
            Action::PermanentDelete(conditions) => {
                OperationData::Affected(self.permanent_delete(connection, table, &conditions).await?)
            }
            Action::Restore(conditions) => OperationData::Affected(self.restore(connection, table, &conditions).await?),
            Action::Schema(change) => OperationData::Schema(self.apply_schema(connection, table, &change).await?),
        };
        Ok(data)
    }

    // === raw SQL / 상태 ===

    /// bind 값과 함께 raw SELECT 실행 (복호화하지 않음)
    pub async fn select_raw(&self, connection: &str, sql: &str, params: Vec<Value>) -> Result<Vec<Row>, DataError> {
        let descriptor = self.resolve(connection)?;
        let executor = self.inner.registry.connect(&descriptor).await?;
        executor.select(&Statement::new(sql, params)).await
    }

    pub async fn execute_raw(&self, connection: &str, sql: &str, params: Vec<Value>) -> Result<AffectedInfo, DataError> {
        let descriptor = self.resolve(connection)?;
        self.run_write(&descriptor, &Statement::new(sql, params)).await
    }

    pub async fn health_check(&self, connection: &str) -> Result<bool, DataError> {
        let descriptor = self.resolve(connection)?;
        let executor = self.inner.registry.connect(&descriptor).await?;
        executor.health_check().await
    }

    /// 모든 풀을 닫습니다.
    pub async fn close(&self) {
        self.inner.registry.close_all().await;
    }

    // === 내부 ===

    fn runner(&self) -> Arc<dyn OperationRunner> {
        Arc::new(self.clone())
    }

    fn resolve(&self, connection: &str) -> Result<Arc<ConnectionDescriptor>, DataError> {
        self.inner.registry.resolve(connection)
    }

    fn compiler(&self, descriptor: &ConnectionDescriptor) -> QueryCompiler {
        QueryCompiler::new(descriptor.dialect, self.inner.config.query_config.raw_sql_policy)
    }

    fn searchable(
        &self,
        descriptor: &ConnectionDescriptor,
        table: &str,
        conditions: &[Condition],
    ) -> Result<Vec<Condition>, DataError> {
        self.inner
            .codec
            .searchable_conditions(&descriptor.name, table, conditions)
    }

    fn encrypt_rows(&self, descriptor: &ConnectionDescriptor, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, DataError> {
        rows.into_iter()
            .map(|row| self.inner.codec.encrypt_row(&descriptor.name, table, row))
            .collect()
    }

    fn decrypt_rows(&self, descriptor: &ConnectionDescriptor, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, DataError> {
        rows.into_iter()
            .map(|row| self.inner.codec.decrypt_row(&descriptor.name, table, row))
            .collect()
    }

    /// 연결의 카탈로그에서 테이블별 soft delete 컬럼을 찾는 범위
    fn soft_delete_scope<'a>(&'a self, descriptor: &'a ConnectionDescriptor) -> impl Fn(&str) -> Option<String> + 'a {
        move |table: &str| self.inner.catalog.soft_delete_column(&descriptor.name, table)
    }

    fn soft_delete_column(&self, descriptor: &ConnectionDescriptor, table: &str) -> Result<String, DataError> {
        self.inner
            .catalog
            .soft_delete_column(&descriptor.name, table)
            .ok_or_else(|| DataError::QuerySpec(format!("table '{table}' does not use soft delete")))
    }

    async fn run_soft_delete(
        &self,
        descriptor: &Arc<ConnectionDescriptor>,
        table: &str,
        column: &str,
        conditions: &[Condition],
    ) -> Result<AffectedInfo, DataError> {
        let conditions = self.searchable(descriptor, table, conditions)?;
        let statement = self.compiler(descriptor).compile_soft_delete(table, column, &conditions)?;
        self.run_write(descriptor, &statement).await
    }

    async fn run_delete(
        &self,
        descriptor: &Arc<ConnectionDescriptor>,
        table: &str,
        conditions: &[Condition],
    ) -> Result<AffectedInfo, DataError> {
        let conditions = self.searchable(descriptor, table, conditions)?;
        let statement = self.compiler(descriptor).compile_delete(table, &conditions)?;
        self.run_write(descriptor, &statement).await
    }

    async fn run_write(&self, descriptor: &Arc<ConnectionDescriptor>, statement: &Statement) -> Result<AffectedInfo, DataError> {
        let executor: Arc<QueryExecutor> = self.inner.registry.connect(descriptor).await?;
        executor.execute(statement).await
    }
}

#[async_trait]
impl OperationRunner for DataService {
    async fn run(&self, operation: &Operation) -> Result<OperationData, DataError> {
        self.execute_operation(operation).await
    }
}

fn base_table(table: &str) -> &str {
    split_alias(table).0
}

/// 조건 없는 UPDATE/DELETE 거부
fn require_conditions(conditions: &[Condition], operation: &str) -> Result<(), DataError> {
    if conditions.is_empty() {
        return Err(DataError::QuerySpec(format!("{operation} requires at least one where condition")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> DataService {
        let config = DataServiceConfig::new()
            .with_connection("central", "sqlite::memory:")
            .with_tenant_template("sqlite::memory:?tenant={id}");
        DataService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_connection_is_rejected_before_compiling() {
        let service = service();
        let err = service.fetch("nowhere", "users", &ConditionMap::new()).await.unwrap_err();
        assert!(matches!(err, DataError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_destructive_writes_require_conditions() {
        let service = service();
        let err = service.delete("central", "users", &[]).await.unwrap_err();
        assert!(matches!(err, DataError::QuerySpec(_)));

        let mut values = Row::new();
        values.insert("name".to_string(), json!("x"));
        let err = service.update("central", "users", values, &[]).await.unwrap_err();
        assert!(matches!(err, DataError::QuerySpec(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_requires_enabled_table() {
        let service = service();
        let err = service
            .soft_delete("central", "users", &[Condition::eq("id", json!(1))])
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::QuerySpec(message) if message.contains("soft delete")));
    }

    #[tokio::test]
    async fn test_upsert_rejects_encrypted_key() {
        let service = service();
        service
            .register_encrypted_column("central", "users", EncryptedColumnSpec::searchable("email"))
            .unwrap();

        let mut row = Row::new();
        row.insert("email".to_string(), json!("a@b.c"));
        let err = service
            .upsert("central", "users", vec![row], &["email".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::QuerySpec(_)));
    }

    #[test]
    fn test_encrypt_is_bound_to_connection() {
        let service = service();
        let ciphertext = service.encrypt("central", "secret").unwrap();
        assert_eq!(service.decrypt("central", &ciphertext).unwrap(), "secret");
        assert!(service.decrypt("tenant_acme", &ciphertext).is_err());
    }
}
