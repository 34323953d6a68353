//! 병렬 배치 작업 정의
//!
//! 작업은 JSON으로 전달되며, `params`는 실행 직전에 작업 종류별 타입으로 해석됩니다.
//! 해석 실패는 해당 슬롯의 에러로만 기록됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::service::db::core::types::{AffectedInfo, Row};
use crate::service::db::query::{Condition, ConditionMap, QuerySpec};
use crate::service::db::schema::{SchemaChange, SchemaOutcome};
use crate::tool::error::{DataError, ErrorKind};

/// 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Select,
    Fetch,
    Count,
    Insert,
    Update,
    Upsert,
    Delete,
    SoftDelete,
    PermanentDelete,
    Restore,
    Schema,
}

/// 배치에 담기는 작업 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub connection: String,
    pub table: String,
    pub kind: OperationKind,
    #[serde(default)]
    pub params: Value,
}

/// `update` 작업 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateParams {
    pub values: Row,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
}

/// `upsert` 작업 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertParams {
    pub rows: Vec<Row>,
    pub unique_by: Vec<String>,
    /// 충돌 시 갱신할 컬럼 (없으면 고유 키 외 전체)
    #[serde(default)]
    pub update: Option<Vec<String>>,
}

/// 조건만 받는 작업 파라미터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhereParams {
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InsertParams {
    Many(Vec<Row>),
    One(Row),
}

/// 해석된 작업
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Select(QuerySpec),
    Fetch(ConditionMap),
    Count(ConditionMap),
    Insert(Vec<Row>),
    Update(UpdateParams),
    Upsert(UpsertParams),
    Delete(Vec<Condition>),
    SoftDelete(Vec<Condition>),
    PermanentDelete(Vec<Condition>),
    Restore(Vec<Condition>),
    Schema(SchemaChange),
}

impl Operation {
    pub fn new(
        connection: impl Into<String>,
        table: impl Into<String>,
        kind: OperationKind,
        params: Value,
    ) -> Self {
        Self {
            connection: connection.into(),
            table: table.into(),
            kind,
            params,
        }
    }

    /// `params`를 작업 종류에 맞는 타입으로 해석합니다.
    pub fn action(&self) -> Result<Action, DataError> {
        let params = match &self.params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let action = match self.kind {
            OperationKind::Select => Action::Select(parse(self.kind, params)?),
            OperationKind::Fetch => Action::Fetch(parse(self.kind, params)?),
            OperationKind::Count => Action::Count(parse(self.kind, params)?),
            OperationKind::Insert => match parse(self.kind, params)? {
                InsertParams::Many(rows) => Action::Insert(rows),
                InsertParams::One(row) => Action::Insert(vec![row]),
            },
            OperationKind::Update => Action::Update(parse(self.kind, params)?),
            OperationKind::Upsert => Action::Upsert(parse(self.kind, params)?),
            OperationKind::Delete => Action::Delete(parse::<WhereParams>(self.kind, params)?.conditions),
            OperationKind::SoftDelete => Action::SoftDelete(parse::<WhereParams>(self.kind, params)?.conditions),
            OperationKind::PermanentDelete => {
                Action::PermanentDelete(parse::<WhereParams>(self.kind, params)?.conditions)
            }
            OperationKind::Restore => Action::Restore(parse::<WhereParams>(self.kind, params)?.conditions),
            OperationKind::Schema => Action::Schema(parse(self.kind, params)?),
        };
        Ok(action)
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: OperationKind, params: Value) -> Result<T, DataError> {
    serde_json::from_value(params).map_err(|e| DataError::QuerySpec(format!("invalid {kind:?} params: {e}")))
}

/// JSON 배열 파일에서 작업 목록을 읽습니다.
pub fn load_operations_file(path: impl AsRef<Path>) -> Result<Vec<Operation>, DataError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| DataError::Configuration(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| DataError::QuerySpec(format!("invalid operations file {}: {e}", path.display())))
}

/// 성공한 작업의 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum OperationData {
    Rows(Vec<Row>),
    Count(i64),
    Affected(AffectedInfo),
    Schema(SchemaOutcome),
}

impl OperationData {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            OperationData::Rows(rows) => Some(rows.as_slice()),
            _ => None,
        }
    }
}

/// 슬롯에 기록되는 작업 에러 (배치 호출자에게 던져지지 않음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelOperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DataError> for ParallelOperationError {
    fn from(error: &DataError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// 작업 하나의 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ItemOutcome {
    Success { data: OperationData },
    Error { error: ParallelOperationError },
}

impl ItemOutcome {
    pub fn from_result(result: Result<OperationData, DataError>) -> Self {
        match result {
            Ok(data) => ItemOutcome::Success { data },
            Err(e) => ItemOutcome::Error {
                error: ParallelOperationError::from(&e),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success { .. })
    }

    pub fn data(&self) -> Option<&OperationData> {
        match self {
            ItemOutcome::Success { data } => Some(data),
            ItemOutcome::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ParallelOperationError> {
        match self {
            ItemOutcome::Success { .. } => None,
            ItemOutcome::Error { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Pending,
    Complete,
}

/// `parallel_execute`의 반환값
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTicket {
    pub batch_id: String,
    pub total: usize,
}

/// 배치 결과 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: usize,
    pub completed: usize,
    pub created_at: DateTime<Utc>,
    /// 완료된 슬롯만 포함 (작업 인덱스 → 결과)
    pub items: BTreeMap<usize, ItemOutcome>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: OperationKind, params: Value) -> Operation {
        Operation::new("central", "users", kind, params)
    }

    #[test]
    fn test_deserialize_operation_list() {
        let operations: Vec<Operation> = serde_json::from_value(json!([
            {"connection": "central", "table": "users", "kind": "select",
             "params": {"where": [{"column": "id", "operator": ">", "value": 1}], "limit": 5}},
            {"connection": "central", "table": "users", "kind": "softDelete", "params": {"where": [{"column": "id", "value": 2}]}},
            {"connection": "central", "table": "users", "kind": "count"}
        ]))
        .unwrap();

        assert_eq!(operations[1].kind, OperationKind::SoftDelete);
        match operations[0].action().unwrap() {
            Action::Select(spec) => assert_eq!(spec.limit, Some(5)),
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(operations[2].action().unwrap(), Action::Count(ConditionMap::new()));
    }

    #[test]
    fn test_insert_accepts_one_or_many_rows() {
        let one = op(OperationKind::Insert, json!({"name": "a"})).action().unwrap();
        let many = op(OperationKind::Insert, json!([{"name": "a"}, {"name": "b"}])).action().unwrap();

        assert!(matches!(one, Action::Insert(rows) if rows.len() == 1));
        assert!(matches!(many, Action::Insert(rows) if rows.len() == 2));
    }

    #[test]
    fn test_malformed_params_are_query_spec_errors() {
        let bad = op(OperationKind::Update, json!({"where": []}));
        assert!(matches!(bad.action(), Err(DataError::QuerySpec(_))));

        let bad_schema = op(OperationKind::Schema, json!({"op": "truncate"}));
        assert!(matches!(bad_schema.action(), Err(DataError::QuerySpec(_))));
    }

    #[test]
    fn test_outcome_serialization() {
        let success = ItemOutcome::from_result(Ok(OperationData::Count(3)));
        assert_eq!(
            serde_json::to_value(&success).unwrap(),
            json!({"status": "success", "data": {"type": "count", "value": 3}})
        );

        let failure = ItemOutcome::from_result(Err(DataError::ConnectionNotFound("x".into())));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"status": "error", "error": {"kind": "connectionNotFound", "message": "connection not found: x"}})
        );
    }

    #[test]
    fn test_load_operations_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.json");
        std::fs::write(
            &path,
            r#"[{"connection": "central", "table": "users", "kind": "fetch", "params": {"id": 1}}]"#,
        )
        .unwrap();

        let operations = load_operations_file(&path).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].kind, OperationKind::Fetch);

        assert!(load_operations_file(dir.path().join("missing.json")).is_err());
    }
}
