//! 테이블 설계도
//!
//! 스키마 변경 요청을 표현하는 타입들입니다.

use crate::security::crypto::CipherAlgorithm;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 논리 컬럼 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Increments,
    BigIncrements,
    Integer,
    BigInteger,
    SmallInteger,
    String,
    Text,
    LongText,
    Boolean,
    Decimal,
    Float,
    Double,
    Date,
    DateTime,
    Timestamp,
    Time,
    Json,
    Uuid,
    Binary,
}

impl ColumnType {
    pub fn is_auto_increment(&self) -> bool {
        matches!(self, ColumnType::Increments | ColumnType::BigIncrements)
    }
}

/// 컬럼 정의
///
/// `nullable`을 지정하지 않으면 NULL 허용입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub precision: Option<u8>,
    #[serde(default)]
    pub scale: Option<u8>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub encrypted: bool,
    /// 암호화 컬럼의 해시 컬럼 생성 여부 (기본 true)
    #[serde(default)]
    pub searchable: Option<bool>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            precision: None,
            scale: None,
            nullable: None,
            unique: false,
            index: false,
            default: None,
            encrypted: false,
            searchable: None,
        }
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }

    pub fn is_searchable(&self) -> bool {
        self.searchable.unwrap_or(true)
    }

    pub fn hash_column(&self) -> String {
        format!("{}_hash", self.name)
    }
}

/// 테이블 단위 암호화 옵션
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEncryption {
    #[serde(default)]
    pub algorithm: Option<CipherAlgorithm>,
    #[serde(default, alias = "key_version")]
    pub key_version: Option<u32>,
}

/// 테이블 생성 설계도
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBlueprint {
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, alias = "soft_delete")]
    pub soft_delete: bool,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub encryption: Option<TableEncryption>,
}

impl TableBlueprint {
    pub fn new(columns: Vec<ColumnDefinition>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }
}

/// ALTER TABLE 동작. 배열 순서대로 적용됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum AlterAction {
    Add(ColumnDefinition),
    Modify(ColumnDefinition),
    Drop { name: String },
    Rename { name: String, to: String },
}

/// 스키마 변경 요청 (병렬 배치의 `schema` 작업)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum SchemaChange {
    CreateTable(TableBlueprint),
    AlterTable { actions: Vec<AlterAction> },
    DropTable,
    CreateView { sql: String },
    DropView,
    Grant { privileges: Vec<String>, principal: String },
    Revoke { privileges: Vec<String>, principal: String },
}

/// 스키마 변경 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaOutcome {
    pub statements: Vec<String>,
}
