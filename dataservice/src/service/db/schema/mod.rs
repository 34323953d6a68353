//! 스키마 모듈
//!
//! 테이블 설계도, DDL 컴파일, 스키마 변경 실행, 테이블 프로필 카탈로그

pub mod blueprint;
pub mod catalog;
pub mod ddl;
pub mod operator;

pub use blueprint::{
    AlterAction, ColumnDefinition, ColumnType, SchemaChange, SchemaOutcome, TableBlueprint, TableEncryption,
};
pub use catalog::{TableCatalog, TableProfile, DEFAULT_SOFT_DELETE_COLUMN};
pub use ddl::{CatalogEffect, DdlCompiler, DdlStep, TableState};
pub use operator::SchemaOperator;
