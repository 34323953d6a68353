//! 데이터베이스 서비스 모듈
//!
//! MySQL/MariaDB, PostgreSQL, SQLite 연결을 이름으로 다루는 데이터 서비스를 제공합니다.

// 핵심 모듈들
pub mod core;          // 설정, 연결 해석/풀, 실행기, 공통 타입
pub mod query;         // 선언형 쿼리 → 방언별 SQL
pub mod schema;        // 테이블 설계도, DDL, 스키마 변경
pub mod data_service;  // 서비스 진입점

pub use data_service::DataService;

pub use self::core::{
    // 설정 관련
    config::{
        ConnectionConfig, DataServiceConfig, EncryptionConfig, ExecutorConfig, PoolConfig, QueryConfig,
        TenantConfig,
    },
    // 연결 관리
    connection::{ConnectionDescriptor, ConnectionRegistry, IsolationBoundary},
    // 쿼리 실행
    executor::QueryExecutor,
    // 데이터 타입들
    types::{AffectedInfo, ConnectionStats, Row, Statement},
};
pub use query::{
    Condition, ConditionMap, Dialect, Direction, JoinSpec, JoinType, OrderBy, QueryCompiler, QuerySpec, RawSqlPolicy,
    SelectItem,
};
pub use schema::{
    AlterAction, ColumnDefinition, ColumnType, SchemaChange, SchemaOutcome, TableBlueprint, TableEncryption,
};
