//! 데이터 서비스 라이브러리
//!
//! 이름으로 구분되는 여러 데이터베이스 연결(정적 연결과 `tenant_<id>` 테넌트 연결)에 대해
//! 선언형 쿼리, 컬럼 암호화, 스키마 변경, 병렬 배치 실행을 제공합니다.

pub mod config;
pub mod logging;
pub mod security;
pub mod service;
pub mod tool;

pub use security::{CipherAlgorithm, EncryptedColumnSpec, EncryptionCodec, KeyMaterial, KeyProvider, KeyRing};
pub use service::db::{
    AffectedInfo, Condition, ConditionMap, DataService, DataServiceConfig, Dialect, QuerySpec, Row, SchemaChange,
    TableBlueprint,
};
pub use service::parallel::{BatchResult, BatchStatus, BatchTicket, ItemOutcome, Operation, OperationData, OperationKind};
pub use tool::error::{DataError, ErrorKind};
