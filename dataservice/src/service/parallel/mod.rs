//! 병렬 배치 실행 모듈
//!
//! 작업 정의, 결과 저장소, 세마포어 기반 실행기, 단일 작업 핸들

pub mod executor;
pub mod job;
pub mod operation;
pub mod result_store;

pub use executor::{OperationRunner, ParallelExecutor};
pub use job::JobHandle;
pub use operation::{
    load_operations_file, Action, BatchResult, BatchStatus, BatchTicket, ItemOutcome, Operation, OperationData,
    OperationKind, ParallelOperationError, UpdateParams, UpsertParams, WhereParams,
};
pub use result_store::ResultStore;
