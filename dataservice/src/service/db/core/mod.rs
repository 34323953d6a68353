//! Core data service modules
//!
//! 설정, 연결 해석/풀, 쿼리 실행, 공통 타입

pub mod config;
pub mod connection;
pub mod executor;
pub mod types;

pub use config::{
    ConnectionConfig, DataServiceConfig, EncryptionConfig, ExecutorConfig, PoolConfig, QueryConfig, TenantConfig,
};
pub use connection::{ConnectionDescriptor, ConnectionRegistry, Database, DbPool, IsolationBoundary};
pub use executor::QueryExecutor;
pub use types::*;
