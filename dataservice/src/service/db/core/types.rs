//! Common type definitions for data service
//!
//! Shared types used across data service modules

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query result row type - column name to JSON value (sorted by column name)
pub type Row = serde_json::Map<String, Value>;

/// Compiled statement: SQL text plus positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Write operation result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedInfo {
    pub affected_rows: u64,
    pub last_insert_id: Option<i64>,
}

/// Connection statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub total_connections: u32,
    pub max_connections: u32,
    pub connection_errors: u64,
    pub total_queries: u64,
}
