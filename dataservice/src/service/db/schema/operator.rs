//! 스키마 변경 실행기
//!
//! 모든 단계를 먼저 컴파일한 뒤 순서대로 실행합니다. 실패한 단계에서 멈추며
//! 이전에 성공한 DDL은 되돌리지 않습니다.

use std::sync::Arc;
use tracing::{error, info};

use crate::security::crypto::EncryptionCodec;
use crate::service::db::core::connection::ConnectionDescriptor;
use crate::service::db::core::executor::QueryExecutor;
use crate::service::db::query::RawSqlPolicy;
use crate::tool::error::DataError;

use super::blueprint::{SchemaChange, SchemaOutcome};
use super::catalog::TableCatalog;
use super::ddl::{CatalogEffect, DdlCompiler, DdlStep, TableState};

pub struct SchemaOperator {
    codec: Arc<EncryptionCodec>,
    catalog: Arc<TableCatalog>,
    raw_policy: RawSqlPolicy,
}

impl SchemaOperator {
    pub fn new(codec: Arc<EncryptionCodec>, catalog: Arc<TableCatalog>, raw_policy: RawSqlPolicy) -> Self {
        Self {
            codec,
            catalog,
            raw_policy,
        }
    }

    /// 변경 요청을 DDL 단계 목록으로 컴파일합니다. DB에는 접근하지 않습니다.
    pub fn plan(&self, descriptor: &ConnectionDescriptor, table: &str, change: &SchemaChange) -> Result<Vec<DdlStep>, DataError> {
        let compiler = DdlCompiler::new(descriptor.dialect, self.raw_policy, self.codec.default_algorithm());

        match change {
            SchemaChange::CreateTable(blueprint) => compiler.create_table(table, blueprint),
            SchemaChange::AlterTable { actions } => {
                let state = TableState {
                    encrypted: self.codec.columns(&descriptor.name, table),
                    soft_delete_column: self.catalog.soft_delete_column(&descriptor.name, table),
                };
                compiler.alter_table(table, actions, state)
            }
            SchemaChange::DropTable => compiler.drop_table(table),
            SchemaChange::CreateView { sql } => compiler.create_view(table, sql),
            SchemaChange::DropView => compiler.drop_view(table),
            SchemaChange::Grant { privileges, principal } => compiler.grant(table, privileges, principal),
            SchemaChange::Revoke { privileges, principal } => compiler.revoke(table, privileges, principal),
        }
    }

    /// 컴파일된 단계를 순서대로 실행하고 성공한 단계의 카탈로그 변경을 반영합니다.
    pub async fn run(
        &self,
        connection: &str,
        executor: &QueryExecutor,
        table: &str,
        steps: Vec<DdlStep>,
    ) -> Result<SchemaOutcome, DataError> {
        let total = steps.len();
        let mut outcome = SchemaOutcome::default();

        for (index, step) in steps.into_iter().enumerate() {
            info!("DDL {}/{} on {}: {}", index + 1, total, connection, step.sql);

            if let Err(e) = executor.execute_ddl(&step.sql).await {
                error!("DDL step {} failed on {}: {}", index, connection, e);
                return Err(DataError::SchemaOperation {
                    step: index,
                    statement: step.sql,
                    message: e.to_string(),
                });
            }

            for effect in &step.effects {
                self.apply_effect(connection, table, effect);
            }
            outcome.statements.push(step.sql);
        }

        Ok(outcome)
    }

    fn apply_effect(&self, connection: &str, table: &str, effect: &CatalogEffect) {
        match effect {
            CatalogEffect::RegisterEncrypted(spec) => self.codec.register_column(connection, table, spec.clone()),
            CatalogEffect::UnregisterEncrypted(column) => self.codec.unregister_column(connection, table, column),
            CatalogEffect::RenameColumn { from, to } => {
                self.codec.rename_column(connection, table, from, to);
                self.catalog.rename_column(connection, table, from, to);
            }
            CatalogEffect::EnableSoftDelete(column) => self.catalog.enable_soft_delete(connection, table, column),
            CatalogEffect::DisableSoftDelete => self.catalog.disable_soft_delete(connection, table),
            CatalogEffect::DropTable => {
                self.codec.unregister_table(connection, table);
                self.catalog.remove_table(connection, table);
            }
        }
    }
}
