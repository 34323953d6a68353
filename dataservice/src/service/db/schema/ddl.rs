//! DDL 컴파일러
//!
//! 설계도와 변경 요청을 실행 순서대로 나열된 DDL 단계로 변환합니다.
//! 각 단계는 성공했을 때 반영할 카탈로그 변경을 함께 가집니다.

use crate::security::crypto::{CipherAlgorithm, EncryptedColumnSpec};
use crate::service::db::query::dialect::string_literal;
use crate::service::db::query::{Dialect, RawSqlPolicy};
use crate::tool::error::DataError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use super::blueprint::{AlterAction, ColumnDefinition, ColumnType, TableBlueprint};
use super::catalog::DEFAULT_SOFT_DELETE_COLUMN;

static MYSQL_PRINCIPAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)(?:@([A-Za-z0-9_.%-]+))?$").expect("principal pattern is valid")
});

const PRIVILEGES: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "ALTER", "INDEX", "REFERENCES", "ALL"];

/// 단계 성공 후 반영할 카탈로그 변경
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEffect {
    RegisterEncrypted(EncryptedColumnSpec),
    UnregisterEncrypted(String),
    RenameColumn { from: String, to: String },
    EnableSoftDelete(String),
    DisableSoftDelete,
    DropTable,
}

/// 하나의 DDL 문장
#[derive(Debug, Clone, PartialEq)]
pub struct DdlStep {
    pub sql: String,
    pub effects: Vec<CatalogEffect>,
}

impl DdlStep {
    fn new(sql: String) -> Self {
        Self { sql, effects: Vec::new() }
    }

    fn with_effect(sql: String, effect: CatalogEffect) -> Self {
        Self {
            sql,
            effects: vec![effect],
        }
    }
}

/// 테이블의 현재 카탈로그 상태 (ALTER 컴파일에 필요)
///
/// 액션 하나를 컴파일할 때마다 그 효과가 반영되어 다음 액션이 이를 봅니다.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    pub encrypted: Vec<EncryptedColumnSpec>,
    pub soft_delete_column: Option<String>,
}

impl TableState {
    fn encrypted_column(&self, name: &str) -> Option<&EncryptedColumnSpec> {
        self.encrypted.iter().find(|spec| spec.column == name)
    }

    fn apply(&mut self, effect: &CatalogEffect) {
        match effect {
            CatalogEffect::RegisterEncrypted(spec) => {
                self.encrypted.retain(|existing| existing.column != spec.column);
                self.encrypted.push(spec.clone());
            }
            CatalogEffect::UnregisterEncrypted(column) => self.encrypted.retain(|spec| &spec.column != column),
            CatalogEffect::RenameColumn { from, to } => {
                for spec in self.encrypted.iter_mut().filter(|spec| &spec.column == from) {
                    spec.column = to.clone();
                }
                if self.soft_delete_column.as_deref() == Some(from.as_str()) {
                    self.soft_delete_column = Some(to.clone());
                }
            }
            CatalogEffect::EnableSoftDelete(column) => self.soft_delete_column = Some(column.clone()),
            CatalogEffect::DisableSoftDelete => self.soft_delete_column = None,
            CatalogEffect::DropTable => *self = TableState::default(),
        }
    }
}

pub struct DdlCompiler {
    dialect: Dialect,
    raw_policy: RawSqlPolicy,
    default_algorithm: CipherAlgorithm,
}

impl DdlCompiler {
    pub fn new(dialect: Dialect, raw_policy: RawSqlPolicy, default_algorithm: CipherAlgorithm) -> Self {
        Self {
            dialect,
            raw_policy,
            default_algorithm,
        }
    }

    pub fn create_table(&self, table: &str, blueprint: &TableBlueprint) -> Result<Vec<DdlStep>, DataError> {
        if blueprint.columns.is_empty() {
            return Err(DataError::QuerySpec(format!("table '{table}' needs at least one column")));
        }

        let table_sql = self.dialect.quote_name(table)?;
        let mut seen = HashSet::new();
        let mut definitions = Vec::new();
        let mut effects = Vec::new();
        let mut trailing = Vec::new();

        for column in &blueprint.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DataError::QuerySpec(format!("duplicate column '{}'", column.name)));
            }

            if column.encrypted {
                let spec = self.encrypted_spec(column, blueprint)?;
                definitions.push(self.encrypted_column_sql(column)?);
                if let Some(hash_column) = &spec.hash_column {
                    let mut hash = self.hash_column_sql(hash_column)?;
                    if column.unique {
                        hash.push_str(" UNIQUE");
                    } else {
                        trailing.push(DdlStep::new(self.create_index(table, hash_column, false)?));
                    }
                    definitions.push(hash);
                }
                effects.push(CatalogEffect::RegisterEncrypted(spec));
            } else {
                let mut definition = self.column_sql(column)?;
                if column.unique && !column.column_type.is_auto_increment() {
                    definition.push_str(" UNIQUE");
                } else if column.index {
                    trailing.push(DdlStep::new(self.create_index(table, &column.name, false)?));
                }
                definitions.push(definition);
            }
        }

        if blueprint.timestamps {
            for name in ["created_at", "updated_at"] {
                if seen.insert(name) {
                    definitions.push(self.timestamp_column_sql(name)?);
                }
            }
        }
        if blueprint.soft_delete {
            if seen.insert(DEFAULT_SOFT_DELETE_COLUMN) {
                definitions.push(self.timestamp_column_sql(DEFAULT_SOFT_DELETE_COLUMN)?);
            }
            effects.push(CatalogEffect::EnableSoftDelete(DEFAULT_SOFT_DELETE_COLUMN.to_string()));
        }

        let mut steps = vec![DdlStep {
            sql: format!("CREATE TABLE {table_sql} ({})", definitions.join(", ")),
            effects,
        }];
        steps.extend(trailing);
        Ok(steps)
    }

    pub fn alter_table(
        &self,
        table: &str,
        actions: &[AlterAction],
        mut state: TableState,
    ) -> Result<Vec<DdlStep>, DataError> {
        if actions.is_empty() {
            return Err(DataError::QuerySpec("alter table requires at least one action".to_string()));
        }

        let table_sql = self.dialect.quote_name(table)?;
        let mut steps = Vec::new();

        for action in actions {
            let planned = steps.len();
            match action {
                AlterAction::Add(column) => self.alter_add(table, &table_sql, column, &mut steps)?,
                AlterAction::Modify(column) => {
                    if column.encrypted || state.encrypted_column(&column.name).is_some() {
                        return Err(DataError::QuerySpec(format!(
                            "encrypted column '{}' cannot be modified; drop and add it instead",
                            column.name
                        )));
                    }
                    self.alter_modify(&table_sql, column, &mut steps)?;
                }
                AlterAction::Drop { name } => {
                    let encrypted = state.encrypted_column(name);
                    let hash_column = encrypted.and_then(|spec| spec.hash_column.clone());

                    if self.dialect == Dialect::Sqlite {
                        let indexed = hash_column.as_deref().unwrap_or(name);
                        for prefix in ["idx", "uniq"] {
                            steps.push(DdlStep::new(format!(
                                "DROP INDEX IF EXISTS {}",
                                self.index_name(prefix, table, indexed)?
                            )));
                        }
                    }

                    let mut step = DdlStep::new(format!(
                        "ALTER TABLE {table_sql} DROP COLUMN {}",
                        self.dialect.quote_name(name)?
                    ));
                    if encrypted.is_some() {
                        step.effects.push(CatalogEffect::UnregisterEncrypted(name.clone()));
                    }
                    if state.soft_delete_column.as_deref() == Some(name.as_str()) {
                        step.effects.push(CatalogEffect::DisableSoftDelete);
                    }
                    steps.push(step);

                    if let Some(hash_column) = hash_column {
                        steps.push(DdlStep::new(format!(
                            "ALTER TABLE {table_sql} DROP COLUMN {}",
                            self.dialect.quote_name(&hash_column)?
                        )));
                    }
                }
                AlterAction::Rename { name, to } => {
                    if state.encrypted_column(name).is_some() {
                        return Err(DataError::QuerySpec(format!(
                            "encrypted column '{name}' cannot be renamed"
                        )));
                    }
                    steps.push(DdlStep::with_effect(
                        format!(
                            "ALTER TABLE {table_sql} RENAME COLUMN {} TO {}",
                            self.dialect.quote_name(name)?,
                            self.dialect.quote_name(to)?
                        ),
                        CatalogEffect::RenameColumn {
                            from: name.clone(),
                            to: to.clone(),
                        },
                    ));
                }
            }

            for effect in steps[planned..].iter().flat_map(|step| &step.effects) {
                state.apply(effect);
            }
        }

        Ok(steps)
    }

    pub fn drop_table(&self, table: &str) -> Result<Vec<DdlStep>, DataError> {
        Ok(vec![DdlStep::with_effect(
            format!("DROP TABLE IF EXISTS {}", self.dialect.quote_name(table)?),
            CatalogEffect::DropTable,
        )])
    }

    pub fn create_view(&self, view: &str, body: &str) -> Result<Vec<DdlStep>, DataError> {
        let body = self.raw_policy.check(body, "view body")?;
        Ok(vec![DdlStep::new(format!(
            "CREATE VIEW {} AS {body}",
            self.dialect.quote_name(view)?
        ))])
    }

    pub fn drop_view(&self, view: &str) -> Result<Vec<DdlStep>, DataError> {
        Ok(vec![DdlStep::new(format!(
            "DROP VIEW IF EXISTS {}",
            self.dialect.quote_name(view)?
        ))])
    }

    pub fn grant(&self, table: &str, privileges: &[String], principal: &str) -> Result<Vec<DdlStep>, DataError> {
        let (privileges, principal) = self.privilege_parts("GRANT", privileges, principal)?;
        Ok(vec![DdlStep::new(format!(
            "GRANT {privileges} ON {} TO {principal}",
            self.dialect.quote_name(table)?
        ))])
    }

    pub fn revoke(&self, table: &str, privileges: &[String], principal: &str) -> Result<Vec<DdlStep>, DataError> {
        let (privileges, principal) = self.privilege_parts("REVOKE", privileges, principal)?;
        Ok(vec![DdlStep::new(format!(
            "REVOKE {privileges} ON {} FROM {principal}",
            self.dialect.quote_name(table)?
        ))])
    }

    fn privilege_parts(
        &self,
        statement: &str,
        privileges: &[String],
        principal: &str,
    ) -> Result<(String, String), DataError> {
        if self.dialect == Dialect::Sqlite {
            return Err(DataError::unsupported(self.dialect, statement));
        }
        if privileges.is_empty() {
            return Err(DataError::QuerySpec(format!("{statement} requires at least one privilege")));
        }

        let mut normalized = Vec::with_capacity(privileges.len());
        for privilege in privileges {
            let upper = privilege.trim().to_ascii_uppercase();
            let upper = if upper == "ALL PRIVILEGES" { "ALL".to_string() } else { upper };
            if !PRIVILEGES.contains(&upper.as_str()) {
                return Err(DataError::QuerySpec(format!("unknown privilege '{privilege}'")));
            }
            normalized.push(upper);
        }

        let principal = match self.dialect {
            Dialect::MySql => {
                let caps = MYSQL_PRINCIPAL
                    .captures(principal.trim())
                    .ok_or_else(|| DataError::QuerySpec(format!("invalid principal '{principal}'")))?;
                let user = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let host = caps.get(2).map(|m| m.as_str()).unwrap_or("%");
                format!("{}@{}", string_literal(user), string_literal(host))
            }
            _ => self.dialect.quote_name(principal.trim())?,
        };

        Ok((normalized.join(", "), principal))
    }

    fn alter_add(
        &self,
        table: &str,
        table_sql: &str,
        column: &ColumnDefinition,
        steps: &mut Vec<DdlStep>,
    ) -> Result<(), DataError> {
        if column.encrypted {
            let spec = self.encrypted_spec(column, &TableBlueprint::default())?;
            let column_step = format!("ALTER TABLE {table_sql} ADD COLUMN {}", self.encrypted_column_sql(column)?);
            match &spec.hash_column {
                Some(hash_column) => {
                    steps.push(DdlStep::new(column_step));
                    steps.push(DdlStep::with_effect(
                        format!("ALTER TABLE {table_sql} ADD COLUMN {}", self.hash_column_sql(hash_column)?),
                        CatalogEffect::RegisterEncrypted(spec.clone()),
                    ));
                    steps.push(DdlStep::new(self.create_index(table, hash_column, column.unique)?));
                }
                None => steps.push(DdlStep::with_effect(column_step, CatalogEffect::RegisterEncrypted(spec))),
            }
            return Ok(());
        }

        steps.push(DdlStep::new(format!(
            "ALTER TABLE {table_sql} ADD COLUMN {}",
            self.column_sql(column)?
        )));
        if column.unique {
            steps.push(DdlStep::new(self.create_index(table, &column.name, true)?));
        } else if column.index {
            steps.push(DdlStep::new(self.create_index(table, &column.name, false)?));
        }
        Ok(())
    }

    fn alter_modify(&self, table_sql: &str, column: &ColumnDefinition, steps: &mut Vec<DdlStep>) -> Result<(), DataError> {
        match self.dialect {
            Dialect::Sqlite => Err(DataError::unsupported(self.dialect, "ALTER TABLE ... MODIFY COLUMN")),
            Dialect::MySql => {
                let mut definition = self.column_sql(column)?;
                if column.unique {
                    definition.push_str(" UNIQUE");
                }
                steps.push(DdlStep::new(format!("ALTER TABLE {table_sql} MODIFY COLUMN {definition}")));
                Ok(())
            }
            Dialect::Postgres => {
                if column.column_type.is_auto_increment() {
                    return Err(DataError::QuerySpec(format!(
                        "column '{}' cannot be modified into an auto-increment column",
                        column.name
                    )));
                }
                let name = self.dialect.quote_name(&column.name)?;
                steps.push(DdlStep::new(format!(
                    "ALTER TABLE {table_sql} ALTER COLUMN {name} TYPE {}",
                    self.type_sql(column)?
                )));
                let nullability = if column.is_nullable() { "DROP NOT NULL" } else { "SET NOT NULL" };
                steps.push(DdlStep::new(format!("ALTER TABLE {table_sql} ALTER COLUMN {name} {nullability}")));
                if let Some(default) = &column.default {
                    steps.push(DdlStep::new(format!(
                        "ALTER TABLE {table_sql} ALTER COLUMN {name} SET DEFAULT {}",
                        default_literal(default)?
                    )));
                }
                Ok(())
            }
        }
    }

    fn encrypted_spec(&self, column: &ColumnDefinition, blueprint: &TableBlueprint) -> Result<EncryptedColumnSpec, DataError> {
        if column.column_type.is_auto_increment() {
            return Err(DataError::QuerySpec(format!(
                "auto-increment column '{}' cannot be encrypted",
                column.name
            )));
        }
        if column.default.is_some() {
            return Err(DataError::QuerySpec(format!(
                "encrypted column '{}' cannot have a default value",
                column.name
            )));
        }
        if column.unique && !column.is_searchable() {
            return Err(DataError::QuerySpec(format!(
                "unique encrypted column '{}' must be searchable",
                column.name
            )));
        }

        let encryption = blueprint.encryption.clone().unwrap_or_default();
        Ok(EncryptedColumnSpec {
            column: column.name.clone(),
            algorithm: encryption.algorithm.unwrap_or(self.default_algorithm),
            key_version: encryption.key_version,
            hash_column: column.is_searchable().then(|| column.hash_column()),
        })
    }

    /// 암호문은 항상 TEXT에 저장됩니다.
    fn encrypted_column_sql(&self, column: &ColumnDefinition) -> Result<String, DataError> {
        let mut sql = format!("{} TEXT", self.dialect.quote_name(&column.name)?);
        sql.push_str(&self.nullability(column.is_nullable()));
        Ok(sql)
    }

    fn hash_column_sql(&self, hash_column: &str) -> Result<String, DataError> {
        Ok(format!(
            "{} VARCHAR(64){}",
            self.dialect.quote_name(hash_column)?,
            self.nullability(true)
        ))
    }

    fn timestamp_column_sql(&self, name: &str) -> Result<String, DataError> {
        Ok(format!(
            "{} TIMESTAMP{}",
            self.dialect.quote_name(name)?,
            self.nullability(true)
        ))
    }

    fn column_sql(&self, column: &ColumnDefinition) -> Result<String, DataError> {
        let mut sql = format!("{} {}", self.dialect.quote_name(&column.name)?, self.type_sql(column)?);
        if column.column_type.is_auto_increment() {
            return Ok(sql);
        }
        sql.push_str(&self.nullability(column.is_nullable()));
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_literal(default)?);
        }
        Ok(sql)
    }

    fn nullability(&self, nullable: bool) -> String {
        match (nullable, self.dialect) {
            (false, _) => " NOT NULL".to_string(),
            (true, Dialect::MySql) => " NULL".to_string(),
            (true, _) => String::new(),
        }
    }

    fn type_sql(&self, column: &ColumnDefinition) -> Result<String, DataError> {
        use ColumnType::*;

        let sql = match (column.column_type, self.dialect) {
            (Increments, Dialect::MySql) => "INT UNSIGNED AUTO_INCREMENT PRIMARY KEY".to_string(),
            (Increments, Dialect::Postgres) => "SERIAL PRIMARY KEY".to_string(),
            (BigIncrements, Dialect::MySql) => "BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY".to_string(),
            (BigIncrements, Dialect::Postgres) => "BIGSERIAL PRIMARY KEY".to_string(),
            (Increments | BigIncrements, Dialect::Sqlite) => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            (Integer, Dialect::MySql) => "INT".to_string(),
            (Integer, _) => "INTEGER".to_string(),
            (BigInteger, Dialect::Sqlite) => "INTEGER".to_string(),
            (BigInteger, _) => "BIGINT".to_string(),
            (SmallInteger, _) => "SMALLINT".to_string(),
            (String, _) => format!("VARCHAR({})", column.length.unwrap_or(255)),
            (Text, _) => "TEXT".to_string(),
            (LongText, Dialect::MySql) => "LONGTEXT".to_string(),
            (LongText, _) => "TEXT".to_string(),
            (Boolean, _) => "BOOLEAN".to_string(),
            (Decimal, _) => format!(
                "DECIMAL({}, {})",
                column.precision.unwrap_or(8),
                column.scale.unwrap_or(2)
            ),
            (Float, Dialect::MySql) => "FLOAT".to_string(),
            (Float, _) => "REAL".to_string(),
            (Double, Dialect::MySql) => "DOUBLE".to_string(),
            (Double, Dialect::Postgres) => "DOUBLE PRECISION".to_string(),
            (Double, Dialect::Sqlite) => "REAL".to_string(),
            (Date, _) => "DATE".to_string(),
            (DateTime, Dialect::Postgres) => "TIMESTAMP".to_string(),
            (DateTime, _) => "DATETIME".to_string(),
            (Timestamp, _) => "TIMESTAMP".to_string(),
            (Time, _) => "TIME".to_string(),
            (Json, Dialect::MySql) => "JSON".to_string(),
            (Json, Dialect::Postgres) => "JSONB".to_string(),
            (Json, Dialect::Sqlite) => "TEXT".to_string(),
            (Uuid, Dialect::MySql) => "CHAR(36)".to_string(),
            (Uuid, Dialect::Postgres) => "UUID".to_string(),
            (Uuid, Dialect::Sqlite) => "TEXT".to_string(),
            (Binary, Dialect::Postgres) => "BYTEA".to_string(),
            (Binary, _) => "BLOB".to_string(),
        };
        Ok(sql)
    }

    fn index_name(&self, prefix: &str, table: &str, column: &str) -> Result<String, DataError> {
        self.dialect.quote_name(&format!("{prefix}_{table}_{column}"))
    }

    fn create_index(&self, table: &str, column: &str, unique: bool) -> Result<String, DataError> {
        let (keyword, prefix) = if unique { ("CREATE UNIQUE INDEX", "uniq") } else { ("CREATE INDEX", "idx") };
        Ok(format!(
            "{keyword} {} ON {} ({})",
            self.index_name(prefix, table, column)?,
            self.dialect.quote_name(table)?,
            self.dialect.quote_name(column)?
        ))
    }
}

fn default_literal(value: &Value) -> Result<String, DataError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Number(number) => Ok(number.to_string()),
        Value::String(text) => Ok(string_literal(text)),
        _ => Err(DataError::QuerySpec("column default must be a scalar".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::db::schema::blueprint::ColumnDefinition as Col;

    fn compiler(dialect: Dialect) -> DdlCompiler {
        DdlCompiler::new(dialect, RawSqlPolicy::Guarded, CipherAlgorithm::default())
    }

    fn users() -> TableBlueprint {
        TableBlueprint::new(vec![
            Col::new("id", ColumnType::BigIncrements),
            Col::new("secret", ColumnType::Text).encrypted(),
        ])
    }

    #[test]
    fn test_create_table_with_encrypted_column_sqlite() {
        let steps = compiler(Dialect::Sqlite).create_table("t", &users()).unwrap();
        assert_eq!(
            steps[0].sql,
            "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"secret\" TEXT, \"secret_hash\" VARCHAR(64))"
        );
        assert_eq!(steps[1].sql, "CREATE INDEX \"idx_t_secret_hash\" ON \"t\" (\"secret_hash\")");
        assert_eq!(
            steps[0].effects,
            vec![CatalogEffect::RegisterEncrypted(EncryptedColumnSpec::searchable("secret"))]
        );
    }

    #[test]
    fn test_create_table_mysql_types() {
        let blueprint = TableBlueprint::new(vec![
            Col::new("id", ColumnType::BigIncrements),
            Col::new("email", ColumnType::String).length(120).not_null().unique(),
            Col::new("active", ColumnType::Boolean).default_value(true),
            Col::new("score", ColumnType::Integer).index(),
        ])
        .soft_delete();
        let steps = compiler(Dialect::MySql).create_table("users", &blueprint).unwrap();

        assert_eq!(
            steps[0].sql,
            "CREATE TABLE `users` (`id` BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY, \
             `email` VARCHAR(120) NOT NULL UNIQUE, `active` BOOLEAN NULL DEFAULT TRUE, \
             `score` INT NULL, `deleted_at` TIMESTAMP NULL)"
        );
        assert_eq!(steps[1].sql, "CREATE INDEX `idx_users_score` ON `users` (`score`)");
        assert_eq!(
            steps[0].effects,
            vec![CatalogEffect::EnableSoftDelete("deleted_at".into())]
        );
    }

    #[test]
    fn test_postgres_big_increments() {
        let steps = compiler(Dialect::Postgres).create_table("t", &users()).unwrap();
        assert!(steps[0].sql.starts_with("CREATE TABLE \"t\" (\"id\" BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn test_opaque_encrypted_column_has_no_hash() {
        let mut column = Col::new("note", ColumnType::Text).encrypted();
        column.searchable = Some(false);
        let steps = compiler(Dialect::Sqlite)
            .create_table("t", &TableBlueprint::new(vec![column]))
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sql, "CREATE TABLE \"t\" (\"note\" TEXT)");
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let blueprint = TableBlueprint::new(vec![
            Col::new("a", ColumnType::Integer),
            Col::new("a", ColumnType::Text),
        ]);
        assert!(compiler(Dialect::Sqlite).create_table("t", &blueprint).is_err());
    }

    #[test]
    fn test_alter_add_then_drop_sqlite() {
        let actions = vec![
            AlterAction::Add(Col::new("age", ColumnType::Integer)),
            AlterAction::Drop { name: "age".into() },
        ];
        let steps = compiler(Dialect::Sqlite)
            .alter_table("t", &actions, TableState::default())
            .unwrap();
        let sql: Vec<&str> = steps.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"t\" ADD COLUMN \"age\" INTEGER",
                "DROP INDEX IF EXISTS \"idx_t_age\"",
                "DROP INDEX IF EXISTS \"uniq_t_age\"",
                "ALTER TABLE \"t\" DROP COLUMN \"age\"",
            ]
        );
    }

    #[test]
    fn test_alter_modify_per_dialect() {
        let actions = vec![AlterAction::Modify(Col::new("age", ColumnType::BigInteger).not_null())];
        assert!(matches!(
            compiler(Dialect::Sqlite).alter_table("t", &actions, TableState::default()),
            Err(DataError::SqlCompilation { .. })
        ));

        let steps = compiler(Dialect::MySql)
            .alter_table("t", &actions, TableState::default())
            .unwrap();
        assert_eq!(steps[0].sql, "ALTER TABLE `t` MODIFY COLUMN `age` BIGINT NOT NULL");

        let steps = compiler(Dialect::Postgres)
            .alter_table("t", &actions, TableState::default())
            .unwrap();
        assert_eq!(steps[0].sql, "ALTER TABLE \"t\" ALTER COLUMN \"age\" TYPE BIGINT");
        assert_eq!(steps[1].sql, "ALTER TABLE \"t\" ALTER COLUMN \"age\" SET NOT NULL");
    }

    #[test]
    fn test_drop_encrypted_column_drops_hash() {
        let state = TableState {
            encrypted: vec![EncryptedColumnSpec::searchable("secret")],
            soft_delete_column: None,
        };
        let steps = compiler(Dialect::MySql)
            .alter_table("t", &[AlterAction::Drop { name: "secret".into() }], state.clone())
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].effects, vec![CatalogEffect::UnregisterEncrypted("secret".into())]);
        assert_eq!(steps[1].sql, "ALTER TABLE `t` DROP COLUMN `secret_hash`");

        let rename = compiler(Dialect::MySql).alter_table(
            "t",
            &[AlterAction::Rename {
                name: "secret".into(),
                to: "other".into(),
            }],
            state,
        );
        assert!(rename.is_err());
    }

    #[test]
    fn test_later_actions_see_earlier_ones() {
        let add_secret = AlterAction::Add(Col::new("secret", ColumnType::String).encrypted());

        let steps = compiler(Dialect::MySql)
            .alter_table(
                "t",
                &[add_secret.clone(), AlterAction::Drop { name: "secret".into() }],
                TableState::default(),
            )
            .unwrap();
        let sql: Vec<&str> = steps.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(sql.last(), Some(&"ALTER TABLE `t` DROP COLUMN `secret_hash`"));
        assert!(steps
            .iter()
            .any(|step| step.effects == vec![CatalogEffect::UnregisterEncrypted("secret".into())]));

        let renamed = compiler(Dialect::MySql).alter_table(
            "t",
            &[
                add_secret,
                AlterAction::Rename {
                    name: "secret".into(),
                    to: "s2".into(),
                },
            ],
            TableState::default(),
        );
        assert!(matches!(renamed, Err(DataError::QuerySpec(_))));

        let state = TableState {
            encrypted: Vec::new(),
            soft_delete_column: Some("deleted_at".into()),
        };
        let steps = compiler(Dialect::Postgres)
            .alter_table(
                "t",
                &[
                    AlterAction::Rename {
                        name: "deleted_at".into(),
                        to: "removed_at".into(),
                    },
                    AlterAction::Drop { name: "removed_at".into() },
                ],
                state,
            )
            .unwrap();
        assert_eq!(steps[1].effects, vec![CatalogEffect::DisableSoftDelete]);
    }

    #[test]
    fn test_views_and_drops() {
        let c = compiler(Dialect::Sqlite);
        assert_eq!(c.drop_table("t").unwrap()[0].sql, "DROP TABLE IF EXISTS \"t\"");
        assert_eq!(
            c.create_view("active_users", "SELECT * FROM users WHERE active = 1").unwrap()[0].sql,
            "CREATE VIEW \"active_users\" AS SELECT * FROM users WHERE active = 1"
        );
        assert!(c.create_view("v", "SELECT 1; DROP TABLE t").is_err());
        assert_eq!(c.drop_view("v").unwrap()[0].sql, "DROP VIEW IF EXISTS \"v\"");
    }

    #[test]
    fn test_grant_and_revoke() {
        let privileges = vec!["select".to_string(), "insert".to_string()];
        assert_eq!(
            compiler(Dialect::MySql).grant("users", &privileges, "reader@localhost").unwrap()[0].sql,
            "GRANT SELECT, INSERT ON `users` TO 'reader'@'localhost'"
        );
        assert_eq!(
            compiler(Dialect::Postgres).revoke("users", &privileges, "reader").unwrap()[0].sql,
            "REVOKE SELECT, INSERT ON \"users\" FROM \"reader\""
        );
        assert!(matches!(
            compiler(Dialect::Sqlite).grant("users", &privileges, "reader"),
            Err(DataError::SqlCompilation { .. })
        ));
        assert!(compiler(Dialect::MySql)
            .grant("users", &["drop database".to_string()], "reader")
            .is_err());
        assert!(compiler(Dialect::MySql)
            .grant("users", &privileges, "x'; DROP USER root; --")
            .is_err());
    }
}
