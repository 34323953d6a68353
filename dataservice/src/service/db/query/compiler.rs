//! 쿼리 컴파일러
//!
//! 명세를 텍스트 순서대로 조립하면서 bind 값을 같은 순서로 쌓습니다.
//! PostgreSQL placeholder 번호는 CTE, 본문, UNION 전체에 걸쳐 이어집니다.

use super::condition::{Condition, ConditionNode, Operator};
use super::dialect::{split_alias, Dialect};
use super::spec::{
    CteBody, FullTextMode, FullTextSpec, Having, JoinOn, JoinSpec, JoinType, JsonPathSpec, OrderBy, QuerySpec,
    SelectItem, UnionSpec, WindowSpec,
};
use super::RawSqlPolicy;
use crate::service::db::core::types::{Row, Statement};
use crate::tool::error::DataError;
use serde_json::Value;

/// 조건 값 해석 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueMode {
    /// 값은 bind 파라미터
    Bind,
    /// 값은 컬럼 참조 (JOIN ON)
    Column,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum JsonSegment {
    Key(String),
    Index(usize),
}

/// 테이블별 soft delete 컬럼 조회
///
/// 본문, JOIN, UNION, CTE가 참조하는 모든 테이블에 적용됩니다.
pub trait SoftDeleteScope {
    fn soft_delete_column(&self, table: &str) -> Option<String>;
}

impl<F> SoftDeleteScope for F
where
    F: Fn(&str) -> Option<String>,
{
    fn soft_delete_column(&self, table: &str) -> Option<String> {
        self(table)
    }
}

fn unscoped(_: &str) -> Option<String> {
    None
}

/// 방언별 SQL 컴파일러
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler {
    dialect: Dialect,
    raw_policy: RawSqlPolicy,
}

impl QueryCompiler {
    pub fn new(dialect: Dialect, raw_policy: RawSqlPolicy) -> Self {
        Self { dialect, raw_policy }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// SELECT 컴파일
    pub fn compile(&self, table: &str, spec: &QuerySpec) -> Result<Statement, DataError> {
        self.compile_scoped(table, spec, &unscoped)
    }

    /// soft delete 범위 조건을 포함한 SELECT 컴파일
    ///
    /// `with_trashed`가 아니면 soft delete 테이블마다 `<column> IS NULL`이 붙습니다.
    /// 본문 테이블은 WHERE에, JOIN 테이블은 ON 절에 들어갑니다.
    /// `with_trashed`는 하위 UNION과 CTE에도 적용됩니다.
    pub fn compile_scoped(
        &self,
        table: &str,
        spec: &QuerySpec,
        scope: &dyn SoftDeleteScope,
    ) -> Result<Statement, DataError> {
        let mut params = Vec::new();
        let sql = self.select_sql(table, spec, scope, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    /// `SELECT COUNT(*) AS aggregate ...`
    pub fn compile_count(
        &self,
        table: &str,
        conditions: &[Condition],
        scope: &dyn SoftDeleteScope,
    ) -> Result<Statement, DataError> {
        let spec = QuerySpec {
            select: vec![SelectItem::Count {
                count: "*".to_string(),
                alias: Some("aggregate".to_string()),
            }],
            conditions: conditions.to_vec(),
            ..QuerySpec::default()
        };
        self.compile_scoped(table, &spec, scope)
    }

    /// 다중 행 INSERT. 모든 행은 같은 컬럼 집합을 가져야 합니다.
    pub fn compile_insert(&self, table: &str, rows: &[Row]) -> Result<Statement, DataError> {
        let (first, rest) = rows
            .split_first()
            .ok_or_else(|| DataError::QuerySpec("insert requires at least one row".to_string()))?;
        let columns: Vec<&String> = first.keys().collect();
        for (index, row) in rest.iter().enumerate() {
            if row.len() != columns.len() || !columns.iter().all(|column| row.contains_key(column.as_str())) {
                return Err(DataError::QuerySpec(format!(
                    "row {} has different columns than row 0",
                    index + 1
                )));
            }
        }

        let table_sql = self.dialect.quote_identifier(table)?;
        if columns.is_empty() {
            if rows.len() > 1 {
                return Err(DataError::QuerySpec(
                    "multi-row insert requires at least one column".to_string(),
                ));
            }
            let sql = match self.dialect {
                Dialect::MySql => format!("INSERT INTO {table_sql} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table_sql} DEFAULT VALUES"),
            };
            return Ok(Statement::raw(sql));
        }

        let mut column_sql = Vec::with_capacity(columns.len());
        for column in &columns {
            column_sql.push(self.dialect.quote_name(column)?);
        }

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut placeholders = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.get(column.as_str()).cloned().unwrap_or(Value::Null);
                placeholders.push(self.bind(&mut params, value));
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        Ok(Statement::new(
            format!(
                "INSERT INTO {table_sql} ({}) VALUES {}",
                column_sql.join(", "),
                tuples.join(", ")
            ),
            params,
        ))
    }

    /// INSERT ... ON DUPLICATE KEY UPDATE / ON CONFLICT DO UPDATE
    ///
    /// `update_columns`가 없으면 고유 키를 제외한 모든 컬럼을 갱신합니다.
    pub fn compile_upsert(
        &self,
        table: &str,
        rows: &[Row],
        unique_by: &[String],
        update_columns: Option<&[String]>,
    ) -> Result<Statement, DataError> {
        if unique_by.is_empty() {
            return Err(DataError::QuerySpec("upsert requires at least one unique column".to_string()));
        }
        let mut statement = self.compile_insert(table, rows)?;
        let columns: Vec<String> = rows.first().map(|row| row.keys().cloned().collect()).unwrap_or_default();

        for unique in unique_by {
            if !columns.contains(unique) {
                return Err(DataError::QuerySpec(format!(
                    "unique column '{unique}' is missing from upsert rows"
                )));
            }
        }

        let update_columns: Vec<String> = match update_columns {
            Some(selected) => selected.to_vec(),
            None => columns.into_iter().filter(|c| !unique_by.contains(c)).collect(),
        };

        match self.dialect {
            Dialect::MySql => {
                let assignments = if update_columns.is_empty() {
                    let key = self.dialect.quote_name(&unique_by[0])?;
                    format!("{key} = {key}")
                } else {
                    let mut parts = Vec::with_capacity(update_columns.len());
                    for column in &update_columns {
                        let quoted = self.dialect.quote_name(column)?;
                        parts.push(format!("{quoted} = VALUES({quoted})"));
                    }
                    parts.join(", ")
                };
                statement.sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {assignments}"));
            }
            Dialect::Postgres | Dialect::Sqlite => {
                let mut target = Vec::with_capacity(unique_by.len());
                for column in unique_by {
                    target.push(self.dialect.quote_name(column)?);
                }
                if update_columns.is_empty() {
                    statement
                        .sql
                        .push_str(&format!(" ON CONFLICT ({}) DO NOTHING", target.join(", ")));
                } else {
                    let mut parts = Vec::with_capacity(update_columns.len());
                    for column in &update_columns {
                        let quoted = self.dialect.quote_name(column)?;
                        parts.push(format!("{quoted} = excluded.{quoted}"));
                    }
                    statement.sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        target.join(", "),
                        parts.join(", ")
                    ));
                }
            }
        }

        Ok(statement)
    }

    pub fn compile_update(&self, table: &str, values: &Row, conditions: &[Condition]) -> Result<Statement, DataError> {
        if values.is_empty() {
            return Err(DataError::QuerySpec("update requires at least one column".to_string()));
        }

        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in values {
            let quoted = self.dialect.quote_name(column)?;
            let placeholder = self.bind(&mut params, value.clone());
            assignments.push(format!("{quoted} = {placeholder}"));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_identifier(table)?,
            assignments.join(", ")
        );
        self.push_where(&mut sql, conditions, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    pub fn compile_delete(&self, table: &str, conditions: &[Condition]) -> Result<Statement, DataError> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.dialect.quote_identifier(table)?);
        self.push_where(&mut sql, conditions, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    /// 아직 삭제되지 않은 행에 삭제 시각을 기록합니다.
    pub fn compile_soft_delete(
        &self,
        table: &str,
        column: &str,
        conditions: &[Condition],
    ) -> Result<Statement, DataError> {
        let quoted = self.dialect.quote_name(column)?;
        let mut params = Vec::new();
        let mut sql = format!(
            "UPDATE {} SET {quoted} = CURRENT_TIMESTAMP",
            self.dialect.quote_identifier(table)?
        );
        let scoped = scope_conditions(conditions, Condition::is_null(column));
        self.push_where(&mut sql, &scoped, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    /// soft delete된 행의 삭제 시각을 지웁니다.
    pub fn compile_restore(&self, table: &str, column: &str, conditions: &[Condition]) -> Result<Statement, DataError> {
        let quoted = self.dialect.quote_name(column)?;
        let mut params = Vec::new();
        let mut sql = format!(
            "UPDATE {} SET {quoted} = NULL",
            self.dialect.quote_identifier(table)?
        );
        let scoped = scope_conditions(conditions, Condition::is_not_null(column));
        self.push_where(&mut sql, &scoped, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    fn bind(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.dialect.placeholder(params.len())
    }

    fn push_where(&self, sql: &mut String, conditions: &[Condition], params: &mut Vec<Value>) -> Result<(), DataError> {
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions(conditions, ValueMode::Bind, params)?);
        }
        Ok(())
    }

    fn select_sql(
        &self,
        table: &str,
        spec: &QuerySpec,
        scope: &dyn SoftDeleteScope,
        params: &mut Vec<Value>,
    ) -> Result<String, DataError> {
        let scope: &dyn SoftDeleteScope = if spec.with_trashed { &unscoped } else { scope };
        let mut sql = String::new();

        if !spec.with.is_empty() {
            let mut expressions = Vec::with_capacity(spec.with.len());
            for cte in &spec.with {
                let name = self.dialect.quote_name(&cte.name)?;
                let body = match &cte.body {
                    CteBody::Raw(raw) => self.raw_policy.check(raw, "CTE body")?.to_string(),
                    CteBody::Query { table, query } => self.select_sql(table, query, scope, params)?,
                };
                expressions.push(format!("{name} AS ({body})"));
            }
            sql.push_str("WITH ");
            sql.push_str(&expressions.join(", "));
            sql.push(' ');
        }

        sql.push_str(&self.select_body(table, spec, scope, params)?);

        if let Some(union) = &spec.union {
            sql.push_str(&self.union_member(union, scope, params)?);
        }

        if !spec.order_by.is_empty() {
            let mut terms = Vec::with_capacity(spec.order_by.len());
            for order in &spec.order_by {
                terms.push(self.order_term(order)?);
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        sql.push_str(&self.dialect.limit_clause(spec.limit, spec.offset));
        Ok(sql)
    }

    fn union_member(
        &self,
        union: &UnionSpec,
        scope: &dyn SoftDeleteScope,
        params: &mut Vec<Value>,
    ) -> Result<String, DataError> {
        let secondary = &union.query;
        let scope: &dyn SoftDeleteScope = if secondary.with_trashed { &unscoped } else { scope };
        if !secondary.order_by.is_empty() || secondary.limit.is_some() || secondary.offset.is_some() {
            return Err(DataError::QuerySpec(
                "ORDER BY and LIMIT belong to the primary query of a UNION".to_string(),
            ));
        }
        if !secondary.with.is_empty() {
            return Err(DataError::QuerySpec("a UNION member cannot declare a CTE".to_string()));
        }

        let mut sql = String::from(if union.all { " UNION ALL " } else { " UNION " });
        sql.push_str(&self.select_body(&union.table, secondary, scope, params)?);
        if let Some(next) = &secondary.union {
            sql.push_str(&self.union_member(next, scope, params)?);
        }
        Ok(sql)
    }

    fn select_body(
        &self,
        table: &str,
        spec: &QuerySpec,
        scope: &dyn SoftDeleteScope,
        params: &mut Vec<Value>,
    ) -> Result<String, DataError> {
        let mut sql = String::from("SELECT ");
        if spec.distinct {
            sql.push_str("DISTINCT ");
        }

        let mut columns = Vec::new();
        for item in &spec.select {
            columns.push(self.select_item(item)?);
        }
        if columns.is_empty() {
            columns.push("*".to_string());
        }
        for window in &spec.window {
            columns.push(self.window_expression(window)?);
        }
        for json in &spec.json {
            columns.push(self.json_expression(json)?);
        }
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.dialect.quote_identifier(table)?);

        let mut join_scopes = Vec::new();
        for join in &spec.joins {
            let scope_predicate = match scope.soft_delete_column(split_alias(&join.table).0) {
                Some(column) => Some(self.qualified_null_check(&join.table, &column)?),
                None => None,
            };
            let (clause, cross_scope) = self.join_clause(join, scope_predicate, params)?;
            sql.push(' ');
            sql.push_str(&clause);
            join_scopes.extend(cross_scope);
        }

        let mut predicates = Vec::new();
        if !spec.conditions.is_empty() {
            predicates.push(self.conditions(&spec.conditions, ValueMode::Bind, params)?);
        }
        if let Some(full_text) = &spec.full_text {
            predicates.push(self.full_text(full_text, params)?);
        }
        if let Some(column) = scope.soft_delete_column(split_alias(table).0) {
            if spec.joins.is_empty() {
                predicates.push(format!("{} IS NULL", self.dialect.quote_name(&column)?));
            } else {
                predicates.push(self.qualified_null_check(table, &column)?);
            }
        }
        predicates.extend(join_scopes);
        if !predicates.is_empty() {
            if predicates.len() > 1 && spec.conditions.len() > 1 {
                predicates[0] = format!("({})", predicates[0]);
            }
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if !spec.group_by.is_empty() {
            let mut columns = Vec::with_capacity(spec.group_by.len());
            for column in &spec.group_by {
                columns.push(self.dialect.column_expression(column)?);
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&columns.join(", "));
        }

        match &spec.having {
            Some(Having::Raw(raw)) => {
                sql.push_str(" HAVING ");
                sql.push_str(self.raw_policy.check(raw, "HAVING clause")?);
            }
            Some(Having::Conditions(conditions)) if !conditions.is_empty() => {
                sql.push_str(" HAVING ");
                sql.push_str(&self.conditions(conditions, ValueMode::Bind, params)?);
            }
            _ => {}
        }

        Ok(sql)
    }

    fn select_item(&self, item: &SelectItem) -> Result<String, DataError> {
        match item {
            SelectItem::Column(column) => self.dialect.quote_identifier(column),
            SelectItem::Count { count, alias } => {
                let argument = if count.trim() == "*" {
                    "*".to_string()
                } else {
                    self.dialect.column_expression(count)?
                };
                self.with_alias(format!("COUNT({argument})"), alias.as_deref())
            }
            SelectItem::Aggregate { aggregate, column, alias } => {
                let argument = self.dialect.column_expression(column)?;
                self.with_alias(format!("{}({argument})", aggregate.as_sql()), alias.as_deref())
            }
            SelectItem::Raw { raw } => Ok(self.raw_policy.check(raw, "raw select expression")?.to_string()),
        }
    }

    fn with_alias(&self, expression: String, alias: Option<&str>) -> Result<String, DataError> {
        match alias {
            Some(alias) => Ok(format!("{expression} AS {}", self.dialect.quote_name(alias)?)),
            None => Ok(expression),
        }
    }

    fn order_term(&self, order: &OrderBy) -> Result<String, DataError> {
        let (column, direction) = match order {
            OrderBy::Spec { column, direction } => (column.as_str(), direction.as_sql()),
            OrderBy::Column(text) => {
                let parts: Vec<&str> = text.split_whitespace().collect();
                match parts.as_slice() {
                    [column] => (*column, "ASC"),
                    [column, direction] => match direction.to_ascii_lowercase().as_str() {
                        "asc" => (*column, "ASC"),
                        "desc" => (*column, "DESC"),
                        _ => {
                            return Err(DataError::QuerySpec(format!(
                                "invalid sort direction in '{text}'"
                            )))
                        }
                    },
                    _ => return Err(DataError::QuerySpec(format!("invalid ORDER BY term: '{text}'"))),
                }
            }
        };
        Ok(format!("{} {direction}", self.dialect.column_expression(column)?))
    }

    /// `<reference>.<column> IS NULL`
    fn qualified_null_check(&self, table: &str, column: &str) -> Result<String, DataError> {
        let (_, reference) = split_alias(table);
        Ok(format!(
            "{} IS NULL",
            self.dialect.quote_identifier(&format!("{reference}.{column}"))?
        ))
    }

    /// JOIN 절과, ON 절이 없는 CROSS JOIN의 경우 WHERE로 옮길 soft delete 조건
    fn join_clause(
        &self,
        join: &JoinSpec,
        scope_predicate: Option<String>,
        params: &mut Vec<Value>,
    ) -> Result<(String, Option<String>), DataError> {
        let keyword = join.join_type.as_sql();
        let table = self.dialect.quote_identifier(&join.table)?;

        if join.join_type == JoinType::Cross {
            if join.on.is_some() || !join.filters.is_empty() {
                return Err(DataError::QuerySpec(format!(
                    "CROSS JOIN on '{}' cannot have ON conditions",
                    join.table
                )));
            }
            return Ok((format!("{keyword} {table}"), scope_predicate));
        }

        let mut parts = Vec::new();
        let on_count = match &join.on {
            Some(JoinOn::Pair(left, right)) => {
                parts.push(format!(
                    "{} = {}",
                    self.dialect.column_expression(left)?,
                    self.dialect.column_expression(right)?
                ));
                1
            }
            Some(JoinOn::Conditions(conditions)) if !conditions.is_empty() => {
                parts.push(self.conditions(conditions, ValueMode::Column, params)?);
                conditions.len()
            }
            _ => 0,
        };

        if !join.filters.is_empty() {
            let filters = self.conditions(&join.filters, ValueMode::Bind, params)?;
            if join.filters.len() > 1 {
                parts.push(format!("({filters})"));
            } else {
                parts.push(filters);
            }
        }

        if parts.is_empty() {
            return Err(DataError::QuerySpec(format!(
                "{keyword} on '{}' requires an ON condition",
                join.table
            )));
        }
        if parts.len() > 1 && on_count > 1 {
            parts[0] = format!("({})", parts[0]);
        }
        parts.extend(scope_predicate);

        Ok((format!("{keyword} {table} ON {}", parts.join(" AND ")), None))
    }

    fn conditions(&self, conditions: &[Condition], mode: ValueMode, params: &mut Vec<Value>) -> Result<String, DataError> {
        let mut sql = String::new();
        for (index, condition) in conditions.iter().enumerate() {
            let fragment = match condition {
                Condition::Node(node) => self.node(node, mode, params)?,
                Condition::Group(group) => {
                    if group.group.is_empty() {
                        return Err(DataError::QuerySpec("condition group is empty".to_string()));
                    }
                    format!("({})", self.conditions(&group.group, mode, params)?)
                }
            };
            if index > 0 {
                sql.push(' ');
                sql.push_str(condition.boolean().as_sql());
                sql.push(' ');
            }
            sql.push_str(&fragment);
        }
        Ok(sql)
    }

    fn node(&self, node: &ConditionNode, mode: ValueMode, params: &mut Vec<Value>) -> Result<String, DataError> {
        let operator: Operator = node.operator.parse()?;
        let column = self.dialect.column_expression(&node.column)?;

        match operator {
            Operator::IsNull | Operator::IsNotNull => Ok(format!("{column} {}", operator.as_sql())),
            Operator::In | Operator::NotIn => {
                let Value::Array(items) = &node.value else {
                    return Err(DataError::QuerySpec(format!(
                        "{} on '{}' requires an array value",
                        operator.as_sql(),
                        node.column
                    )));
                };
                if items.is_empty() {
                    let always = if operator == Operator::In { "1 = 0" } else { "1 = 1" };
                    return Ok(always.to_string());
                }
                let mut placeholders = Vec::with_capacity(items.len());
                for item in items {
                    placeholders.push(self.operand(item, mode, &node.column, params)?);
                }
                Ok(format!("{column} {} ({})", operator.as_sql(), placeholders.join(", ")))
            }
            Operator::Between => {
                let items = match &node.value {
                    Value::Array(items) if items.len() == 2 => items,
                    Value::Array(items) => {
                        return Err(DataError::QuerySpec(format!(
                            "BETWEEN on '{}' requires exactly 2 values, got {}",
                            node.column,
                            items.len()
                        )))
                    }
                    _ => {
                        return Err(DataError::QuerySpec(format!(
                            "BETWEEN on '{}' requires an array of 2 values",
                            node.column
                        )))
                    }
                };
                let low = self.operand(&items[0], mode, &node.column, params)?;
                let high = self.operand(&items[1], mode, &node.column, params)?;
                Ok(format!("{column} BETWEEN {low} AND {high}"))
            }
            Operator::Eq if node.value.is_null() && mode == ValueMode::Bind => Ok(format!("{column} IS NULL")),
            Operator::Ne if node.value.is_null() && mode == ValueMode::Bind => Ok(format!("{column} IS NOT NULL")),
            _ => {
                let operand = self.operand(&node.value, mode, &node.column, params)?;
                Ok(format!("{column} {} {operand}", operator.as_sql()))
            }
        }
    }

    fn operand(&self, value: &Value, mode: ValueMode, column: &str, params: &mut Vec<Value>) -> Result<String, DataError> {
        match mode {
            ValueMode::Column => match value {
                Value::String(reference) => self.dialect.column_expression(reference),
                _ => Err(DataError::QuerySpec(format!(
                    "join condition on '{column}' must reference a column"
                ))),
            },
            ValueMode::Bind => match value {
                Value::Array(_) | Value::Object(_) => Err(DataError::QuerySpec(format!(
                    "condition on '{column}' expects a scalar value"
                ))),
                Value::Null => Err(DataError::QuerySpec(format!(
                    "condition on '{column}' compares with null; use IS NULL"
                ))),
                scalar => Ok(self.bind(params, scalar.clone())),
            },
        }
    }

    fn full_text(&self, spec: &FullTextSpec, params: &mut Vec<Value>) -> Result<String, DataError> {
        if spec.columns.is_empty() {
            return Err(DataError::QuerySpec("full-text search requires at least one column".to_string()));
        }
        if self.dialect == Dialect::Sqlite {
            return Err(DataError::unsupported(self.dialect, "full-text search"));
        }

        let mut columns = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            columns.push(self.dialect.column_expression(column)?);
        }
        let placeholder = self.bind(params, Value::String(spec.term.clone()));

        match self.dialect {
            Dialect::MySql => {
                let mode = match spec.mode {
                    FullTextMode::Boolean => "IN BOOLEAN MODE",
                    FullTextMode::NaturalLanguage => "IN NATURAL LANGUAGE MODE",
                };
                Ok(format!("MATCH({}) AGAINST({placeholder} {mode})", columns.join(", ")))
            }
            _ => {
                let document = if columns.len() == 1 {
                    columns.remove(0)
                } else {
                    format!("concat_ws(' ', {})", columns.join(", "))
                };
                // 검색어는 연산자 문법 없이 단어 목록으로 해석
                Ok(format!("to_tsvector({document}) @@ plainto_tsquery({placeholder})"))
            }
        }
    }

    fn window_expression(&self, window: &WindowSpec) -> Result<String, DataError> {
        self.dialect.quote_name(&window.function)?;
        let function = window.function.to_ascii_uppercase();

        let mut args = Vec::with_capacity(window.args.len());
        for arg in &window.args {
            if arg.trim() == "*" {
                args.push("*".to_string());
            } else {
                args.push(self.dialect.column_expression(arg)?);
            }
        }

        let mut over = Vec::new();
        if !window.partition_by.is_empty() {
            let mut columns = Vec::with_capacity(window.partition_by.len());
            for column in &window.partition_by {
                columns.push(self.dialect.column_expression(column)?);
            }
            over.push(format!("PARTITION BY {}", columns.join(", ")));
        }
        if !window.order_by.is_empty() {
            let mut terms = Vec::with_capacity(window.order_by.len());
            for order in &window.order_by {
                terms.push(self.order_term(order)?);
            }
            over.push(format!("ORDER BY {}", terms.join(", ")));
        }

        Ok(format!(
            "{function}({}) OVER ({}) AS {}",
            args.join(", "),
            over.join(" "),
            self.dialect.quote_name(&window.alias)?
        ))
    }

    fn json_expression(&self, json: &JsonPathSpec) -> Result<String, DataError> {
        let column = self.dialect.column_expression(&json.column)?;
        let segments = parse_json_path(&json.path)?;
        let alias = match &json.alias {
            Some(alias) => alias.clone(),
            None => json.column.rsplit('.').next().unwrap_or(&json.column).to_string(),
        };
        let alias = self.dialect.quote_name(&alias)?;

        let expression = match self.dialect {
            Dialect::MySql => format!("JSON_UNQUOTE(JSON_EXTRACT({column}, '{}'))", dollar_path(&segments)),
            Dialect::Sqlite => format!("json_extract({column}, '{}')", dollar_path(&segments)),
            Dialect::Postgres => {
                let elements: Vec<String> = segments
                    .iter()
                    .map(|segment| match segment {
                        JsonSegment::Key(key) => key.clone(),
                        JsonSegment::Index(index) => index.to_string(),
                    })
                    .collect();
                format!("{column} #>> '{{{}}}'", elements.join(","))
            }
        };
        Ok(format!("{expression} AS {alias}"))
    }
}

/// 기존 조건 뒤에 범위 조건을 AND로 붙입니다. 여러 조건이면 괄호로 묶습니다.
fn scope_conditions(conditions: &[Condition], scope: Condition) -> Vec<Condition> {
    match conditions {
        [] => vec![scope],
        [Condition::Node(node)] => vec![Condition::Node(node.clone()), scope],
        _ => vec![Condition::group(conditions.to_vec()), scope],
    }
}

fn parse_json_path(path: &str) -> Result<Vec<JsonSegment>, DataError> {
    let invalid = || DataError::QuerySpec(format!("invalid JSON path: '{path}'"));
    let trimmed = path.trim();
    let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let body = body.strip_prefix('.').unwrap_or(body);
    if body.is_empty() {
        return Err(invalid());
    }

    let mut segments = Vec::new();
    for part in body.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(position) => (&part[..position], &part[position..]),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return Err(invalid());
        }
        if !key.is_empty() {
            if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid());
            }
            segments.push(JsonSegment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(invalid());
            }
            let close = rest.find(']').ok_or_else(invalid)?;
            let index = rest[1..close].parse::<usize>().map_err(|_| invalid())?;
            segments.push(JsonSegment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

fn dollar_path(segments: &[JsonSegment]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        match segment {
            JsonSegment::Key(key) => {
                path.push('.');
                path.push_str(key);
            }
            JsonSegment::Index(index) => path.push_str(&format!("[{index}]")),
        }
    }
    path
}
