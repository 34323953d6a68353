//! SQL 방언 처리
//!
//! 식별자 검증/인용과 placeholder 형식을 방언별로 제공합니다.

use crate::tool::error::DataError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

static ALIASED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(\S+)\s+as\s+(\S+)\s*$").expect("alias pattern is valid")
});

static AGGREGATE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(count|sum|avg|min|max)\s*\(\s*(\*|[A-Za-z_][A-Za-z0-9_.]*)\s*\)\s*$")
        .expect("aggregate pattern is valid")
});

/// 지원하는 SQL 방언
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "pgsql", alias = "postgresql")]
    Postgres,
    Sqlite,
}

impl Dialect {
    /// 연결 URL의 scheme으로 방언을 결정합니다.
    pub fn from_url(url: &str) -> Result<Self, DataError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| DataError::Configuration(format!("connection url has no scheme: {}", redact_url(url))))?;

        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(DataError::Configuration(format!(
                "unsupported database scheme: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn quote_char(&self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    /// 1부터 시작하는 bind 위치에 해당하는 placeholder
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${position}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// 단일 식별자를 검증하고 인용합니다.
    pub fn quote_name(&self, name: &str) -> Result<String, DataError> {
        if !IDENTIFIER.is_match(name) {
            return Err(DataError::QuerySpec(format!("invalid identifier: '{name}'")));
        }
        let q = self.quote_char();
        Ok(format!("{q}{name}{q}"))
    }

    /// `table.column`, `*`, `table.*`, `count(*)`, `expr as alias` 형태의 참조를 인용합니다.
    pub fn quote_identifier(&self, reference: &str) -> Result<String, DataError> {
        if let Some(caps) = ALIASED.captures(reference) {
            let target = self.column_expression(&caps[1])?;
            let alias = self.quote_name(&caps[2])?;
            return Ok(format!("{target} AS {alias}"));
        }
        self.column_expression(reference)
    }

    /// 조건, 정렬, 그룹화에 쓰이는 컬럼 식. 집계 함수 호출도 허용합니다.
    pub fn column_expression(&self, expression: &str) -> Result<String, DataError> {
        if let Some(caps) = AGGREGATE_CALL.captures(expression) {
            let function = caps[1].to_ascii_uppercase();
            let argument = match &caps[2] {
                "*" => "*".to_string(),
                column => self.quote_path(column)?,
            };
            return Ok(format!("{function}({argument})"));
        }
        self.quote_path(expression.trim())
    }

    fn quote_path(&self, path: &str) -> Result<String, DataError> {
        if path == "*" {
            return Ok("*".to_string());
        }

        let parts: Vec<&str> = path.split('.').collect();
        let last = parts.len() - 1;
        let mut quoted = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            if *part == "*" && index == last && index > 0 {
                quoted.push("*".to_string());
            } else {
                quoted.push(self.quote_name(part)?);
            }
        }
        Ok(quoted.join("."))
    }

    /// LIMIT / OFFSET 절
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            (None, Some(offset)) => match self {
                Dialect::MySql => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
                Dialect::Sqlite => format!(" LIMIT -1 OFFSET {offset}"),
                Dialect::Postgres => format!(" OFFSET {offset}"),
            },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `users as u` → (`users`, `u`), `users` → (`users`, `users`)
pub fn split_alias(table: &str) -> (&str, &str) {
    match ALIASED.captures(table) {
        Some(caps) => match (caps.get(1), caps.get(2)) {
            (Some(base), Some(alias)) => (base.as_str(), alias.as_str()),
            _ => (table.trim(), table.trim()),
        },
        None => (table.trim(), table.trim()),
    }
}

/// SQL 문자열 리터럴 (DDL 기본값 등 bind가 불가능한 곳에서 사용)
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// 비밀번호를 가린 URL (로그용)
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
