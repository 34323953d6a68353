//! 쿼리 컴파일 모듈
//!
//! 선언형 쿼리 명세를 방언별 SQL과 bind 값 목록으로 변환합니다.

pub mod compiler;
pub mod condition;
pub mod dialect;
pub mod spec;

use crate::tool::error::DataError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use compiler::{QueryCompiler, SoftDeleteScope};
pub use condition::{collapse_condition_map, Condition, ConditionGroup, ConditionMap, ConditionNode, Connector, Operator};
pub use dialect::Dialect;
pub use spec::{
    AggregateFunction, CommonTableExpr, CteBody, Direction, FullTextMode, FullTextSpec, Having, JoinOn, JoinSpec,
    JoinType, JsonPathSpec, OrderBy, QuerySpec, SelectItem, UnionSpec, WindowSpec,
};

/// raw SQL 조각(having, select raw, CTE, view 본문) 허용 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawSqlPolicy {
    /// 그대로 출력
    Trusted,
    /// 문장 구분자와 주석을 거부
    #[default]
    Guarded,
}

impl RawSqlPolicy {
    pub fn check<'a>(&self, fragment: &'a str, context: &str) -> Result<&'a str, DataError> {
        let trimmed = fragment.trim();
        if trimmed.is_empty() {
            return Err(DataError::QuerySpec(format!("{context} is empty")));
        }
        if *self == RawSqlPolicy::Guarded
            && (trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*"))
        {
            return Err(DataError::QuerySpec(format!(
                "{context} contains a statement separator or comment"
            )));
        }
        Ok(trimmed)
    }
}

impl FromStr for RawSqlPolicy {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trusted" => Ok(RawSqlPolicy::Trusted),
            "guarded" => Ok(RawSqlPolicy::Guarded),
            other => Err(DataError::Configuration(format!("unknown raw SQL policy: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_policy_rejects_separators() {
        let policy = RawSqlPolicy::Guarded;
        assert!(policy.check("COUNT(*) > 1", "having").is_ok());
        assert!(policy.check("1; DROP TABLE users", "having").is_err());
        assert!(policy.check("1 -- comment", "having").is_err());
        assert!(policy.check("1 /* x */", "having").is_err());
        assert!(policy.check("  ", "having").is_err());
    }

    #[test]
    fn test_trusted_policy_passes_through() {
        assert_eq!(RawSqlPolicy::Trusted.check(" a; b ", "raw").unwrap(), "a; b");
        assert_eq!("TRUSTED".parse::<RawSqlPolicy>().unwrap(), RawSqlPolicy::Trusted);
    }
}
