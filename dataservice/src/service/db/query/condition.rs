//! 조건 트리
//!
//! WHERE/HAVING/JOIN에 쓰이는 조건 노드와 그룹, 그리고 단축 조건 맵을 정의합니다.

use crate::tool::error::DataError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// 단축 조건 맵: `{"status": "active", "age >=": 18, "role": ["a", "b"]}`
pub type ConditionMap = serde_json::Map<String, Value>;

/// 앞 조건과의 결합 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connector {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl Connector {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

fn default_operator() -> String {
    "=".to_string()
}

/// 단일 비교 조건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub column: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub boolean: Connector,
}

/// 괄호로 묶이는 조건 그룹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub group: Vec<Condition>,
    #[serde(default)]
    pub boolean: Connector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Group(ConditionGroup),
    Node(ConditionNode),
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Node(ConditionNode {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
            boolean: Connector::And,
        })
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, "=", value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, "IS NULL", Value::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, "IS NOT NULL", Value::Null)
    }

    pub fn group(conditions: Vec<Condition>) -> Self {
        Condition::Group(ConditionGroup {
            group: conditions,
            boolean: Connector::And,
        })
    }

    /// 앞 조건과 OR로 결합
    pub fn or(mut self) -> Self {
        match &mut self {
            Condition::Group(group) => group.boolean = Connector::Or,
            Condition::Node(node) => node.boolean = Connector::Or,
        }
        self
    }

    pub fn boolean(&self) -> Connector {
        match self {
            Condition::Group(group) => group.boolean,
            Condition::Node(node) => node.boolean,
        }
    }
}

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

impl FromStr for Operator {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "<>" | "!=" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "BETWEEN" => Ok(Operator::Between),
            "IS NULL" => Ok(Operator::IsNull),
            "IS NOT NULL" => Ok(Operator::IsNotNull),
            _ => Err(DataError::QuerySpec(format!("unknown operator: '{s}'"))),
        }
    }
}

/// 조건 맵을 AND로 결합된 조건 목록으로 펼칩니다.
///
/// 키에 공백 뒤 연산자를 붙이면 그 연산자를 사용합니다 (`"age >="`).
/// 배열 값은 IN, null은 IS NULL이 됩니다.
pub fn collapse_condition_map(map: &ConditionMap) -> Result<Vec<Condition>, DataError> {
    map.iter()
        .map(|(key, value)| {
            let key = key.trim();
            let (column, operator) = match key.split_once(char::is_whitespace) {
                Some((column, operator)) => {
                    let operator = operator.trim();
                    Operator::from_str(operator)?;
                    (column.to_string(), operator.to_string())
                }
                None => {
                    let operator = match value {
                        Value::Array(_) => "IN",
                        Value::Null => "IS NULL",
                        _ => "=",
                    };
                    (key.to_string(), operator.to_string())
                }
            };
            Ok(Condition::new(column, operator, value.clone()))
        })
        .collect()
}
