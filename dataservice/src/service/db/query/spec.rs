//! 선언형 쿼리 명세
//!
//! 호출자가 JSON 또는 빌더로 작성하는 SELECT 명세입니다.

use super::condition::Condition;
use serde::{Deserialize, Serialize};

/// SELECT 목록의 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectItem {
    /// `"name"`, `"users.*"`, `"name as n"`
    Column(String),
    /// `{"count": "*", "as": "total"}`
    Count {
        count: String,
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
    /// `{"aggregate": "sum", "column": "amount", "as": "total"}`
    Aggregate {
        aggregate: AggregateFunction,
        column: String,
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
    /// 정책 검사를 거친 뒤 그대로 출력되는 식
    Raw { raw: String },
}

impl From<&str> for SelectItem {
    fn from(column: &str) -> Self {
        SelectItem::Column(column.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// JOIN ON 절. 값은 모두 컬럼 참조로 해석됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinOn {
    /// `["users.id", "orders.user_id"]`
    Pair(String, String),
    Conditions(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub table: String,
    #[serde(default, rename = "type")]
    pub join_type: JoinType,
    #[serde(default)]
    pub on: Option<JoinOn>,
    /// ON 절에 AND로 붙는 값 조건 (bind 값)
    #[serde(default, rename = "where")]
    pub filters: Vec<Condition>,
}

impl JoinSpec {
    pub fn new(join_type: JoinType, table: impl Into<String>, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join_type,
            on: Some(JoinOn::Pair(left.into(), right.into())),
            filters: Vec::new(),
        }
    }

    pub fn cross(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            join_type: JoinType::Cross,
            on: None,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filters.push(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Having {
    Raw(String),
    Conditions(Vec<Condition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderBy {
    /// `"name"`, `"created_at desc"`
    Column(String),
    Spec {
        column: String,
        #[serde(default)]
        direction: Direction,
    },
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy::Spec {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy::Spec {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// 두 번째 SELECT. 정렬과 LIMIT은 결합 결과 전체에 적용되므로 여기에는 둘 수 없습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionSpec {
    pub table: String,
    #[serde(default)]
    pub query: QuerySpec,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CteBody {
    Raw(String),
    Query { table: String, query: Box<QuerySpec> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTableExpr {
    pub name: String,
    pub body: CteBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FullTextMode {
    #[default]
    Boolean,
    NaturalLanguage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextSpec {
    pub columns: Vec<String>,
    pub term: String,
    #[serde(default)]
    pub mode: FullTextMode,
}

/// `FUNC(args) OVER (PARTITION BY .. ORDER BY ..) AS alias`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub partition_by: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    pub alias: String,
}

/// JSON 컬럼 내부 경로 추출. alias가 없으면 원래 컬럼 이름을 씁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPathSpec {
    pub column: String,
    pub path: String,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
}

/// SELECT 명세
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default)]
    pub select: Vec<SelectItem>,
    #[serde(default, rename = "where")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub having: Option<Having>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub union: Option<Box<UnionSpec>>,
    #[serde(default)]
    pub with: Vec<CommonTableExpr>,
    #[serde(default)]
    pub full_text: Option<FullTextSpec>,
    #[serde(default)]
    pub window: Vec<WindowSpec>,
    #[serde(default)]
    pub json: Vec<JsonPathSpec>,
    #[serde(default)]
    pub with_trashed: bool,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.select.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn select_item(mut self, item: SelectItem) -> Self {
        self.select.push(item);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn union(mut self, table: impl Into<String>, query: QuerySpec, all: bool) -> Self {
        self.union = Some(Box::new(UnionSpec {
            table: table.into(),
            query,
            all,
        }));
        self
    }

    pub fn with_cte(mut self, name: impl Into<String>, body: CteBody) -> Self {
        self.with.push(CommonTableExpr {
            name: name.into(),
            body,
        });
        self
    }

    pub fn full_text(mut self, spec: FullTextSpec) -> Self {
        self.full_text = Some(spec);
        self
    }

    pub fn window(mut self, spec: WindowSpec) -> Self {
        self.window.push(spec);
        self
    }

    pub fn json_path(mut self, spec: JsonPathSpec) -> Self {
        self.json.push(spec);
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_spec() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "select": ["users.name", {"count": "*", "as": "orders"}],
            "joins": [{"table": "orders", "type": "left", "on": ["users.id", "orders.user_id"]}],
            "where": [{"column": "users.active", "value": true}],
            "groupBy": ["users.name"],
            "having": "COUNT(*) > 1",
            "orderBy": ["orders desc", {"column": "users.name"}],
            "limit": 10
        }))
        .unwrap();

        assert_eq!(spec.select.len(), 2);
        assert!(matches!(spec.select[1], SelectItem::Count { .. }));
        assert_eq!(spec.joins[0].join_type, JoinType::Left);
        assert!(matches!(spec.joins[0].on, Some(JoinOn::Pair(_, _))));
        assert_eq!(spec.having, Some(Having::Raw("COUNT(*) > 1".into())));
        assert_eq!(spec.order_by[1], OrderBy::asc("users.name"));
        assert_eq!(spec.limit, Some(10));
    }

    #[test]
    fn test_deserialize_cte_bodies() {
        let spec: QuerySpec = serde_json::from_value(json!({
            "with": [
                {"name": "recent", "body": {"table": "orders", "query": {"limit": 5}}},
                {"name": "constant", "body": "SELECT 1 AS one"}
            ]
        }))
        .unwrap();

        assert!(matches!(spec.with[0].body, CteBody::Query { .. }));
        assert!(matches!(spec.with[1].body, CteBody::Raw(_)));
    }
}
