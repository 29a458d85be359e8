//! Fluent construction of statement lists and filter expressions.
//!
//! ```
//! use gravel::query::{expr, Query};
//!
//! let stmts = Query::v(Vec::<String>::new())
//!     .has_label(["person"])
//!     .has(expr::gt("age", 30))
//!     .out(["works_at"])
//!     .count()
//!     .into_statements();
//! assert_eq!(stmts.len(), 5);
//! ```

use crate::model::Value;
use crate::query::ast::{Adjacency, Aggregation, HasExpression, Statement};

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// Statement list under construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    statements: Vec<Statement>,
}

impl Query {
    /// Query starting from vertices by id; an empty list scans all vertices.
    pub fn v<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().push(Statement::V(strings(ids)))
    }

    /// Query starting from every vertex.
    pub fn all_vertices() -> Self {
        Self::default().push(Statement::V(Vec::new()))
    }

    /// Query starting from edges by id; an empty list scans all edges.
    pub fn e<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().push(Statement::E(strings(ids)))
    }

    /// Query starting from the label index.
    pub fn by_label<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().push(Statement::LookupVertsIndex(strings(labels)))
    }

    /// Continues an existing statement list, for extension pipelines.
    pub fn extend(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    fn push(mut self, stmt: Statement) -> Self {
        self.statements.push(stmt);
        self
    }

    /// Appends an arbitrary statement.
    pub fn then(self, stmt: Statement) -> Self {
        self.push(stmt)
    }

    /// `In` over the given edge labels.
    pub fn in_<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::In(Adjacency::labels(labels)))
    }

    /// `Out` over the given edge labels.
    pub fn out<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Out(Adjacency::labels(labels)))
    }

    /// `Both` over the given edge labels.
    pub fn both<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Both(Adjacency::labels(labels)))
    }

    /// `InE` over the given edge labels.
    pub fn in_e<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::InE(Adjacency::labels(labels)))
    }

    /// `OutE` over the given edge labels.
    pub fn out_e<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::OutE(Adjacency::labels(labels)))
    }

    /// `BothE` over the given edge labels.
    pub fn both_e<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::BothE(Adjacency::labels(labels)))
    }

    /// `Out` that emits a null element when no neighbour exists.
    pub fn out_null<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Out(Adjacency::labels(labels).or_null()))
    }

    /// `In` that emits a null element when no neighbour exists.
    pub fn in_null<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::In(Adjacency::labels(labels).or_null()))
    }

    /// `OutE` that emits a null element when no edge exists.
    pub fn out_e_null<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::OutE(Adjacency::labels(labels).or_null()))
    }

    /// `InE` that emits a null element when no edge exists.
    pub fn in_e_null<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::InE(Adjacency::labels(labels).or_null()))
    }

    /// Filter by expression.
    pub fn has(self, expr: HasExpression) -> Self {
        self.push(Statement::Has(expr))
    }

    /// Filter by label.
    pub fn has_label<I, S>(self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::HasLabel(strings(labels)))
    }

    /// Filter by property presence.
    pub fn has_key<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::HasKey(strings(keys)))
    }

    /// Filter by id.
    pub fn has_id<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::HasId(strings(ids)))
    }

    /// Forward at most `n` travelers.
    pub fn limit(self, n: u64) -> Self {
        self.push(Statement::Limit(n))
    }

    /// Drop the first `n` travelers.
    pub fn skip(self, n: u64) -> Self {
        self.push(Statement::Skip(n))
    }

    /// Forward positions `start..stop`; negative `stop` is unbounded.
    pub fn range(self, start: u64, stop: i64) -> Self {
        self.push(Statement::Range { start, stop })
    }

    /// Count the stream.
    pub fn count(self) -> Self {
        self.push(Statement::Count)
    }

    /// Deduplicate on field values.
    pub fn distinct<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Distinct(strings(fields)))
    }

    /// Capture the current element.
    pub fn mark(self, name: impl Into<String>) -> Self {
        self.push(Statement::As(name.into()))
    }

    /// Move to a marked element.
    pub fn jump(
        self,
        mark: impl Into<String>,
        condition: Option<HasExpression>,
        emit: bool,
    ) -> Self {
        self.push(Statement::Jump {
            mark: mark.into(),
            condition,
            emit,
        })
    }

    /// Select marks.
    pub fn select<I, S>(self, marks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Select(strings(marks)))
    }

    /// Render a template.
    pub fn render(self, template: impl Into<Value>) -> Self {
        self.push(Statement::Render(template.into()))
    }

    /// Emit traversal paths.
    pub fn path(self) -> Self {
        self.push(Statement::Path)
    }

    /// Project properties.
    pub fn fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Statement::Fields(strings(fields)))
    }

    /// Aggregate the stream.
    pub fn aggregate(self, aggregations: Vec<Aggregation>) -> Self {
        self.push(Statement::Aggregate(aggregations))
    }

    /// Unwind a list-valued field.
    pub fn unwind(self, field: impl Into<String>) -> Self {
        self.push(Statement::Unwind(field.into()))
    }

    /// Write a property.
    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(Statement::Set {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Add to an integer property.
    pub fn increment(self, field: impl Into<String>, amount: i64) -> Self {
        self.push(Statement::Increment {
            field: field.into(),
            amount,
        })
    }

    /// Statements built so far.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Consumes the builder.
    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}

impl From<Query> for Vec<Statement> {
    fn from(query: Query) -> Self {
        query.statements
    }
}

/// Filter expression and aggregation constructors.
pub mod expr {
    use crate::model::Value;
    use crate::query::ast::{Aggregation, AggregationKind, Condition, HasExpression, Operator};

    fn leaf(key: impl Into<String>, condition: Operator, value: Value) -> HasExpression {
        HasExpression::Condition(Condition {
            key: key.into(),
            value,
            condition,
        })
    }

    /// `key == value`
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Eq, value.into())
    }

    /// `key != value`
    pub fn neq(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Neq, value.into())
    }

    /// `key > value`
    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Gt, value.into())
    }

    /// `key >= value`
    pub fn gte(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Gte, value.into())
    }

    /// `key < value`
    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Lt, value.into())
    }

    /// `key <= value`
    pub fn lte(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Lte, value.into())
    }

    /// `low < key < high`
    pub fn inside(
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> HasExpression {
        leaf(key, Operator::Inside, Value::List(vec![low.into(), high.into()]))
    }

    /// `key <= low || key >= high`
    pub fn outside(
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> HasExpression {
        leaf(key, Operator::Outside, Value::List(vec![low.into(), high.into()]))
    }

    /// `low <= key < high`
    pub fn between(
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> HasExpression {
        leaf(key, Operator::Between, Value::List(vec![low.into(), high.into()]))
    }

    /// `key` is one of `values`.
    pub fn within<I, V>(key: impl Into<String>, values: I) -> HasExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        leaf(key, Operator::Within, Value::List(values.into_iter().map(Into::into).collect()))
    }

    /// `key` is none of `values`.
    pub fn without<I, V>(key: impl Into<String>, values: I) -> HasExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        leaf(key, Operator::Without, Value::List(values.into_iter().map(Into::into).collect()))
    }

    /// List at `key` contains `value`.
    pub fn contains(key: impl Into<String>, value: impl Into<Value>) -> HasExpression {
        leaf(key, Operator::Contains, value.into())
    }

    /// Conjunction.
    pub fn and(exprs: Vec<HasExpression>) -> HasExpression {
        HasExpression::And(exprs)
    }

    /// Disjunction.
    pub fn or(exprs: Vec<HasExpression>) -> HasExpression {
        HasExpression::Or(exprs)
    }

    /// Negation.
    pub fn not(expr: HasExpression) -> HasExpression {
        HasExpression::Not(Box::new(expr))
    }

    /// Term aggregation keeping `size` buckets (0 keeps all).
    pub fn term(name: impl Into<String>, field: impl Into<String>, size: u32) -> Aggregation {
        Aggregation {
            name: name.into(),
            kind: AggregationKind::Term {
                field: field.into(),
                size,
            },
        }
    }

    /// Histogram aggregation.
    pub fn histogram(
        name: impl Into<String>,
        field: impl Into<String>,
        interval: f64,
    ) -> Aggregation {
        Aggregation {
            name: name.into(),
            kind: AggregationKind::Histogram {
                field: field.into(),
                interval,
            },
        }
    }

    /// Percentile aggregation.
    pub fn percentile(
        name: impl Into<String>,
        field: impl Into<String>,
        percents: Vec<f64>,
    ) -> Aggregation {
        Aggregation {
            name: name.into(),
            kind: AggregationKind::Percentile {
                field: field.into(),
                percents,
            },
        }
    }

    /// Count aggregation.
    pub fn count(name: impl Into<String>) -> Aggregation {
        Aggregation {
            name: name.into(),
            kind: AggregationKind::Count,
        }
    }
}
