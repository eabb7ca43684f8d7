//! Declarative SQL construction.
//!
//! A [`QueryBuilder`] assembles a [`QueryGraph`]: one clause kind, a target
//! table, joins, conditions and projections. Identifiers are validated the
//! moment they are added, and the first failure is held until
//! [`QueryBuilder::build`] reports it. Values never enter the SQL text;
//! they are collected as bound parameters in placeholder order.
//!
//! ```
//! use shortlink_metadata::query::{Dialect, Operator, QueryBuilder};
//!
//! let query = QueryBuilder::select()
//!     .table("link_routes")
//!     .column("gid")
//!     .filter("full_short_url", Operator::Eq, "s.ly/abc123")
//!     .build(Dialect::Postgres)
//!     .unwrap();
//! assert_eq!(
//!     query.sql,
//!     "SELECT gid FROM link_routes WHERE full_short_url = $1"
//! );
//! ```

pub mod keywords;
mod render;
mod value;

pub use render::{Dialect, RenderedQuery};
pub use value::{SqlType, SqlValue};

use crate::error::{QueryError, QueryResult};
use std::collections::HashSet;
use std::fmt;

/// Statement family a graph renders to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Select,
    Aggregate,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Aggregate => "aggregate",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A column, optionally qualified by a table name or alias.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub qualifier: Option<String>,
    pub column: String,
}

impl FieldRef {
    /// Parse `column` or `qualifier.column`.
    fn parse(input: &str, context: &'static str) -> QueryResult<Self> {
        let (qualifier, column) = match input.split_once('.') {
            Some((qualifier, column)) => (Some(qualifier), column),
            None => (None, input),
        };
        if let Some(qualifier) = qualifier {
            check_identifier(qualifier, context)?;
        }
        check_identifier(column, context)?;
        Ok(Self {
            qualifier: qualifier.map(str::to_string),
            column: column.to_string(),
        })
    }
}

/// Reject anything that is not a plain, non-reserved identifier.
fn check_identifier(token: &str, context: &'static str) -> QueryResult<()> {
    if !keywords::is_identifier(token) {
        return Err(QueryError::InvalidIdentifier {
            token: token.to_string(),
            context,
        });
    }
    if keywords::is_reserved(token) {
        return Err(QueryError::KeywordCollision {
            token: token.to_string(),
            context,
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub table: String,
    pub alias: Option<String>,
}

impl Target {
    /// The name other clauses use to qualify this table's columns.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Projection {
    Field(FieldRef),
    /// Every column of one table, `alias.*`.
    AllOf(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    Full,
}

/// Comparison used in a join's ON clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinFilter {
    Equal,
    NotEqual,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub left: FieldRef,
    pub filter: JoinFilter,
    pub right: FieldRef,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Exists,
    NotExists,
}

impl Operator {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq | Self::Like
        )
    }
}

/// How a condition joins the rest of the WHERE clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Connective {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    None,
    Value(SqlValue),
    List(Vec<SqlValue>),
    Field(FieldRef),
    Subquery(Box<QueryGraph>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Condition {
    pub connective: Connective,
    /// Absent only for `EXISTS`/`NOT EXISTS`.
    pub field: Option<FieldRef>,
    pub operator: Operator,
    pub operand: Operand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Aggregate {
    pub func: AggregateFn,
    /// `None` aggregates over `*`.
    pub field: Option<FieldRef>,
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A validated description of one statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryGraph {
    clause: ClauseKind,
    target: Option<Target>,
    projection: Vec<Projection>,
    aggregate: Option<Aggregate>,
    assignments: Vec<(String, SqlValue)>,
    joins: Vec<JoinClause>,
    conditions: Vec<Condition>,
    order_by: Vec<(FieldRef, SortOrder)>,
    limit: Option<u64>,
}

impl QueryGraph {
    fn new(clause: ClauseKind) -> Self {
        Self {
            clause,
            target: None,
            projection: Vec::new(),
            aggregate: None,
            assignments: Vec::new(),
            joins: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn clause(&self) -> ClauseKind {
        self.clause
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    /// Structural checks that need the whole graph. `outer` holds the table
    /// references visible from an enclosing query.
    fn validate(&self, outer: &HashSet<String>) -> QueryResult<()> {
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| QueryError::Build(format!("{} query has no target table", self.clause)))?;

        match self.clause {
            ClauseKind::Insert | ClauseKind::Update if self.assignments.is_empty() => {
                return Err(QueryError::Build(format!(
                    "{} query assigns no columns",
                    self.clause
                )));
            }
            ClauseKind::Aggregate if self.aggregate.is_none() => {
                return Err(QueryError::Build("aggregate query has no aggregate".to_string()));
            }
            _ => {}
        }

        let mut local: HashSet<String> = HashSet::new();
        local.insert(target.reference().to_string());

        let resolves = |local: &HashSet<String>, field: &FieldRef| {
            field
                .qualifier
                .as_ref()
                .is_none_or(|q| local.contains(q) || outer.contains(q))
        };
        let undeclared = |field: &FieldRef, place: &str| {
            QueryError::Build(format!(
                "undeclared alias {} in {place}",
                field.qualifier.as_deref().unwrap_or_default()
            ))
        };

        for join in &self.joins {
            if !resolves(&local, &join.left) {
                return Err(undeclared(&join.left, "join condition"));
            }
            if !local.insert(join.alias.clone()) {
                return Err(QueryError::Build(format!(
                    "alias {} declared more than once",
                    join.alias
                )));
            }
            if !resolves(&local, &join.right) {
                return Err(undeclared(&join.right, "join condition"));
            }
        }

        for item in &self.projection {
            match item {
                Projection::Field(field) if !resolves(&local, field) => {
                    return Err(undeclared(field, "projection"));
                }
                Projection::AllOf(reference)
                    if !local.contains(reference) && !outer.contains(reference) =>
                {
                    return Err(QueryError::Build(format!(
                        "undeclared alias {reference} in projection"
                    )));
                }
                _ => {}
            }
        }

        if let Some(field) = self.aggregate.as_ref().and_then(|a| a.field.as_ref())
            && !resolves(&local, field)
        {
            return Err(undeclared(field, "aggregate"));
        }

        for (field, _) in &self.order_by {
            if !resolves(&local, field) {
                return Err(undeclared(field, "order by"));
            }
        }

        let visible: HashSet<String> = local.union(outer).cloned().collect();
        for condition in &self.conditions {
            if let Some(field) = &condition.field
                && !resolves(&local, field)
            {
                return Err(undeclared(field, "condition"));
            }
            match &condition.operand {
                Operand::Field(field) if !resolves(&local, field) => {
                    return Err(undeclared(field, "condition"));
                }
                Operand::Subquery(sub) => {
                    if !matches!(sub.clause, ClauseKind::Select | ClauseKind::Aggregate) {
                        return Err(QueryError::Build(format!(
                            "{} query cannot be used as a subquery",
                            sub.clause
                        )));
                    }
                    if matches!(condition.operator, Operator::In | Operator::NotIn)
                        && sub.aggregate.is_none()
                        && sub.projection.len() != 1
                    {
                        return Err(QueryError::Build(
                            "IN subquery must project exactly one column".to_string(),
                        ));
                    }
                    sub.validate(&visible)?;
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Fluent builder for a [`QueryGraph`].
///
/// Conditions added with the `filter*` methods are ANDed together;
/// `or_filter` conditions are ORed with that group:
/// `(a AND b) OR c OR d`.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    graph: QueryGraph,
    error: Option<QueryError>,
}

impl QueryBuilder {
    fn new(clause: ClauseKind) -> Self {
        Self {
            graph: QueryGraph::new(clause),
            error: None,
        }
    }

    pub fn select() -> Self {
        Self::new(ClauseKind::Select)
    }

    /// A single aggregate over the target, e.g. `COUNT(*) AS total`.
    pub fn aggregate(func: AggregateFn, field: Option<&str>, label: &str) -> Self {
        let mut builder = Self::new(ClauseKind::Aggregate);
        let field = match field {
            Some(field) => builder.record(FieldRef::parse(field, "aggregate field")),
            None => None,
        };
        if builder.record(check_identifier(label, "aggregate label")).is_some() {
            builder.graph.aggregate = Some(Aggregate {
                func,
                field,
                label: label.to_string(),
            });
        }
        builder
    }

    pub fn insert() -> Self {
        Self::new(ClauseKind::Insert)
    }

    pub fn update() -> Self {
        Self::new(ClauseKind::Update)
    }

    pub fn delete() -> Self {
        Self::new(ClauseKind::Delete)
    }

    /// Keep the first error; later calls become no-ops for validation purposes.
    fn record<T>(&mut self, result: QueryResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }

    fn allow(&mut self, allowed: &[ClauseKind], what: &str) -> bool {
        if allowed.contains(&self.graph.clause) {
            return true;
        }
        let clause = self.graph.clause;
        self.record::<()>(Err(QueryError::Build(format!(
            "{what} is not valid in {clause} queries"
        ))));
        false
    }

    /// Set the target table.
    pub fn table(mut self, table: &str) -> Self {
        if self.record(check_identifier(table, "table")).is_some() {
            self.graph.target = Some(Target {
                table: table.to_string(),
                alias: None,
            });
        }
        self
    }

    /// Set the target table under an alias.
    pub fn table_as(mut self, table: &str, alias: &str) -> Self {
        if !self.allow(
            &[
                ClauseKind::Select,
                ClauseKind::Aggregate,
                ClauseKind::Update,
                ClauseKind::Delete,
            ],
            "a target alias",
        ) {
            return self;
        }
        let checked = check_identifier(table, "table").and_then(|()| check_identifier(alias, "alias"));
        if self.record(checked).is_some() {
            self.graph.target = Some(Target {
                table: table.to_string(),
                alias: Some(alias.to_string()),
            });
        }
        self
    }

    /// Project one column.
    pub fn column(mut self, field: &str) -> Self {
        if !self.allow(&[ClauseKind::Select], "a projected column") {
            return self;
        }
        if let Some(field) = self.record(FieldRef::parse(field, "field")) {
            self.graph.projection.push(Projection::Field(field));
        }
        self
    }

    pub fn columns<'a>(self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        fields.into_iter().fold(self, Self::column)
    }

    /// Project every column of `reference`.
    pub fn all_columns_of(mut self, reference: &str) -> Self {
        if !self.allow(&[ClauseKind::Select], "a projected column") {
            return self;
        }
        if self.record(check_identifier(reference, "alias")).is_some() {
            self.graph
                .projection
                .push(Projection::AllOf(reference.to_string()));
        }
        self
    }

    /// Assign a column for an insert or update.
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        if !self.allow(&[ClauseKind::Insert, ClauseKind::Update], "a column assignment") {
            return self;
        }
        if self.record(check_identifier(column, "column")).is_none() {
            return self;
        }
        if self.graph.assignments.iter().any(|(c, _)| c == column) {
            self.record::<()>(Err(QueryError::Build(format!(
                "column {column} assigned more than once"
            ))));
            return self;
        }
        self.graph.assignments.push((column.to_string(), value.into()));
        self
    }

    /// Join `table AS alias ON left = right`.
    pub fn join(self, kind: JoinKind, table: &str, alias: &str, left: &str, right: &str) -> Self {
        self.join_on(kind, table, alias, left, JoinFilter::Equal, right)
    }

    pub fn join_on(
        mut self,
        kind: JoinKind,
        table: &str,
        alias: &str,
        left: &str,
        filter: JoinFilter,
        right: &str,
    ) -> Self {
        if !self.allow(&[ClauseKind::Select, ClauseKind::Aggregate], "a join") {
            return self;
        }
        let parsed = check_identifier(table, "table")
            .and_then(|()| check_identifier(alias, "alias"))
            .and_then(|()| Ok((FieldRef::parse(left, "join field")?, FieldRef::parse(right, "join field")?)));
        if let Some((left, right)) = self.record(parsed) {
            self.graph.joins.push(JoinClause {
                kind,
                table: table.to_string(),
                alias: alias.to_string(),
                left,
                filter,
                right,
            });
        }
        self
    }

    fn condition(
        mut self,
        connective: Connective,
        field: Option<&str>,
        operator: Operator,
        operand: Operand,
    ) -> Self {
        if !self.allow(
            &[
                ClauseKind::Select,
                ClauseKind::Aggregate,
                ClauseKind::Update,
                ClauseKind::Delete,
            ],
            "a condition",
        ) {
            return self;
        }
        let field = match field {
            Some(field) => match self.record(FieldRef::parse(field, "field")) {
                Some(field) => Some(field),
                None => return self,
            },
            None => None,
        };
        self.graph.conditions.push(Condition {
            connective,
            field,
            operator,
            operand,
        });
        self
    }

    fn comparison(self, connective: Connective, field: &str, operator: Operator, value: SqlValue) -> Self {
        let mut builder = self;
        if !operator.is_comparison() {
            builder.record::<()>(Err(QueryError::Build(format!(
                "{operator:?} is not a value comparison"
            ))));
            return builder;
        }
        builder.condition(connective, Some(field), operator, Operand::Value(value))
    }

    /// `field <op> value`, ANDed.
    pub fn filter(self, field: &str, operator: Operator, value: impl Into<SqlValue>) -> Self {
        self.comparison(Connective::And, field, operator, value.into())
    }

    /// `field <op> value`, ORed with the AND group.
    pub fn or_filter(self, field: &str, operator: Operator, value: impl Into<SqlValue>) -> Self {
        self.comparison(Connective::Or, field, operator, value.into())
    }

    /// Column-to-column comparison, for correlated subqueries.
    pub fn filter_field(mut self, field: &str, operator: Operator, other: &str) -> Self {
        if !operator.is_comparison() {
            self.record::<()>(Err(QueryError::Build(format!(
                "{operator:?} is not a value comparison"
            ))));
            return self;
        }
        match self.record(FieldRef::parse(other, "field")) {
            Some(other) => self.condition(Connective::And, Some(field), operator, Operand::Field(other)),
            None => self,
        }
    }

    pub fn filter_null(self, field: &str) -> Self {
        self.condition(Connective::And, Some(field), Operator::IsNull, Operand::None)
    }

    pub fn filter_not_null(self, field: &str) -> Self {
        self.condition(Connective::And, Some(field), Operator::IsNotNull, Operand::None)
    }

    /// `field IN (v1, v2, ...)`. An empty list is a build error.
    pub fn filter_in<V: Into<SqlValue>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.record::<()>(Err(QueryError::Build(format!(
                "IN list for {field} is empty"
            ))));
            return self;
        }
        self.condition(Connective::And, Some(field), Operator::In, Operand::List(values))
    }

    /// `field IN (subquery)`.
    pub fn filter_in_subquery(mut self, field: &str, subquery: QueryBuilder) -> Self {
        match self.absorb(subquery) {
            Some(graph) => self.condition(
                Connective::And,
                Some(field),
                Operator::In,
                Operand::Subquery(Box::new(graph)),
            ),
            None => self,
        }
    }

    /// `EXISTS (subquery)`.
    pub fn filter_exists(mut self, subquery: QueryBuilder) -> Self {
        match self.absorb(subquery) {
            Some(graph) => self.condition(
                Connective::And,
                None,
                Operator::Exists,
                Operand::Subquery(Box::new(graph)),
            ),
            None => self,
        }
    }

    /// `NOT EXISTS (subquery)`.
    pub fn filter_not_exists(mut self, subquery: QueryBuilder) -> Self {
        match self.absorb(subquery) {
            Some(graph) => self.condition(
                Connective::And,
                None,
                Operator::NotExists,
                Operand::Subquery(Box::new(graph)),
            ),
            None => self,
        }
    }

    /// Take a nested builder's graph, inheriting its first error. Scope
    /// checks run later against the enclosing query.
    fn absorb(&mut self, subquery: QueryBuilder) -> Option<QueryGraph> {
        let QueryBuilder { graph, error } = subquery;
        match error {
            Some(err) => self.record::<QueryGraph>(Err(err)),
            None => Some(graph),
        }
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        if !self.allow(&[ClauseKind::Select], "ordering") {
            return self;
        }
        if let Some(field) = self.record(FieldRef::parse(field, "field")) {
            self.graph.order_by.push((field, order));
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        if self.allow(&[ClauseKind::Select], "a limit") {
            self.graph.limit = Some(limit);
        }
        self
    }

    /// Finish the graph, reporting the first recorded or structural error.
    pub fn into_graph(self) -> QueryResult<QueryGraph> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.graph.validate(&HashSet::new())?;
        Ok(self.graph)
    }

    /// Validate and render for `dialect`.
    pub fn build(self, dialect: Dialect) -> QueryResult<RenderedQuery> {
        let graph = self.into_graph()?;
        Ok(render::render(&graph, dialect))
    }
}
