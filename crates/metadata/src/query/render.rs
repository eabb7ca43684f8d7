//! Dialect rendering of a validated [`QueryGraph`].
//!
//! Rendering is a pure walk: every graph node has one fixed textual form and
//! placeholders are numbered in the order they appear in the output.

use super::{
    AggregateFn, ClauseKind, Condition, Connective, FieldRef, JoinFilter, JoinKind, Operand,
    Operator, Projection, QueryGraph, SortOrder, SqlValue, Target,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// SQL flavor, which only decides placeholder syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `?` placeholders.
    Sqlite,
    /// `$1, $2, ...` placeholders.
    Postgres,
}

/// SQL text plus its bound parameters, in placeholder order.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub kind: ClauseKind,
}

impl Operator {
    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Exists => "EXISTS",
            Self::NotExists => "NOT EXISTS",
        }
    }
}

impl JoinKind {
    fn sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT OUTER JOIN",
            Self::RightOuter => "RIGHT OUTER JOIN",
            Self::Full => "FULL OUTER JOIN",
        }
    }
}

impl JoinFilter {
    fn sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
        }
    }
}

impl AggregateFn {
    fn sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
        }
    }
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

pub(super) fn render(graph: &QueryGraph, dialect: Dialect) -> RenderedQuery {
    let mut renderer = Renderer {
        dialect,
        sql: String::new(),
        params: Vec::new(),
    };
    renderer.statement(graph);
    RenderedQuery {
        sql: renderer.sql,
        params: renderer.params,
        kind: graph.clause,
    }
}

struct Renderer {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl Renderer {
    fn bind(&mut self, value: SqlValue) {
        self.params.push(value);
        match self.dialect {
            Dialect::Sqlite => self.sql.push('?'),
            Dialect::Postgres => {
                let _ = write!(self.sql, "${}", self.params.len());
            }
        }
    }

    fn field(&mut self, field: &FieldRef) {
        if let Some(qualifier) = &field.qualifier {
            self.sql.push_str(qualifier);
            self.sql.push('.');
        }
        self.sql.push_str(&field.column);
    }

    fn target(&mut self, target: Option<&Target>) {
        // Validation guarantees a target before rendering.
        let Some(target) = target else { return };
        self.sql.push_str(&target.table);
        if let Some(alias) = &target.alias {
            self.sql.push_str(" AS ");
            self.sql.push_str(alias);
        }
    }

    fn statement(&mut self, graph: &QueryGraph) {
        match graph.clause {
            ClauseKind::Select => {
                self.sql.push_str("SELECT ");
                self.projection(&graph.projection);
                self.sql.push_str(" FROM ");
                self.target(graph.target.as_ref());
                self.joins(graph);
                self.conditions(&graph.conditions);
                self.order_by(&graph.order_by);
                if let Some(limit) = graph.limit {
                    self.sql.push_str(" LIMIT ");
                    self.bind(SqlValue::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
                }
            }
            ClauseKind::Aggregate => {
                self.sql.push_str("SELECT ");
                if let Some(aggregate) = &graph.aggregate {
                    self.sql.push_str(aggregate.func.sql());
                    self.sql.push('(');
                    match &aggregate.field {
                        Some(field) => self.field(field),
                        None => self.sql.push('*'),
                    }
                    self.sql.push_str(") AS ");
                    self.sql.push_str(&aggregate.label);
                }
                self.sql.push_str(" FROM ");
                self.target(graph.target.as_ref());
                self.joins(graph);
                self.conditions(&graph.conditions);
            }
            ClauseKind::Insert => {
                self.sql.push_str("INSERT INTO ");
                self.target(graph.target.as_ref());
                self.sql.push_str(" (");
                for (i, (column, _)) in graph.assignments.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.sql.push_str(column);
                }
                self.sql.push_str(") VALUES (");
                for (i, (_, value)) in graph.assignments.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind(value.clone());
                }
                self.sql.push(')');
            }
            ClauseKind::Update => {
                self.sql.push_str("UPDATE ");
                self.target(graph.target.as_ref());
                self.sql.push_str(" SET ");
                for (i, (column, value)) in graph.assignments.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.sql.push_str(column);
                    self.sql.push_str(" = ");
                    self.bind(value.clone());
                }
                self.conditions(&graph.conditions);
            }
            ClauseKind::Delete => {
                self.sql.push_str("DELETE FROM ");
                self.target(graph.target.as_ref());
                self.conditions(&graph.conditions);
            }
        }
    }

    fn projection(&mut self, projection: &[Projection]) {
        if projection.is_empty() {
            self.sql.push('*');
            return;
        }
        for (i, item) in projection.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            match item {
                Projection::Field(field) => self.field(field),
                Projection::AllOf(reference) => {
                    self.sql.push_str(reference);
                    self.sql.push_str(".*");
                }
            }
        }
    }

    fn joins(&mut self, graph: &QueryGraph) {
        for join in &graph.joins {
            self.sql.push(' ');
            self.sql.push_str(join.kind.sql());
            self.sql.push(' ');
            self.sql.push_str(&join.table);
            self.sql.push_str(" AS ");
            self.sql.push_str(&join.alias);
            self.sql.push_str(" ON ");
            self.field(&join.left);
            self.sql.push(' ');
            self.sql.push_str(join.filter.sql());
            self.sql.push(' ');
            self.field(&join.right);
        }
    }

    /// `(and1 AND and2) OR or1 OR or2`; parentheses only when needed.
    fn conditions(&mut self, conditions: &[Condition]) {
        if conditions.is_empty() {
            return;
        }
        let (all, any): (Vec<&Condition>, Vec<&Condition>) = conditions
            .iter()
            .partition(|c| c.connective == Connective::And);

        self.sql.push_str(" WHERE ");
        let wrap = !any.is_empty() && all.len() > 1;
        if wrap {
            self.sql.push('(');
        }
        for (i, condition) in all.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(" AND ");
            }
            self.condition(condition);
        }
        if wrap {
            self.sql.push(')');
        }
        for (i, condition) in any.iter().enumerate() {
            if i > 0 || !all.is_empty() {
                self.sql.push_str(" OR ");
            }
            self.condition(condition);
        }
    }

    fn condition(&mut self, condition: &Condition) {
        if let Some(field) = &condition.field {
            self.field(field);
            self.sql.push(' ');
        }
        self.sql.push_str(condition.operator.sql());
        match &condition.operand {
            Operand::None => {}
            Operand::Value(value) => {
                self.sql.push(' ');
                self.bind(value.clone());
            }
            Operand::Field(field) => {
                self.sql.push(' ');
                self.field(field);
            }
            Operand::List(values) => {
                self.sql.push_str(" (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind(value.clone());
                }
                self.sql.push(')');
            }
            Operand::Subquery(sub) => {
                self.sql.push_str(" (");
                self.statement(sub);
                self.sql.push(')');
            }
        }
    }

    fn order_by(&mut self, order_by: &[(FieldRef, SortOrder)]) {
        for (i, (field, order)) in order_by.iter().enumerate() {
            self.sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            self.field(field);
            self.sql.push(' ');
            self.sql.push_str(order.sql());
        }
    }
}
