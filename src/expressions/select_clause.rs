//! This module contains the `SELECT` clause AST the parser hands to the planner.

use std::fmt;

use crate::expressions::{Expression, FromClause};

/// One entry in a `SELECT` list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectValue {
    /// A wildcard: `*`, or `t.*` when a table name is given.
    WildcardColumn {
        /// Restricts the wildcard to columns of this table, when present.
        table: Option<String>,
    },
    /// An expression with an optional output alias.
    Expression {
        /// The expression to evaluate for each row.
        expression: Expression,
        /// The output column name; overrides the derived name when present.
        alias: Option<String>,
    },
    /// A scalar subquery. Present in the AST surface, but unsupported by the execution engine;
    /// planning one produces a clear error.
    ScalarSubquery(Box<SelectClause>),
}

impl fmt::Display for SelectValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SelectValue::WildcardColumn { table: None } => write!(f, "*"),
            SelectValue::WildcardColumn {
                table: Some(ref t),
            } => write!(f, "{}.*", t),
            SelectValue::Expression {
                ref expression,
                alias: None,
            } => write!(f, "{}", expression),
            SelectValue::Expression {
                ref expression,
                alias: Some(ref alias),
            } => write!(f, "{} AS {}", expression, alias),
            SelectValue::ScalarSubquery(_) => write!(f, "(SELECT ...)"),
        }
    }
}

/// One `ORDER BY` term: an expression and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpression {
    /// The sort-key expression.
    pub expression: Expression,
    /// True for ascending order (the default), false for descending.
    pub ascending: bool,
}

impl OrderByExpression {
    /// Creates an ascending order-by term.
    pub fn ascending(expression: Expression) -> OrderByExpression {
        OrderByExpression {
            expression,
            ascending: true,
        }
    }

    /// Creates a descending order-by term.
    pub fn descending(expression: Expression) -> OrderByExpression {
        OrderByExpression {
            expression,
            ascending: false,
        }
    }
}

/// A parsed `SELECT` statement: the FROM tree, optional WHERE predicate, the select list, and
/// optional grouping/having/ordering clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    /// The FROM clause, absent for table-less selects such as `SELECT 2 + 3`.
    pub from_clause: Option<FromClause>,
    /// The WHERE predicate, if any.
    pub where_expr: Option<Expression>,
    /// The select list. Never empty.
    pub values: Vec<SelectValue>,
    /// `GROUP BY` expressions; empty when there is no grouping.
    pub group_by_exprs: Vec<Expression>,
    /// The `HAVING` predicate, if any.
    pub having: Option<Expression>,
    /// `ORDER BY` terms; empty when there is no ordering.
    pub order_by_exprs: Vec<OrderByExpression>,
}

impl SelectClause {
    /// Creates a `SELECT * FROM ...` clause over the given FROM tree.
    pub fn select_all(from_clause: FromClause) -> SelectClause {
        SelectClause {
            from_clause: Some(from_clause),
            where_expr: None,
            values: vec![SelectValue::WildcardColumn { table: None }],
            group_by_exprs: vec![],
            having: None,
            order_by_exprs: vec![],
        }
    }

    /// Creates a clause with the given FROM tree and select list.
    pub fn new(from_clause: FromClause, values: Vec<SelectValue>) -> SelectClause {
        SelectClause {
            from_clause: Some(from_clause),
            where_expr: None,
            values,
            group_by_exprs: vec![],
            having: None,
            order_by_exprs: vec![],
        }
    }

    /// Returns true when the select list is a single unqualified wildcard, in which case no
    /// projection node is needed.
    pub fn is_trivial_project(&self) -> bool {
        self.values.len() == 1 && self.values[0] == SelectValue::WildcardColumn { table: None }
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values: Vec<_> = self.values.iter().map(|v| format!("{}", v)).collect();
        write!(f, "SELECT {}", values.join(", "))?;
        if let Some(ref from) = self.from_clause {
            write!(f, " FROM {}", from)?;
        }
        if let Some(ref pred) = self.where_expr {
            write!(f, " WHERE {}", pred)?;
        }
        Ok(())
    }
}
