//! A module containing classes for representing and evaluating arithmetic and logical
//! expressions, plus the query-AST clauses (`SELECT`, `FROM`) that the parser hands to the
//! planner.

pub mod environment;
pub mod expression;
pub mod from_clause;
pub mod literal;
pub mod select_clause;

pub use self::environment::Environment;
pub use self::expression::{Expression, ExpressionError};
pub use self::from_clause::{FromClause, FromClauseError, JoinConditionType, JoinType, PreparedJoin};
pub use self::literal::{Literal, LiteralKey};
pub use self::select_clause::{OrderByExpression, SelectClause, SelectValue};

use std::fmt;

/// Describes a comparison operation.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum CompareType {
    /// Equality
    Equals,
    /// Inequality
    NotEquals,
    /// Less than
    LessThan,
    /// Less than or equal to
    LessThanEqual,
    /// Greater than
    GreaterThan,
    /// Greater than or equal to
    GreaterThanEqual,
}

impl CompareType {
    /// Returns the comparison that holds when the two operands are swapped; e.g. `a < b` iff
    /// `b > a`. Used when normalizing comparisons into column-on-the-left form.
    pub fn flipped(&self) -> CompareType {
        match *self {
            CompareType::Equals => CompareType::Equals,
            CompareType::NotEquals => CompareType::NotEquals,
            CompareType::LessThan => CompareType::GreaterThan,
            CompareType::LessThanEqual => CompareType::GreaterThanEqual,
            CompareType::GreaterThan => CompareType::LessThan,
            CompareType::GreaterThanEqual => CompareType::LessThanEqual,
        }
    }
}

impl fmt::Display for CompareType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            CompareType::Equals => "=",
            CompareType::NotEquals => "!=",
            CompareType::LessThan => "<",
            CompareType::LessThanEqual => "<=",
            CompareType::GreaterThan => ">",
            CompareType::GreaterThanEqual => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Describes an arithmetic operation.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ArithmeticType {
    /// Addition
    Plus,
    /// Subtraction
    Minus,
    /// Multiplication
    Multiply,
    /// Division
    Divide,
    /// Modulo
    Remainder,
    /// Exponentiation
    Power,
}

impl fmt::Display for ArithmeticType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            ArithmeticType::Plus => "+",
            ArithmeticType::Minus => "-",
            ArithmeticType::Multiply => "*",
            ArithmeticType::Divide => "/",
            ArithmeticType::Remainder => "%",
            ArithmeticType::Power => "^",
        };
        write!(f, "{}", s)
    }
}

/// The aggregate functions the group/aggregate plan node can compute. Aggregate calls appear as
/// expressions in a `SELECT` list or `HAVING` clause; the planner extracts them and the
/// grouping node maintains their per-group state.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum AggregateFunction {
    /// `COUNT(expr)` / `COUNT(*)`: number of (non-NULL) inputs.
    Count,
    /// `SUM(expr)`: sum of non-NULL inputs.
    Sum,
    /// `AVG(expr)`: mean of non-NULL inputs.
    Avg,
    /// `MIN(expr)`: least non-NULL input.
    Min,
    /// `MAX(expr)`: greatest non-NULL input.
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        };
        write!(f, "{}", s)
    }
}
