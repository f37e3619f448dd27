//! This module contains the `Expression` sum type and its evaluation rules.

use std::collections::HashSet;
use std::fmt;

use crate::expressions::{
    AggregateFunction, ArithmeticType, CompareType, Environment, Literal,
};
use crate::relations::{column_name_to_string, ColumnName, ColumnType, Schema};

/// An error produced while evaluating or type-checking an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// A column reference could not be resolved against the environment or schema.
    CouldNotResolve(ColumnName),
    /// An unqualified column reference matched more than one column.
    AmbiguousColumn(String),
    /// A value that must be boolean was not.
    NotBoolean(Literal),
    /// A value that must be numeric was not.
    NotNumeric(Literal),
    /// Two values could not be compared with each other.
    Incomparable(Literal, Literal),
    /// Integer division or remainder by zero.
    DivideByZero,
    /// An AND/OR expression with no terms.
    EmptyExpression,
    /// An aggregate call was evaluated directly; aggregates must be rewritten by the planner
    /// into grouping columns before execution.
    UnevaluatedAggregate(String),
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ExpressionError::CouldNotResolve(ref name) => {
                write!(f, "could not resolve column {}", column_name_to_string(name))
            }
            ExpressionError::AmbiguousColumn(ref name) => {
                write!(f, "column reference {} is ambiguous", name)
            }
            ExpressionError::NotBoolean(ref l) => write!(f, "expected a boolean value, got {}", l),
            ExpressionError::NotNumeric(ref l) => write!(f, "expected a numeric value, got {}", l),
            ExpressionError::Incomparable(ref a, ref b) => {
                write!(f, "cannot compare {} with {}", a, b)
            }
            ExpressionError::DivideByZero => write!(f, "division by zero"),
            ExpressionError::EmptyExpression => {
                write!(f, "boolean expression with no terms")
            }
            ExpressionError::UnevaluatedAggregate(ref name) => {
                write!(f, "aggregate {} cannot be evaluated outside grouping", name)
            }
        }
    }
}

/// A SQL-supported expression, evaluated against an [`Environment`] that supplies the current
/// tuple bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(Literal),
    /// A column reference, resolved dynamically at evaluation time.
    ColumnValue(ColumnName),
    /// An arithmetic expression.
    Arithmetic(Box<Expression>, ArithmeticType, Box<Expression>),
    /// A comparison expression.
    Compare(Box<Expression>, CompareType, Box<Expression>),
    /// A Boolean AND over two or more terms.
    And(Vec<Expression>),
    /// A Boolean OR over two or more terms.
    Or(Vec<Expression>),
    /// A Boolean NOT.
    Not(Box<Expression>),
    /// An `IS NULL` test.
    IsNull(Box<Expression>),
    /// An aggregate function call; `None` argument means `COUNT(*)`. These are rewritten into
    /// generated grouping columns by the planner and never evaluated directly.
    AggregateCall {
        /// The aggregate function.
        function: AggregateFunction,
        /// The argument expression, absent for `COUNT(*)`.
        argument: Option<Box<Expression>>,
        /// Whether `DISTINCT` was specified.
        distinct: bool,
    },
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Expression::Literal(literal)
    }
}

impl From<ColumnName> for Expression {
    fn from(name: ColumnName) -> Self {
        Expression::ColumnValue(name)
    }
}

fn widen_numeric(left: &Literal, right: &Literal) -> bool {
    left.is_floating_point() || right.is_floating_point()
}

fn check_numeric(value: &Literal) -> Result<(), ExpressionError> {
    if value.is_numeric() {
        Ok(())
    } else {
        Err(ExpressionError::NotNumeric(value.clone()))
    }
}

impl Expression {
    /// Constructs a comparison between two expressions.
    pub fn compare<L: Into<Expression>, R: Into<Expression>>(
        left: L,
        op: CompareType,
        right: R,
    ) -> Expression {
        Expression::Compare(Box::new(left.into()), op, Box::new(right.into()))
    }

    /// Appends a term to an AND or OR expression. Any other expression is first wrapped into an
    /// AND with the existing expression as the initial term.
    pub fn add_term(&mut self, term: Expression) {
        match *self {
            Expression::And(ref mut terms) | Expression::Or(ref mut terms) => terms.push(term),
            _ => {
                let existing = std::mem::replace(self, Expression::Literal(Literal::Null));
                *self = Expression::And(vec![existing, term]);
            }
        }
    }

    /// Evaluates this expression in the context of the specified environment. The environment
    /// provides the current tuples loaded from the tables referenced within the expression;
    /// `None` means no tuples are in scope, so any column reference fails to resolve.
    pub fn evaluate(&self, env: Option<&Environment>) -> Result<Literal, ExpressionError> {
        match *self {
            Expression::Literal(ref l) => Ok(l.clone()),

            Expression::ColumnValue(ref name) => match env {
                Some(env) => env.get_column_value(name),
                None => Err(ExpressionError::CouldNotResolve(name.clone())),
            },

            Expression::Arithmetic(ref left, op, ref right) => {
                let left_val = left.evaluate(env)?;
                let right_val = right.evaluate(env)?;
                if left_val == Literal::Null || right_val == Literal::Null {
                    return Ok(Literal::Null);
                }
                check_numeric(&left_val)?;
                check_numeric(&right_val)?;
                evaluate_arithmetic(&left_val, op, &right_val)
            }

            Expression::Compare(ref left, op, ref right) => {
                let left_val = left.evaluate(env)?;
                let right_val = right.evaluate(env)?;
                if left_val == Literal::Null || right_val == Literal::Null {
                    return Ok(Literal::Null);
                }
                match left_val.compare(&right_val) {
                    Some(ordering) => {
                        let result = match op {
                            CompareType::Equals => ordering == std::cmp::Ordering::Equal,
                            CompareType::NotEquals => ordering != std::cmp::Ordering::Equal,
                            CompareType::LessThan => ordering == std::cmp::Ordering::Less,
                            CompareType::LessThanEqual => ordering != std::cmp::Ordering::Greater,
                            CompareType::GreaterThan => ordering == std::cmp::Ordering::Greater,
                            CompareType::GreaterThanEqual => ordering != std::cmp::Ordering::Less,
                        };
                        Ok(result.into())
                    }
                    None => Err(ExpressionError::Incomparable(left_val, right_val)),
                }
            }

            Expression::And(ref terms) => {
                if terms.is_empty() {
                    return Err(ExpressionError::EmptyExpression);
                }
                let mut saw_null = false;
                for term in terms {
                    match term.evaluate(env)? {
                        Literal::True => {}
                        Literal::False => return Ok(Literal::False),
                        Literal::Null => saw_null = true,
                        other => return Err(ExpressionError::NotBoolean(other)),
                    }
                }
                Ok(if saw_null { Literal::Null } else { Literal::True })
            }

            Expression::Or(ref terms) => {
                if terms.is_empty() {
                    return Err(ExpressionError::EmptyExpression);
                }
                let mut saw_null = false;
                for term in terms {
                    match term.evaluate(env)? {
                        Literal::True => return Ok(Literal::True),
                        Literal::False => {}
                        Literal::Null => saw_null = true,
                        other => return Err(ExpressionError::NotBoolean(other)),
                    }
                }
                Ok(if saw_null { Literal::Null } else { Literal::False })
            }

            Expression::Not(ref inner) => match inner.evaluate(env)? {
                Literal::True => Ok(Literal::False),
                Literal::False => Ok(Literal::True),
                Literal::Null => Ok(Literal::Null),
                other => Err(ExpressionError::NotBoolean(other)),
            },

            Expression::IsNull(ref inner) => {
                let value = inner.evaluate(env)?;
                Ok((value == Literal::Null).into())
            }

            Expression::AggregateCall { function, .. } => Err(
                ExpressionError::UnevaluatedAggregate(format!("{}", function)),
            ),
        }
    }

    /// Evaluates this expression as a predicate. A NULL result is treated as false, per SQL's
    /// three-valued logic for `WHERE` clauses.
    pub fn evaluate_predicate(&self, env: Option<&Environment>) -> Result<bool, ExpressionError> {
        match self.evaluate(env)? {
            Literal::True => Ok(true),
            Literal::False | Literal::Null => Ok(false),
            other => Err(ExpressionError::NotBoolean(other)),
        }
    }

    /// Collects every column name referenced anywhere within this expression.
    pub fn get_all_symbols(&self, symbols: &mut HashSet<ColumnName>) {
        match *self {
            Expression::Literal(_) => {}
            Expression::ColumnValue(ref name) => {
                symbols.insert(name.clone());
            }
            Expression::Arithmetic(ref l, _, ref r) | Expression::Compare(ref l, _, ref r) => {
                l.get_all_symbols(symbols);
                r.get_all_symbols(symbols);
            }
            Expression::And(ref terms) | Expression::Or(ref terms) => {
                for term in terms {
                    term.get_all_symbols(symbols);
                }
            }
            Expression::Not(ref inner) | Expression::IsNull(ref inner) => {
                inner.get_all_symbols(symbols)
            }
            Expression::AggregateCall { ref argument, .. } => {
                if let Some(ref arg) = *argument {
                    arg.get_all_symbols(symbols);
                }
            }
        }
    }

    /// Normalizes the expression so that comparisons between a column and a literal always have
    /// the column on the left, flipping the comparison operator as needed. Applied recursively.
    /// The selectivity estimator relies on this form.
    pub fn normalize(self) -> Expression {
        match self {
            Expression::Compare(left, op, right) => {
                let left = left.normalize();
                let right = right.normalize();
                if matches!(left, Expression::Literal(_))
                    && matches!(right, Expression::ColumnValue(_))
                {
                    Expression::Compare(Box::new(right), op.flipped(), Box::new(left))
                } else {
                    Expression::Compare(Box::new(left), op, Box::new(right))
                }
            }
            Expression::Arithmetic(l, op, r) => {
                Expression::Arithmetic(Box::new(l.normalize()), op, Box::new(r.normalize()))
            }
            Expression::And(terms) => {
                Expression::And(terms.into_iter().map(Expression::normalize).collect())
            }
            Expression::Or(terms) => {
                Expression::Or(terms.into_iter().map(Expression::normalize).collect())
            }
            Expression::Not(inner) => Expression::Not(Box::new(inner.normalize())),
            Expression::IsNull(inner) => Expression::IsNull(Box::new(inner.normalize())),
            other => other,
        }
    }

    /// Determines the column type this expression produces against the given schema. Boolean
    /// results are typed as `TINYINT`, matching their storage representation.
    pub fn get_column_type(&self, schema: &Schema) -> Result<ColumnType, ExpressionError> {
        match *self {
            Expression::Literal(ref l) => Ok(match *l {
                Literal::Int(_) => ColumnType::Integer,
                Literal::Long(_) => ColumnType::BigInt,
                Literal::Float(_) => ColumnType::Float,
                Literal::Double(_) => ColumnType::Double,
                Literal::String(ref s) => ColumnType::VarChar {
                    length: s.len().max(1) as u16,
                },
                Literal::True | Literal::False => ColumnType::TinyInt,
                Literal::Null => ColumnType::Null,
                Literal::FilePointer(_) => ColumnType::FilePointer,
            }),

            Expression::ColumnValue(ref name) => schema
                .find_column(name)
                .map(|(_, info)| info.column_type)
                .map_err(|e| match e {
                    crate::relations::SchemaError::Ambiguous(name) => {
                        ExpressionError::AmbiguousColumn(name)
                    }
                    _ => ExpressionError::CouldNotResolve(name.clone()),
                }),

            Expression::Arithmetic(ref l, _, ref r) => {
                let left = l.get_column_type(schema)?;
                let right = r.get_column_type(schema)?;
                // The result takes the wider of the two operand types.
                Ok(match (left, right) {
                    (ColumnType::Double, _) | (_, ColumnType::Double) => ColumnType::Double,
                    (ColumnType::Float, _) | (_, ColumnType::Float) => ColumnType::Float,
                    (ColumnType::BigInt, _) | (_, ColumnType::BigInt) => ColumnType::BigInt,
                    _ => ColumnType::Integer,
                })
            }

            Expression::Compare(..)
            | Expression::And(_)
            | Expression::Or(_)
            | Expression::Not(_)
            | Expression::IsNull(_) => Ok(ColumnType::TinyInt),

            Expression::AggregateCall {
                function,
                ref argument,
                ..
            } => match function {
                AggregateFunction::Count => Ok(ColumnType::Integer),
                AggregateFunction::Avg => Ok(ColumnType::Double),
                AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                    match *argument {
                        Some(ref arg) => arg.get_column_type(schema),
                        None => Ok(ColumnType::Integer),
                    }
                }
            },
        }
    }

    /// Returns true if the expression contains an aggregate call anywhere within it.
    pub fn contains_aggregate(&self) -> bool {
        match *self {
            Expression::AggregateCall { .. } => true,
            Expression::Literal(_) | Expression::ColumnValue(_) => false,
            Expression::Arithmetic(ref l, _, ref r) | Expression::Compare(ref l, _, ref r) => {
                l.contains_aggregate() || r.contains_aggregate()
            }
            Expression::And(ref terms) | Expression::Or(ref terms) => {
                terms.iter().any(Expression::contains_aggregate)
            }
            Expression::Not(ref inner) | Expression::IsNull(ref inner) => {
                inner.contains_aggregate()
            }
        }
    }
}

fn evaluate_arithmetic(
    left: &Literal,
    op: ArithmeticType,
    right: &Literal,
) -> Result<Literal, ExpressionError> {
    if widen_numeric(left, right) {
        let l = left.to_double().unwrap();
        let r = right.to_double().unwrap();
        let result = match op {
            ArithmeticType::Plus => l + r,
            ArithmeticType::Minus => l - r,
            ArithmeticType::Multiply => l * r,
            ArithmeticType::Divide => l / r,
            ArithmeticType::Remainder => l % r,
            ArithmeticType::Power => l.powf(r),
        };
        Ok(Literal::Double(result))
    } else {
        let l = left.to_long().unwrap();
        let r = right.to_long().unwrap();
        if r == 0 && matches!(op, ArithmeticType::Divide | ArithmeticType::Remainder) {
            return Err(ExpressionError::DivideByZero);
        }
        let result = match op {
            ArithmeticType::Plus => l.wrapping_add(r),
            ArithmeticType::Minus => l.wrapping_sub(r),
            ArithmeticType::Multiply => l.wrapping_mul(r),
            ArithmeticType::Divide => l / r,
            ArithmeticType::Remainder => l % r,
            ArithmeticType::Power => {
                if r < 0 {
                    return Ok(Literal::Double((l as f64).powf(r as f64)));
                }
                (l as i64).wrapping_pow(r.min(u32::MAX as i64) as u32)
            }
        };
        // Narrow back to Int when both inputs were Ints and the result fits.
        match (left, right) {
            (&Literal::Int(_), &Literal::Int(_))
                if result >= i32::MIN as i64 && result <= i32::MAX as i64 =>
            {
                Ok(Literal::Int(result as i32))
            }
            _ => Ok(Literal::Long(result)),
        }
    }
}

fn wrap_expr_parens(expr: &Expression) -> String {
    match *expr {
        Expression::Literal(_) | Expression::ColumnValue(_) => format!("{}", expr),
        _ => format!("({})", expr),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Expression::Literal(ref l) => write!(f, "{}", l),
            Expression::ColumnValue(ref name) => write!(f, "{}", column_name_to_string(name)),
            Expression::Arithmetic(ref l, op, ref r) => {
                write!(f, "{} {} {}", wrap_expr_parens(l), op, wrap_expr_parens(r))
            }
            Expression::Compare(ref l, op, ref r) => {
                write!(f, "{} {} {}", wrap_expr_parens(l), op, wrap_expr_parens(r))
            }
            Expression::And(ref terms) => {
                let parts: Vec<_> = terms.iter().map(wrap_expr_parens).collect();
                write!(f, "{}", parts.join(" AND "))
            }
            Expression::Or(ref terms) => {
                let parts: Vec<_> = terms.iter().map(wrap_expr_parens).collect();
                write!(f, "{}", parts.join(" OR "))
            }
            Expression::Not(ref inner) => write!(f, "NOT {}", wrap_expr_parens(inner)),
            Expression::IsNull(ref inner) => write!(f, "{} IS NULL", wrap_expr_parens(inner)),
            Expression::AggregateCall {
                function,
                ref argument,
                distinct,
            } => {
                let arg = match *argument {
                    Some(ref a) => format!("{}", a),
                    None => "*".to_string(),
                };
                if distinct {
                    write!(f, "{}(DISTINCT {})", function, arg)
                } else {
                    write!(f, "{}({})", function, arg)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::Environment;
    use crate::relations::{ColumnInfo, Schema};
    use crate::storage::TupleLiteral;

    fn col(name: &str) -> Expression {
        Expression::ColumnValue((None, Some(name.into())))
    }

    fn int(i: i32) -> Expression {
        Expression::Literal(Literal::Int(i))
    }

    #[test]
    fn test_arithmetic_evaluation() {
        let expr = Expression::Arithmetic(
            Box::new(int(123)),
            ArithmeticType::Plus,
            Box::new(int(432)),
        );
        assert_eq!(expr.evaluate(None), Ok(Literal::Int(555)));

        let expr = Expression::Arithmetic(
            Box::new(int(10)),
            ArithmeticType::Divide,
            Box::new(int(0)),
        );
        assert_eq!(expr.evaluate(None), Err(ExpressionError::DivideByZero));

        let expr = Expression::Arithmetic(
            Box::new(int(2)),
            ArithmeticType::Power,
            Box::new(int(10)),
        );
        assert_eq!(expr.evaluate(None), Ok(Literal::Int(1024)));

        let expr = Expression::Arithmetic(
            Box::new(Expression::Literal(Literal::Double(1.5))),
            ArithmeticType::Multiply,
            Box::new(int(4)),
        );
        assert_eq!(expr.evaluate(None), Ok(Literal::Double(6.0)));
    }

    #[test]
    fn test_null_propagation() {
        let expr = Expression::Arithmetic(
            Box::new(Expression::Literal(Literal::Null)),
            ArithmeticType::Plus,
            Box::new(int(1)),
        );
        assert_eq!(expr.evaluate(None), Ok(Literal::Null));

        let cmp = Expression::compare(Literal::Null, CompareType::Equals, Literal::Int(1));
        assert_eq!(cmp.evaluate(None), Ok(Literal::Null));
        // NULL comparison results are false as predicates.
        assert_eq!(cmp.evaluate_predicate(None), Ok(false));
    }

    #[test]
    fn test_boolean_logic() {
        let t = Expression::Literal(Literal::True);
        let f_expr = Expression::Literal(Literal::False);

        let and = Expression::And(vec![t.clone(), f_expr.clone()]);
        assert_eq!(and.evaluate(None), Ok(Literal::False));

        let or = Expression::Or(vec![f_expr.clone(), t.clone()]);
        assert_eq!(or.evaluate(None), Ok(Literal::True));

        let not = Expression::Not(Box::new(f_expr));
        assert_eq!(not.evaluate(None), Ok(Literal::True));

        assert_eq!(
            Expression::And(vec![]).evaluate(None),
            Err(ExpressionError::EmptyExpression)
        );
    }

    #[test]
    fn test_add_term() {
        let mut expr = Expression::And(vec![int(1)]);
        expr.add_term(int(2));
        assert_eq!(expr, Expression::And(vec![int(1), int(2)]));

        // Non-boolean expressions get wrapped.
        let mut expr = int(1);
        expr.add_term(int(2));
        assert_eq!(expr, Expression::And(vec![int(1), int(2)]));
    }

    #[test]
    fn test_column_resolution() {
        let schema = Schema::with_columns(vec![
            ColumnInfo::with_table_name(ColumnType::Integer, "a", "t"),
            ColumnInfo::with_table_name(ColumnType::VarChar { length: 8 }, "b", "t"),
        ])
        .unwrap();
        let mut tuple = TupleLiteral::new();
        tuple.add_value(Literal::Int(42));
        tuple.add_value(Literal::from("hi"));

        let mut env = Environment::new();
        env.add_tuple(schema, tuple);

        assert_eq!(col("a").evaluate(Some(&env)), Ok(Literal::Int(42)));
        assert_eq!(col("b").evaluate(Some(&env)), Ok(Literal::from("hi")));
        assert_eq!(
            col("zzz").evaluate(Some(&env)),
            Err(ExpressionError::CouldNotResolve((None, Some("zzz".into()))))
        );
    }

    #[test]
    fn test_normalize_swaps_literal_comparisons() {
        let expr = Expression::compare(Literal::Int(3), CompareType::LessThan, col("a"));
        let normalized = expr.normalize();
        assert_eq!(
            normalized,
            Expression::compare(col("a"), CompareType::GreaterThan, Literal::Int(3))
        );

        // Column-on-left comparisons are untouched.
        let expr = Expression::compare(col("a"), CompareType::Equals, Literal::Int(3));
        assert_eq!(expr.clone().normalize(), expr);
    }

    #[test]
    fn test_get_all_symbols() {
        let expr = Expression::And(vec![
            Expression::compare(col("a"), CompareType::Equals, col("b")),
            Expression::compare(col("a"), CompareType::LessThan, Literal::Int(5)),
        ]);
        let mut symbols = HashSet::new();
        expr.get_all_symbols(&mut symbols);
        assert_eq!(symbols.len(), 2);
        assert!(symbols.contains(&(None, Some("a".into()))));
        assert!(symbols.contains(&(None, Some("b".into()))));
    }

    #[test]
    fn test_is_null() {
        let expr = Expression::IsNull(Box::new(Expression::Literal(Literal::Null)));
        assert_eq!(expr.evaluate(None), Ok(Literal::True));
        let expr = Expression::IsNull(Box::new(int(3)));
        assert_eq!(expr.evaluate(None), Ok(Literal::False));
    }
}
