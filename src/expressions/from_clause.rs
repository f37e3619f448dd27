//! This module contains the `FROM` clause AST, including join expressions and their condition
//! preparation.

use std::fmt;

use crate::expressions::{CompareType, Expression, SelectClause, SelectValue};
use crate::relations::{ColumnInfo, Schema};

/// An enumeration specifying the different types of join operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinType {
    /// Inner join: only matching row pairs are included in the result.
    Inner,
    /// Cross join: the Cartesian product.
    Cross,
    /// Left outer join. Not supported by the execution engine.
    LeftOuter,
    /// Right outer join. Not supported by the execution engine.
    RightOuter,
    /// Full outer join. Not supported by the execution engine.
    FullOuter,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            JoinType::Inner => "INNER",
            JoinType::Cross => "CROSS",
            JoinType::LeftOuter => "LEFT OUTER",
            JoinType::RightOuter => "RIGHT OUTER",
            JoinType::FullOuter => "FULL OUTER",
        };
        write!(f, "{}", s)
    }
}

/// For FROM clauses that contain join expressions, this enumeration specifies the kind of
/// join-condition attached to the join.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinConditionType {
    /// No condition: a plain Cartesian product.
    None,
    /// A natural join: values in all identically-named columns must be equal.
    Natural,
    /// A `USING (...)` clause, explicitly listing the shared columns whose values must be equal.
    Using(Vec<String>),
    /// An `ON expr` clause.
    OnExpr(Expression),
}

/// An error produced while preparing a join condition against the child schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum FromClauseError {
    /// A join column was missing on one side.
    MissingJoinColumn(String, &'static str),
    /// A join column name was ambiguous on one side.
    AmbiguousJoinColumn(String, &'static str),
    /// A NATURAL join's child schemas share no column names.
    NoSharedColumns,
    /// A column name appeared twice in a USING list.
    UsingDuplicate(String),
}

impl fmt::Display for FromClauseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FromClauseError::MissingJoinColumn(ref name, side) => {
                write!(f, "join column {} doesn't appear on the {} side", name, side)
            }
            FromClauseError::AmbiguousJoinColumn(ref name, side) => {
                write!(f, "join column {} is ambiguous on the {} side", name, side)
            }
            FromClauseError::NoSharedColumns => {
                write!(f, "NATURAL JOIN children share no common column names")
            }
            FromClauseError::UsingDuplicate(ref name) => {
                write!(f, "column {} appears multiple times in USING clause", name)
            }
        }
    }
}

/// A hierarchy of one or more base and derived relations that produce the rows considered by a
/// `SELECT` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum FromClause {
    /// A base table, with an optional alias.
    BaseTable {
        /// The name of the table being selected from.
        table: String,
        /// An optional alias to rename the table with.
        alias: Option<String>,
    },
    /// A derived relation: a nested `SELECT` with a mandatory alias.
    SelectSubquery {
        /// The nested query.
        select: Box<SelectClause>,
        /// The alias naming the derived relation.
        alias: String,
    },
    /// A join of two FROM subtrees.
    Join {
        /// The left subtree.
        left: Box<FromClause>,
        /// The right subtree.
        right: Box<FromClause>,
        /// The join operation.
        join_type: JoinType,
        /// The join condition.
        condition: JoinConditionType,
    },
}

/// The result of preparing a join condition against the child schemas: the predicate to apply,
/// and (for NATURAL/USING joins) the projection that collapses the shared columns down to one
/// copy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedJoin {
    /// The join predicate, if any.
    pub predicate: Option<Expression>,
    /// Select values projecting away the duplicated shared columns, if needed.
    pub project_values: Option<Vec<SelectValue>>,
}

fn resolve_side(
    schema: &Schema,
    name: &str,
    side: &'static str,
) -> Result<ColumnInfo, FromClauseError> {
    let matches = schema.find_columns(&(None, Some(name.into())));
    match matches.len() {
        0 => Err(FromClauseError::MissingJoinColumn(name.into(), side)),
        1 => Ok(matches[0].1.clone()),
        _ => Err(FromClauseError::AmbiguousJoinColumn(name.into(), side)),
    }
}

/// Builds the equality predicate and collapsing projection for a list of shared column names.
/// This is the common machinery behind NATURAL and USING joins.
fn prepare_shared_columns(
    left: &Schema,
    right: &Schema,
    shared: &[String],
) -> Result<PreparedJoin, FromClauseError> {
    let mut and_terms: Vec<Expression> = Vec::new();
    let mut values: Vec<SelectValue> = Vec::new();

    for name in shared {
        let left_info = resolve_side(left, name, "left")?;
        let right_info = resolve_side(right, name, "right")?;

        and_terms.push(Expression::Compare(
            Box::new(Expression::ColumnValue(left_info.get_column_name())),
            CompareType::Equals,
            Box::new(Expression::ColumnValue(right_info.get_column_name())),
        ));

        // Project the left copy down to the bare shared name.
        values.push(SelectValue::Expression {
            expression: Expression::ColumnValue(left_info.get_column_name()),
            alias: Some(name.clone()),
        });
    }

    // All non-shared columns pass through untouched.
    for info in left.iter().chain(right.iter()) {
        if let Some(ref name) = info.name {
            if !shared.contains(name) {
                values.push(SelectValue::Expression {
                    expression: Expression::ColumnValue(info.get_column_name()),
                    alias: None,
                });
            }
        }
    }

    let predicate = if and_terms.len() == 1 {
        Some(and_terms.into_iter().next().unwrap())
    } else {
        Some(Expression::And(and_terms))
    };

    Ok(PreparedJoin {
        predicate,
        project_values: Some(values),
    })
}

impl FromClause {
    /// Creates a base-table FROM clause.
    pub fn base_table<S: Into<String>>(table: S) -> FromClause {
        FromClause::BaseTable {
            table: table.into(),
            alias: None,
        }
    }

    /// Creates an aliased base-table FROM clause.
    pub fn aliased_table<S1: Into<String>, S2: Into<String>>(table: S1, alias: S2) -> FromClause {
        FromClause::BaseTable {
            table: table.into(),
            alias: Some(alias.into()),
        }
    }

    /// Creates a join FROM clause.
    pub fn join(
        left: FromClause,
        right: FromClause,
        join_type: JoinType,
        condition: JoinConditionType,
    ) -> FromClause {
        FromClause::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            condition,
        }
    }

    /// The name this FROM item exposes to column references, if it is a leaf: the alias if one
    /// was given, otherwise the base table name.
    pub fn result_name(&self) -> Option<&str> {
        match *self {
            FromClause::BaseTable {
                ref table,
                ref alias,
            } => Some(alias.as_deref().unwrap_or(table)),
            FromClause::SelectSubquery { ref alias, .. } => Some(alias),
            FromClause::Join { .. } => None,
        }
    }

    /// Prepares a join condition against the schemas of the two children, turning NATURAL and
    /// USING conditions into explicit equality predicates plus a collapsing projection. ON
    /// conditions and plain Cartesian products pass through.
    pub fn prepare_join_condition(
        condition: &JoinConditionType,
        left: &Schema,
        right: &Schema,
    ) -> Result<PreparedJoin, FromClauseError> {
        match *condition {
            JoinConditionType::None => Ok(PreparedJoin::default()),
            JoinConditionType::OnExpr(ref expr) => Ok(PreparedJoin {
                predicate: Some(expr.clone()),
                project_values: None,
            }),
            JoinConditionType::Using(ref names) => {
                let mut seen = std::collections::HashSet::new();
                for name in names {
                    if !seen.insert(name.clone()) {
                        return Err(FromClauseError::UsingDuplicate(name.clone()));
                    }
                }
                prepare_shared_columns(left, right, names)
            }
            JoinConditionType::Natural => {
                let mut shared: Vec<String> = Vec::new();
                for info in left.iter() {
                    if let Some(ref name) = info.name {
                        if !right.find_columns(&(None, Some(name.clone()))).is_empty()
                            && !shared.contains(name)
                        {
                            shared.push(name.clone());
                        }
                    }
                }
                if shared.is_empty() {
                    return Err(FromClauseError::NoSharedColumns);
                }
                prepare_shared_columns(left, right, &shared)
            }
        }
    }
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FromClause::BaseTable {
                ref table,
                ref alias,
            } => match *alias {
                Some(ref a) => write!(f, "{} AS {}", table, a),
                None => write!(f, "{}", table),
            },
            FromClause::SelectSubquery {
                ref select,
                ref alias,
            } => write!(f, "({}) AS {}", select, alias),
            FromClause::Join {
                ref left,
                ref right,
                join_type,
                ..
            } => write!(f, "({} {} JOIN {})", left, join_type, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::{ColumnInfo, ColumnType};

    fn schema(table: &str, cols: &[&str]) -> Schema {
        Schema::with_columns(
            cols.iter()
                .map(|c| ColumnInfo::with_table_name(ColumnType::Integer, *c, table)),
        )
        .unwrap()
    }

    #[test]
    fn test_natural_join_preparation() {
        let left = schema("r", &["id", "a"]);
        let right = schema("s", &["id", "b"]);

        let prepared =
            FromClause::prepare_join_condition(&JoinConditionType::Natural, &left, &right).unwrap();

        assert_eq!(
            prepared.predicate,
            Some(Expression::Compare(
                Box::new(Expression::ColumnValue((
                    Some("r".into()),
                    Some("id".into())
                ))),
                CompareType::Equals,
                Box::new(Expression::ColumnValue((
                    Some("s".into()),
                    Some("id".into())
                ))),
            ))
        );

        // One collapsed "id" plus the two non-shared columns.
        let values = prepared.project_values.unwrap();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_natural_join_requires_shared_columns() {
        let left = schema("r", &["a"]);
        let right = schema("s", &["b"]);
        assert_eq!(
            FromClause::prepare_join_condition(&JoinConditionType::Natural, &left, &right),
            Err(FromClauseError::NoSharedColumns)
        );
    }

    #[test]
    fn test_using_join_validation() {
        let left = schema("r", &["id", "a"]);
        let right = schema("s", &["id", "b"]);

        let dup = JoinConditionType::Using(vec!["id".into(), "id".into()]);
        assert_eq!(
            FromClause::prepare_join_condition(&dup, &left, &right),
            Err(FromClauseError::UsingDuplicate("id".into()))
        );

        let missing = JoinConditionType::Using(vec!["zzz".into()]);
        assert_eq!(
            FromClause::prepare_join_condition(&missing, &left, &right),
            Err(FromClauseError::MissingJoinColumn("zzz".into(), "left"))
        );
    }

    #[test]
    fn test_on_expr_passes_through() {
        let left = schema("r", &["a"]);
        let right = schema("s", &["b"]);
        let on = Expression::compare(
            Expression::ColumnValue((Some("r".into()), Some("a".into()))),
            CompareType::Equals,
            Expression::ColumnValue((Some("s".into()), Some("b".into()))),
        );
        let prepared = FromClause::prepare_join_condition(
            &JoinConditionType::OnExpr(on.clone()),
            &left,
            &right,
        )
        .unwrap();
        assert_eq!(prepared.predicate, Some(on));
        assert_eq!(prepared.project_values, None);
    }
}
