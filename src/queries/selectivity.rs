//! Selectivity estimation for predicates, driving the planner's cost estimates.
//!
//! Comparisons are assumed to be in normalized column-on-the-left form (see
//! [`Expression::normalize`]); estimates degrade to a default when statistics are missing.

use crate::expressions::{CompareType, Expression, Literal};
use crate::relations::{ColumnName, Schema};
use crate::storage::table_manager::ColumnStats;

/// The selectivity assumed for predicates we cannot estimate.
pub const DEFAULT_SELECTIVITY: f32 = 0.25;

fn clamp(sel: f32) -> f32 {
    sel.clamp(0.0, 1.0)
}

fn find_column_stats<'a>(
    name: &ColumnName,
    schema: &Schema,
    stats: &'a [ColumnStats],
) -> Option<&'a ColumnStats> {
    let (idx, _) = schema.find_column(name).ok()?;
    stats.get(idx)
}

fn equality_selectivity(stats: Option<&ColumnStats>) -> f32 {
    match stats.and_then(|s| s.num_distinct) {
        Some(distinct) if distinct > 0 => 1.0 / distinct as f32,
        _ => DEFAULT_SELECTIVITY,
    }
}

/// Estimates the fraction of a column's value range lying below (or above) a literal, using
/// the column's min/max statistics. Only numeric ranges are estimated.
fn range_selectivity(
    op: CompareType,
    stats: Option<&ColumnStats>,
    value: &Literal,
) -> f32 {
    let stats = match stats {
        Some(s) => s,
        None => return DEFAULT_SELECTIVITY,
    };
    let (min, max) = match (&stats.min_value, &stats.max_value) {
        (Some(min), Some(max)) => (min, max),
        _ => return DEFAULT_SELECTIVITY,
    };
    let (min, max, value) = match (min.to_double(), max.to_double(), value.to_double()) {
        (Some(min), Some(max), Some(value)) => (min, max, value),
        _ => return DEFAULT_SELECTIVITY,
    };
    if max <= min {
        return DEFAULT_SELECTIVITY;
    }

    let below = clamp(((value - min) / (max - min)) as f32);
    match op {
        CompareType::LessThan | CompareType::LessThanEqual => below,
        CompareType::GreaterThan | CompareType::GreaterThanEqual => 1.0 - below,
        _ => DEFAULT_SELECTIVITY,
    }
}

fn compare_selectivity(
    left: &Expression,
    op: CompareType,
    right: &Expression,
    schema: &Schema,
    stats: &[ColumnStats],
) -> f32 {
    match (left, right) {
        // column OP literal, the normalized form.
        (&Expression::ColumnValue(ref name), &Expression::Literal(ref value)) => {
            let col_stats = find_column_stats(name, schema, stats);
            match op {
                CompareType::Equals => equality_selectivity(col_stats),
                CompareType::NotEquals => 1.0 - equality_selectivity(col_stats),
                _ => range_selectivity(op, col_stats, value),
            }
        }
        // column OP column, an equijoin-style comparison.
        (&Expression::ColumnValue(ref left_name), &Expression::ColumnValue(ref right_name)) => {
            match op {
                CompareType::Equals => {
                    let left_distinct = find_column_stats(left_name, schema, stats)
                        .and_then(|s| s.num_distinct)
                        .unwrap_or(0);
                    let right_distinct = find_column_stats(right_name, schema, stats)
                        .and_then(|s| s.num_distinct)
                        .unwrap_or(0);
                    let max_distinct = left_distinct.max(right_distinct);
                    if max_distinct > 0 {
                        1.0 / max_distinct as f32
                    } else {
                        DEFAULT_SELECTIVITY
                    }
                }
                _ => DEFAULT_SELECTIVITY,
            }
        }
        _ => DEFAULT_SELECTIVITY,
    }
}

/// Estimates the fraction of input rows satisfying the given predicate, in [0, 1].
pub fn estimate_selectivity(expr: &Expression, schema: &Schema, stats: &[ColumnStats]) -> f32 {
    let sel = match *expr {
        Expression::And(ref terms) => terms
            .iter()
            .map(|t| estimate_selectivity(t, schema, stats))
            .product(),
        Expression::Or(ref terms) => {
            1.0 - terms
                .iter()
                .map(|t| 1.0 - estimate_selectivity(t, schema, stats))
                .product::<f32>()
        }
        Expression::Not(ref inner) => 1.0 - estimate_selectivity(inner, schema, stats),
        Expression::Compare(ref left, op, ref right) => {
            compare_selectivity(left, op, right, schema, stats)
        }
        Expression::Literal(Literal::True) => 1.0,
        Expression::Literal(Literal::False) => 0.0,
        _ => DEFAULT_SELECTIVITY,
    };
    clamp(sel)
}
