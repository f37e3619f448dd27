//! The query planner: rule-based plan construction with dynamic-programming left-deep join
//! enumeration and predicate push-down.
//!
//! Planning a `SELECT` proceeds in stages:
//!
//! 1. The WHERE clause is split into top-level conjuncts (OR and NOT terms stay whole), and
//!    every join condition in the FROM tree contributes its own conjuncts (NATURAL and USING
//!    conditions are first lowered to explicit equality predicates plus a collapsing
//!    projection).
//! 2. A leaf plan is built for every base table and subquery in the FROM tree; conjuncts
//!    that reference only one leaf are pushed down into it.
//! 3. Left-deep join orders are enumerated bottom-up: the best plan (by estimated CPU cost)
//!    is kept per set of joined leaves, and every still-unused conjunct whose columns are
//!    covered by a candidate join is folded into that join's predicate.
//! 4. Conjuncts that no join could absorb become a filter above the final join, and
//!    grouping/aggregation, projection and ordering nodes are layered on top.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::expressions::{
    Expression, FromClause, JoinType, SelectClause, SelectValue,
};
use crate::queries::plan_nodes::{
    extract_aggregates, AggregateCall, FileScanNode, FilterNode, GroupAggregateNode,
    NestedLoopJoinNode, PlanNode, ProjectNode, RenameNode, SortNode,
};
use crate::queries::{PlanError, PlanResult};
use crate::relations::{ColumnName, Schema};
use crate::storage::StorageManager;

/// The rule-based + cost-based query planner.
#[derive(Default)]
pub struct Planner;

/// Splits an expression into its top-level AND conjuncts, flattening nested ANDs. OR and NOT
/// expressions stay whole.
fn collect_conjuncts(expr: Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::And(terms) => {
            for term in terms {
                collect_conjuncts(term, out);
            }
        }
        other => out.push(other),
    }
}

/// ANDs a list of conjuncts back into one predicate.
fn and_together(mut conjuncts: Vec<Expression>) -> Option<Expression> {
    match conjuncts.len() {
        0 => None,
        1 => Some(conjuncts.pop().unwrap()),
        _ => Some(Expression::And(conjuncts)),
    }
}

/// Whether every symbol is resolvable against the schema.
fn symbols_covered(symbols: &HashSet<ColumnName>, schema: &Schema) -> bool {
    symbols
        .iter()
        .all(|name| !schema.find_columns(name).is_empty())
}

fn expression_symbols(expr: &Expression) -> HashSet<ColumnName> {
    let mut symbols = HashSet::new();
    expr.get_all_symbols(&mut symbols);
    symbols
}

/// Folds a predicate into a plan: file scans and filters absorb it into their own predicate;
/// anything else gets wrapped in a new filter node.
fn with_predicate(plan: PlanNode, predicate: Expression) -> PlanNode {
    match plan {
        PlanNode::FileScan(mut scan) => {
            scan.and_predicate(predicate);
            PlanNode::FileScan(scan)
        }
        PlanNode::Filter(mut filter) => {
            filter.and_predicate(predicate);
            PlanNode::Filter(filter)
        }
        other => PlanNode::Filter(FilterNode::new(other, predicate)),
    }
}

/// One entry in the dynamic-programming table: the best plan found for a set of leaves.
struct JoinComponent {
    plan: PlanNode,
    conjuncts_used: HashSet<usize>,
}

impl Planner {
    /// Creates a planner.
    pub fn new() -> Planner {
        Planner
    }

    /// Builds and prepares an execution plan for the given `SELECT` clause.
    pub fn make_plan(
        &self,
        storage: &mut StorageManager,
        clause: SelectClause,
    ) -> PlanResult<PlanNode> {
        let SelectClause {
            from_clause,
            where_expr,
            mut values,
            group_by_exprs,
            mut having,
            order_by_exprs,
        } = clause;

        let trivial_project = values.len() == 1
            && values[0] == SelectValue::WildcardColumn { table: None };

        let from = match from_clause {
            Some(from) => from,
            None => {
                // A table-less select evaluates its expressions once.
                if where_expr.is_some() {
                    return Err(PlanError::Unsupported(
                        "WHERE clause without a FROM clause".to_string(),
                    ));
                }
                let mut plan = PlanNode::Project(ProjectNode::scalar(values));
                plan.prepare(storage)?;
                return Ok(plan);
            }
        };

        if let Some(ref w) = where_expr {
            if w.contains_aggregate() {
                return Err(PlanError::Unsupported(
                    "aggregate calls in the WHERE clause".to_string(),
                ));
            }
        }
        for expr in &group_by_exprs {
            if expr.contains_aggregate() {
                return Err(PlanError::Unsupported(
                    "aggregate calls in GROUP BY expressions".to_string(),
                ));
            }
        }

        // Stage 1: gather the conjunct pool from the WHERE clause and the FROM tree's join
        // conditions, and build the prepared leaf plans.
        let mut pool: Vec<Expression> = Vec::new();
        if let Some(w) = where_expr {
            collect_conjuncts(w.normalize(), &mut pool);
        }

        let mut leaves: Vec<PlanNode> = Vec::new();
        let mut collapse_projects: Vec<Vec<SelectValue>> = Vec::new();
        {
            let mut join_preds: Vec<Expression> = Vec::new();
            self.collect_from_tree(
                storage,
                &from,
                &mut leaves,
                &mut join_preds,
                &mut collapse_projects,
            )?;
            for pred in join_preds {
                collect_conjuncts(pred.normalize(), &mut pool);
            }
        }

        let num_leaves = leaves.len();
        if num_leaves > 64 {
            return Err(PlanError::Unsupported(
                "more than 64 FROM-clause entries".to_string(),
            ));
        }

        let pool_symbols: Vec<HashSet<ColumnName>> =
            pool.iter().map(expression_symbols).collect();
        let mut used: Vec<bool> = vec![false; pool.len()];

        // Stage 2: push single-leaf conjuncts into their leaf plans.
        for (ci, conjunct) in pool.iter().enumerate() {
            for leaf in leaves.iter_mut() {
                if symbols_covered(&pool_symbols[ci], leaf.get_schema()) {
                    debug!("Pushing conjunct into leaf: {}", conjunct);
                    let plan = std::mem::replace(
                        leaf,
                        PlanNode::FileScan(FileScanNode::new("", None)),
                    );
                    *leaf = with_predicate(plan, conjunct.clone());
                    leaf.prepare(storage)?;
                    used[ci] = true;
                    break;
                }
            }
        }

        // Stage 3: enumerate left-deep join orders, keeping the best plan per leaf set.
        let mut plan = if num_leaves == 1 {
            leaves.pop().unwrap()
        } else {
            let final_component =
                self.enumerate_joins(storage, &leaves, &pool, &pool_symbols, &used)?;
            for ci in &final_component.conjuncts_used {
                used[*ci] = true;
            }
            final_component.plan
        };

        // Stage 4: any conjunct no join could absorb goes above the final join.
        let residual: Vec<Expression> = pool
            .iter()
            .zip(used.iter())
            .filter(|(_, used)| !**used)
            .map(|(c, _)| c.clone())
            .collect();
        if let Some(predicate) = and_together(residual) {
            debug!("Residual predicate above join tree: {}", predicate);
            plan = with_predicate(plan, predicate);
            plan.prepare(storage)?;
        }

        // NATURAL/USING joins project their shared columns down to a single copy.
        for values in collapse_projects {
            plan = PlanNode::Project(ProjectNode::new(plan, values));
            plan.prepare(storage)?;
        }

        // Stage 5: grouping and aggregation.
        let mut aggregates: Vec<AggregateCall> = Vec::new();
        for value in values.iter_mut() {
            if let SelectValue::Expression {
                ref mut expression, ..
            } = *value
            {
                extract_aggregates(expression, &mut aggregates)?;
            }
        }
        if let Some(ref mut having_expr) = having {
            extract_aggregates(having_expr, &mut aggregates)?;
        }

        if !group_by_exprs.is_empty() || !aggregates.is_empty() {
            for value in &values {
                match *value {
                    SelectValue::Expression { .. } => {}
                    SelectValue::WildcardColumn { .. } => {
                        return Err(PlanError::Unsupported(
                            "wildcards in a grouped or aggregated SELECT list".to_string(),
                        ));
                    }
                    SelectValue::ScalarSubquery(_) => {
                        return Err(PlanError::Unsupported(
                            "scalar subqueries in the SELECT list".to_string(),
                        ));
                    }
                }
            }

            plan = PlanNode::GroupAggregate(GroupAggregateNode::new(
                plan,
                group_by_exprs,
                aggregates,
            ));
            plan.prepare(storage)?;

            if let Some(having_expr) = having {
                plan = PlanNode::Filter(FilterNode::new(plan, having_expr));
                plan.prepare(storage)?;
            }
        } else if having.is_some() {
            return Err(PlanError::Unsupported(
                "HAVING without GROUP BY or aggregates".to_string(),
            ));
        }

        // Stage 6: projection.
        if !trivial_project {
            plan = PlanNode::Project(ProjectNode::new(plan, values));
            plan.prepare(storage)?;
        }

        // Stage 7: ordering.
        if !order_by_exprs.is_empty() {
            plan = PlanNode::Sort(SortNode::new(plan, order_by_exprs));
            plan.prepare(storage)?;
        }

        plan.prepare(storage)?;
        Ok(plan)
    }

    /// Recursively builds prepared leaf plans for a FROM subtree, collecting join predicates
    /// and NATURAL/USING collapse projections along the way. Returns the subtree's leaf index
    /// range.
    fn collect_from_tree(
        &self,
        storage: &mut StorageManager,
        from: &FromClause,
        leaves: &mut Vec<PlanNode>,
        join_preds: &mut Vec<Expression>,
        collapse_projects: &mut Vec<Vec<SelectValue>>,
    ) -> PlanResult<(usize, usize)> {
        match *from {
            FromClause::BaseTable {
                ref table,
                ref alias,
            } => {
                let mut plan = PlanNode::FileScan(FileScanNode::new(table, None));
                if let Some(ref alias) = *alias {
                    plan = PlanNode::Rename(RenameNode::new(plan, alias));
                }
                plan.prepare(storage)?;
                leaves.push(plan);
                Ok((leaves.len() - 1, leaves.len()))
            }
            FromClause::SelectSubquery {
                ref select,
                ref alias,
            } => {
                let subplan = self.make_plan(storage, (**select).clone())?;
                let mut plan = PlanNode::Rename(RenameNode::new(subplan, alias));
                plan.prepare(storage)?;
                leaves.push(plan);
                Ok((leaves.len() - 1, leaves.len()))
            }
            FromClause::Join {
                ref left,
                ref right,
                join_type,
                ref condition,
            } => {
                match join_type {
                    JoinType::Inner | JoinType::Cross => {}
                    other => {
                        return Err(PlanError::Unsupported(format!("{} joins", other)));
                    }
                }

                let (ls, le) = self.collect_from_tree(
                    storage,
                    left,
                    leaves,
                    join_preds,
                    collapse_projects,
                )?;
                let (_, re) = self.collect_from_tree(
                    storage,
                    right,
                    leaves,
                    join_preds,
                    collapse_projects,
                )?;

                let mut left_schema = Schema::new();
                for leaf in &leaves[ls..le] {
                    for info in leaf.get_schema().iter() {
                        left_schema.add_column(info.clone())?;
                    }
                }
                let mut right_schema = Schema::new();
                for leaf in &leaves[le..re] {
                    for info in leaf.get_schema().iter() {
                        right_schema.add_column(info.clone())?;
                    }
                }

                let prepared =
                    FromClause::prepare_join_condition(condition, &left_schema, &right_schema)?;
                if let Some(predicate) = prepared.predicate {
                    join_preds.push(predicate);
                }
                if let Some(project_values) = prepared.project_values {
                    collapse_projects.push(project_values);
                }
                Ok((ls, re))
            }
        }
    }

    /// The dynamic-programming left-deep join search. Components are keyed by the bitmask of
    /// leaves they join; each round extends every component by one unused leaf, keeping the
    /// cheapest (by CPU cost) plan per leaf set.
    fn enumerate_joins(
        &self,
        storage: &mut StorageManager,
        leaves: &[PlanNode],
        pool: &[Expression],
        pool_symbols: &[HashSet<ColumnName>],
        already_used: &[bool],
    ) -> PlanResult<JoinComponent> {
        let num_leaves = leaves.len();
        let full_mask: u64 = if num_leaves == 64 {
            u64::MAX
        } else {
            (1u64 << num_leaves) - 1
        };

        let mut components: HashMap<u64, JoinComponent> = HashMap::new();
        for (i, leaf) in leaves.iter().enumerate() {
            components.insert(
                1u64 << i,
                JoinComponent {
                    plan: leaf.clone(),
                    conjuncts_used: HashSet::new(),
                },
            );
        }

        for _round in 2..=num_leaves {
            let mut next: HashMap<u64, JoinComponent> = HashMap::new();

            let keys: Vec<u64> = components.keys().cloned().collect();
            for mask in keys {
                for (leaf_idx, leaf) in leaves.iter().enumerate() {
                    let bit = 1u64 << leaf_idx;
                    if mask & bit != 0 {
                        continue;
                    }
                    let component = &components[&mask];

                    // Find every unused conjunct the combined schema can evaluate.
                    let mut combined_schema = Schema::new();
                    for info in component.plan.get_schema().iter() {
                        combined_schema.add_column(info.clone())?;
                    }
                    for info in leaf.get_schema().iter() {
                        combined_schema.add_column(info.clone())?;
                    }

                    let mut usable: Vec<usize> = Vec::new();
                    for (ci, _) in pool.iter().enumerate() {
                        if already_used[ci] || component.conjuncts_used.contains(&ci) {
                            continue;
                        }
                        if symbols_covered(&pool_symbols[ci], &combined_schema) {
                            usable.push(ci);
                        }
                    }
                    let predicate =
                        and_together(usable.iter().map(|&ci| pool[ci].clone()).collect());

                    let mut plan = PlanNode::NestedLoopJoin(NestedLoopJoinNode::new(
                        component.plan.clone(),
                        leaf.clone(),
                        JoinType::Inner,
                        predicate,
                    ));
                    plan.prepare(storage)?;
                    let cpu_cost = plan
                        .get_cost()
                        .ok_or(PlanError::NodeNotPrepared)?
                        .cpu_cost;

                    let mut conjuncts_used = component.conjuncts_used.clone();
                    conjuncts_used.extend(usable);

                    let key = mask | bit;
                    let better = match next.get(&key) {
                        Some(existing) => {
                            let existing_cost = existing
                                .plan
                                .get_cost()
                                .ok_or(PlanError::NodeNotPrepared)?
                                .cpu_cost;
                            cpu_cost < existing_cost
                        }
                        None => true,
                    };
                    if better {
                        next.insert(
                            key,
                            JoinComponent {
                                plan,
                                conjuncts_used,
                            },
                        );
                    }
                }
            }

            components = next;
        }

        let final_component = components
            .remove(&full_mask)
            .ok_or(PlanError::NodeNotPrepared)?;
        info!(
            "Join enumeration chose plan with cost {:?}.",
            final_component.plan.get_cost()
        );
        Ok(final_component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    use crate::expressions::{CompareType, Literal};
    use crate::relations::{ColumnInfo, ColumnType, TableSchema};
    use crate::storage::buffer_manager::{BufferManager, DEFAULT_PAGECACHE_SIZE};
    use crate::storage::{FileManager, TupleLiteral};

    fn test_storage(dir: &TempDir) -> StorageManager {
        StorageManager::new(
            FileManager::with_directory(dir.path()).unwrap(),
            BufferManager::new(DEFAULT_PAGECACHE_SIZE),
            None,
            512,
        )
    }

    fn make_int_table(storage: &mut StorageManager, name: &str, col: &str, values: &[i32]) {
        let schema = TableSchema::from_schema(
            Schema::with_columns(vec![ColumnInfo::with_table_name(
                ColumnType::Integer,
                col,
                name,
            )])
            .unwrap(),
        );
        storage.create_table(name, schema).unwrap();
        for &v in values {
            storage
                .add_tuple(name, &TupleLiteral::from_values(vec![Literal::Int(v)]))
                .unwrap();
        }
        storage.analyze_table(name).unwrap();
    }

    fn qualified(table: &str, col: &str) -> Expression {
        Expression::ColumnValue((Some(table.into()), Some(col.into())))
    }

    fn pull_all(
        storage: &mut StorageManager,
        plan: &mut PlanNode,
    ) -> Vec<Vec<Literal>> {
        plan.initialize(storage).unwrap();
        let mut rows = Vec::new();
        while let Some(tuple) = plan.get_next_tuple(storage).unwrap() {
            rows.push(tuple.values().to_vec());
        }
        rows
    }

    #[test]
    fn test_predicate_pushed_into_scan() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "t", "a", &[1, 2, 3]);

        let mut clause = SelectClause::select_all(FromClause::base_table("t"));
        clause.where_expr = Some(Expression::compare(
            Expression::ColumnValue((None, Some("a".into()))),
            CompareType::GreaterThan,
            Literal::Int(1),
        ));

        let mut plan = Planner::new().make_plan(&mut storage, clause).unwrap();

        // The conjunct landed inside the file scan, not in a separate filter.
        match plan {
            PlanNode::FileScan(ref scan) => {
                assert!(scan.predicate().is_some());
            }
            _ => panic!("expected a bare file scan"),
        }

        let rows = pull_all(&mut storage, &mut plan);
        assert_eq!(rows, vec![vec![Literal::Int(2)], vec![Literal::Int(3)]]);
    }

    #[test]
    fn test_join_ordering_puts_small_tables_first() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);

        let big_values: Vec<i32> = (0..300).collect();
        make_int_table(&mut storage, "big", "v", &big_values);
        make_int_table(&mut storage, "s1", "x", &(0..10).collect::<Vec<_>>());
        make_int_table(&mut storage, "s2", "y", &(0..10).collect::<Vec<_>>());

        // FROM big, s1, s2 WHERE s1.x = s2.y; the predicate links only the small tables.
        let from = FromClause::join(
            FromClause::join(
                FromClause::base_table("big"),
                FromClause::base_table("s1"),
                crate::expressions::JoinType::Cross,
                crate::expressions::JoinConditionType::None,
            ),
            FromClause::base_table("s2"),
            crate::expressions::JoinType::Cross,
            crate::expressions::JoinConditionType::None,
        );
        let mut clause = SelectClause::select_all(from);
        clause.where_expr = Some(Expression::compare(
            qualified("s1", "x"),
            CompareType::Equals,
            qualified("s2", "y"),
        ));

        let plan = Planner::new().make_plan(&mut storage, clause).unwrap();

        // The chosen plan must join the two small tables first, leaving the big table as the
        // final (inner) leaf.
        let top = match plan {
            PlanNode::NestedLoopJoin(ref join) => join,
            ref other => panic!(
                "expected a join at the top, got {}",
                match other {
                    PlanNode::FileScan(_) => "file scan",
                    PlanNode::Filter(_) => "filter",
                    _ => "other node",
                }
            ),
        };

        match top.right() {
            PlanNode::FileScan(scan) => assert_eq!(scan.table_name(), "big"),
            _ => panic!("expected the big table as the final leaf"),
        }
        match top.left() {
            PlanNode::NestedLoopJoin(inner) => {
                let mut names = Vec::new();
                for side in [inner.left(), inner.right()] {
                    match side {
                        PlanNode::FileScan(scan) => names.push(scan.table_name().to_string()),
                        _ => panic!("expected file scans under the inner join"),
                    }
                }
                names.sort();
                assert_eq!(names, vec!["s1", "s2"]);
                // The join predicate was absorbed into the small-table join.
                assert!(inner.predicate().is_some());
            }
            _ => panic!("expected the small tables joined together first"),
        }
    }

    #[test]
    fn test_residual_predicate_above_join() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "r", "x", &[1, 2, 3]);
        make_int_table(&mut storage, "s", "y", &[2, 3, 4]);

        let from = FromClause::join(
            FromClause::base_table("r"),
            FromClause::base_table("s"),
            crate::expressions::JoinType::Cross,
            crate::expressions::JoinConditionType::None,
        );
        let mut clause = SelectClause::select_all(from);
        // An OR conjunct spanning both tables can't be pushed to either leaf, but the join
        // absorbs it.
        clause.where_expr = Some(Expression::Or(vec![
            Expression::compare(qualified("r", "x"), CompareType::Equals, qualified("s", "y")),
            Expression::compare(qualified("r", "x"), CompareType::Equals, Literal::Int(1)),
        ]));

        let mut plan = Planner::new().make_plan(&mut storage, clause).unwrap();
        let mut rows = pull_all(&mut storage, &mut plan);
        rows.sort_by_key(|row| {
            (
                row[0].to_long().unwrap_or(0),
                row[1].to_long().unwrap_or(0),
            )
        });

        // x=1 pairs with every y (3 rows), plus the matching pairs (2,2) and (3,3).
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(1), Literal::Int(2)],
                vec![Literal::Int(1), Literal::Int(3)],
                vec![Literal::Int(1), Literal::Int(4)],
                vec![Literal::Int(2), Literal::Int(2)],
                vec![Literal::Int(3), Literal::Int(3)],
            ]
        );
    }

    #[test]
    fn test_subquery_in_from() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "t", "a", &[1, 2, 3, 4]);

        // SELECT * FROM (SELECT a FROM t WHERE a > 2) AS sub
        let mut inner = SelectClause::new(
            FromClause::base_table("t"),
            vec![SelectValue::Expression {
                expression: Expression::ColumnValue((None, Some("a".into()))),
                alias: None,
            }],
        );
        inner.where_expr = Some(Expression::compare(
            Expression::ColumnValue((None, Some("a".into()))),
            CompareType::GreaterThan,
            Literal::Int(2),
        ));

        let clause = SelectClause::select_all(FromClause::SelectSubquery {
            select: Box::new(inner),
            alias: "sub".into(),
        });

        let mut plan = Planner::new().make_plan(&mut storage, clause).unwrap();
        assert_eq!(
            plan.get_schema()[0].table_name.as_deref(),
            Some("sub")
        );
        let rows = pull_all(&mut storage, &mut plan);
        assert_eq!(rows, vec![vec![Literal::Int(3)], vec![Literal::Int(4)]]);
    }

    #[test]
    fn test_unsupported_join_types_rejected() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "r", "x", &[1]);
        make_int_table(&mut storage, "s", "y", &[1]);

        let from = FromClause::join(
            FromClause::base_table("r"),
            FromClause::base_table("s"),
            crate::expressions::JoinType::LeftOuter,
            crate::expressions::JoinConditionType::None,
        );
        let clause = SelectClause::select_all(from);
        assert!(matches!(
            Planner::new().make_plan(&mut storage, clause),
            Err(PlanError::Unsupported(_))
        ));
    }

    #[test]
    fn test_grouped_wildcard_rejected() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "t", "a", &[1, 2]);

        let mut clause = SelectClause::select_all(FromClause::base_table("t"));
        clause.group_by_exprs = vec![Expression::ColumnValue((None, Some("a".into())))];
        assert!(matches!(
            Planner::new().make_plan(&mut storage, clause),
            Err(PlanError::Unsupported(_))
        ));
    }

    #[test]
    fn test_conjunct_accounting_is_complete() {
        let dir = TempDir::new("test_planner").unwrap();
        let mut storage = test_storage(&dir);
        make_int_table(&mut storage, "r", "x", &[1, 2, 3]);
        make_int_table(&mut storage, "s", "y", &[2, 3, 4]);

        let from = FromClause::join(
            FromClause::base_table("r"),
            FromClause::base_table("s"),
            crate::expressions::JoinType::Cross,
            crate::expressions::JoinConditionType::None,
        );
        let mut clause = SelectClause::select_all(from);
        // Three conjuncts: one per-leaf, one join, one residual-ish (also join-capable).
        clause.where_expr = Some(Expression::And(vec![
            Expression::compare(qualified("r", "x"), CompareType::GreaterThan, Literal::Int(0)),
            Expression::compare(qualified("r", "x"), CompareType::Equals, qualified("s", "y")),
            Expression::compare(qualified("s", "y"), CompareType::LessThan, Literal::Int(4)),
        ]));

        let mut plan = Planner::new().make_plan(&mut storage, clause).unwrap();
        let mut rows = pull_all(&mut storage, &mut plan);
        rows.sort_by_key(|row| row[0].to_long().unwrap_or(0));

        // Every conjunct was applied somewhere: only (2,2) and (3,3) survive.
        assert_eq!(
            rows,
            vec![
                vec![Literal::Int(2), Literal::Int(2)],
                vec![Literal::Int(3), Literal::Int(3)],
            ]
        );
    }
}
