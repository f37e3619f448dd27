//! The nested-loops join node: supports arbitrary join conditions, at quadratic cost.

use crate::expressions::{Environment, Expression, JoinType};
use crate::queries::plan_nodes::PlanNode;
use crate::queries::selectivity::estimate_selectivity;
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// A theta join computed with nested loops. Only `INNER` and `CROSS` joins are supported; a
/// NULL predicate produces the Cartesian product. The output schema is the left child's
/// schema followed by the right child's; children are handed to the node in the desired
/// output order.
#[derive(Clone)]
pub struct NestedLoopJoinNode {
    left: Box<PlanNode>,
    right: Box<PlanNode>,
    join_type: JoinType,
    predicate: Option<Expression>,
    schema: Schema,
    stats: Vec<ColumnStats>,
    cost: Option<PlanCost>,
    left_tuple: Option<TupleLiteral>,
    done: bool,
}

impl NestedLoopJoinNode {
    /// Creates a nested-loops join of the two children.
    pub fn new(
        left: PlanNode,
        right: PlanNode,
        join_type: JoinType,
        predicate: Option<Expression>,
    ) -> NestedLoopJoinNode {
        NestedLoopJoinNode {
            left: Box::new(left),
            right: Box::new(right),
            join_type,
            predicate,
            schema: Schema::new(),
            stats: vec![],
            cost: None,
            left_tuple: None,
            done: false,
        }
    }

    /// The join predicate, if any.
    pub fn predicate(&self) -> Option<&Expression> {
        self.predicate.as_ref()
    }

    /// The left (outer) child.
    pub fn left(&self) -> &PlanNode {
        &self.left
    }

    /// The right (inner) child.
    pub fn right(&self) -> &PlanNode {
        &self.right
    }

    /// ANDs another conjunct into the join predicate.
    pub fn and_predicate(&mut self, conjunct: Expression) {
        match self.predicate.take() {
            Some(mut existing) => {
                existing.add_term(conjunct);
                self.predicate = Some(existing);
            }
            None => self.predicate = Some(conjunct),
        }
        self.cost = None;
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }

        match self.join_type {
            JoinType::Inner | JoinType::Cross => {}
            other => {
                return Err(PlanError::Unsupported(format!("{} joins", other)));
            }
        }

        self.left.prepare(storage)?;
        self.right.prepare(storage)?;

        let mut schema = Schema::new();
        for info in self.left.get_schema().iter() {
            schema.add_column(info.clone())?;
        }
        for info in self.right.get_schema().iter() {
            schema.add_column(info.clone())?;
        }

        let mut stats: Vec<ColumnStats> = self.left.get_stats().to_vec();
        stats.extend_from_slice(self.right.get_stats());

        let left_cost = self.left.get_cost().ok_or(PlanError::NodeNotPrepared)?;
        let right_cost = self.right.get_cost().ok_or(PlanError::NodeNotPrepared)?;

        let selectivity = match self.predicate {
            Some(ref predicate) => estimate_selectivity(predicate, &schema, &stats),
            None => 1.0,
        };

        // The inner plan runs once per outer tuple.
        self.cost = Some(PlanCost {
            num_tuples: left_cost.num_tuples * right_cost.num_tuples * selectivity,
            tuple_size: left_cost.tuple_size + right_cost.tuple_size,
            cpu_cost: left_cost.cpu_cost + left_cost.num_tuples * right_cost.cpu_cost,
            num_block_ios: left_cost.num_block_ios
                + (left_cost.num_tuples.ceil() as u64) * right_cost.num_block_ios,
        });
        self.schema = schema;
        self.stats = stats;
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize).
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.left_tuple = None;
        self.done = false;
        self.left.initialize(storage)?;
        self.right.initialize(storage)
    }

    fn can_join(&self, left: &TupleLiteral, right: &TupleLiteral) -> PlanResult<bool> {
        let predicate = match self.predicate {
            Some(ref p) => p,
            None => return Ok(true),
        };
        let mut env = Environment::new();
        env.add_tuple(self.left.get_schema().clone(), left.clone());
        env.add_tuple(self.right.get_schema().clone(), right.clone());
        predicate.evaluate_predicate(Some(&env)).map_err(Into::into)
    }

    /// See [`PlanNode::get_next_tuple`](super::PlanNode::get_next_tuple).
    pub fn get_next_tuple(
        &mut self,
        storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        if self.done {
            return Ok(None);
        }

        loop {
            if self.left_tuple.is_none() {
                match self.left.get_next_tuple(storage)? {
                    Some(tuple) => {
                        self.left_tuple = Some(tuple);
                        self.right.initialize(storage)?;
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            }

            match self.right.get_next_tuple(storage)? {
                Some(right_tuple) => {
                    let left_tuple = self.left_tuple.clone().unwrap();
                    if self.can_join(&left_tuple, &right_tuple)? {
                        let mut joined = TupleLiteral::new();
                        joined.append_tuple_with_schema(&left_tuple, self.left.get_schema())?;
                        joined.append_tuple_with_schema(&right_tuple, self.right.get_schema())?;
                        return Ok(Some(joined));
                    }
                }
                None => {
                    // The inner input is exhausted; advance the outer input.
                    self.left_tuple = None;
                }
            }
        }
    }

    /// Returns the joined schema.
    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the node's cost, once prepared.
    pub fn get_cost(&self) -> Option<PlanCost> {
        self.cost
    }

    /// Returns the node's output column statistics.
    pub fn get_stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up).
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        self.left_tuple = None;
        self.done = false;
        self.left.clean_up(storage)?;
        self.right.clean_up(storage)
    }
}
