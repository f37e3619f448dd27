//! The simple filter node: applies a predicate over any child.

use crate::expressions::Expression;
use crate::queries::plan_nodes::{tuple_env, PlanNode};
use crate::queries::selectivity::estimate_selectivity;
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// Passes through the child's tuples that satisfy the predicate. The output schema is the
/// child's schema, untouched.
#[derive(Clone)]
pub struct FilterNode {
    child: Box<PlanNode>,
    predicate: Expression,
    cost: Option<PlanCost>,
    done: bool,
}

impl FilterNode {
    /// Creates a filter over the child.
    pub fn new(child: PlanNode, predicate: Expression) -> FilterNode {
        FilterNode {
            child: Box::new(child),
            predicate,
            cost: None,
            done: false,
        }
    }

    /// The filter's predicate.
    pub fn predicate(&self) -> &Expression {
        &self.predicate
    }

    /// ANDs another conjunct into the filter's predicate.
    pub fn and_predicate(&mut self, conjunct: Expression) {
        self.predicate.add_term(conjunct);
        self.cost = None;
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }
        self.child.prepare(storage)?;

        let child_cost = self.child.get_cost().ok_or(PlanError::NodeNotPrepared)?;
        let selectivity =
            estimate_selectivity(&self.predicate, self.child.get_schema(), self.child.get_stats());

        // The predicate is evaluated once per input tuple; block I/O is unchanged.
        self.cost = Some(PlanCost {
            num_tuples: child_cost.num_tuples * selectivity,
            tuple_size: child_cost.tuple_size,
            cpu_cost: child_cost.cpu_cost + child_cost.num_tuples,
            num_block_ios: child_cost.num_block_ios,
        });
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize).
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        self.done = false;
        self.child.initialize(storage)
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
            let tuple = match self.child.get_next_tuple(storage)? {
                Some(t) => t,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            };
            let env = tuple_env(self.child.get_schema(), &tuple);
            if self.predicate.evaluate_predicate(Some(&env))? {
                return Ok(Some(tuple));
            }
        }
    }

    /// Returns the node's schema (the child's).
    pub fn get_schema(&self) -> &Schema {
        self.child.get_schema()
    }

    /// Returns the node's cost, once prepared.
    pub fn get_cost(&self) -> Option<PlanCost> {
        self.cost
    }

    /// Returns the node's output column statistics (the child's).
    pub fn get_stats(&self) -> &[ColumnStats] {
        self.child.get_stats()
    }

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up).
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        self.done = false;
        self.child.clean_up(storage)
    }
}
