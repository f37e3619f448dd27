//! The in-memory sort node.

use std::cmp::Ordering;

use crate::expressions::{Literal, OrderByExpression};
use crate::queries::plan_nodes::{tuple_env, PlanNode};
use crate::queries::{PlanCost, PlanError, PlanResult};
use crate::relations::Schema;
use crate::storage::table_manager::ColumnStats;
use crate::storage::{StorageManager, TupleLiteral};

/// Sorts the entire child stream in memory by a list of order-by terms, tie-broken left to
/// right. The sort is stable, so equal rows keep their input order. NULLs order before
/// non-NULL values.
#[derive(Clone)]
pub struct SortNode {
    child: Box<PlanNode>,
    order_by: Vec<OrderByExpression>,
    buffer: Vec<TupleLiteral>,
    position: usize,
    loaded: bool,
    cost: Option<PlanCost>,
    mark: Option<usize>,
}

/// Compares two literals for sorting: NULL orders first, and incomparable value pairs are
/// treated as equal so the sort stays total.
fn sort_compare(a: &Literal, b: &Literal) -> Ordering {
    match (a, b) {
        (&Literal::Null, &Literal::Null) => Ordering::Equal,
        (&Literal::Null, _) => Ordering::Less,
        (_, &Literal::Null) => Ordering::Greater,
        _ => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

impl SortNode {
    /// Creates a sort of the child by the given terms.
    pub fn new(child: PlanNode, order_by: Vec<OrderByExpression>) -> SortNode {
        SortNode {
            child: Box::new(child),
            order_by,
            buffer: vec![],
            position: 0,
            loaded: false,
            cost: None,
            mark: None,
        }
    }

    /// The ordering this node guarantees on its output.
    pub fn order_by(&self) -> &[OrderByExpression] {
        &self.order_by
    }

    /// See [`PlanNode::prepare`](super::PlanNode::prepare).
    pub fn prepare(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_some() {
            return Ok(());
        }
        self.child.prepare(storage)?;

        let child_cost = self.child.get_cost().ok_or(PlanError::NodeNotPrepared)?;
        let n = child_cost.num_tuples.max(1.0);
        // O(n log n) comparisons; no extra I/O for the in-memory design.
        self.cost = Some(PlanCost {
            num_tuples: child_cost.num_tuples,
            tuple_size: child_cost.tuple_size,
            cpu_cost: child_cost.cpu_cost + n * n.log2(),
            num_block_ios: child_cost.num_block_ios,
        });
        Ok(())
    }

    /// See [`PlanNode::initialize`](super::PlanNode::initialize). Pulls and sorts the entire
    /// child stream.
    pub fn initialize(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }

        self.child.initialize(storage)?;

        // Decorate each tuple with its evaluated sort keys, sort, undecorate.
        let child_schema = self.child.get_schema().clone();
        let mut decorated: Vec<(Vec<Literal>, TupleLiteral)> = Vec::new();
        while let Some(tuple) = self.child.get_next_tuple(storage)? {
            let env = tuple_env(&child_schema, &tuple);
            let mut keys = Vec::with_capacity(self.order_by.len());
            for term in &self.order_by {
                keys.push(term.expression.evaluate(Some(&env))?);
            }
            decorated.push((keys, tuple));
        }

        let order_by = self.order_by.clone();
        // Vec::sort_by is stable, so ties keep their input order.
        decorated.sort_by(|(a_keys, _), (b_keys, _)| {
            for (i, term) in order_by.iter().enumerate() {
                let mut ordering = sort_compare(&a_keys[i], &b_keys[i]);
                if !term.ascending {
                    ordering = ordering.reverse();
                }
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        self.buffer = decorated.into_iter().map(|(_, tuple)| tuple).collect();
        self.position = 0;
        self.loaded = true;
        self.mark = None;
        Ok(())
    }

    /// See [`PlanNode::get_next_tuple`](super::PlanNode::get_next_tuple).
    pub fn get_next_tuple(
        &mut self,
        _storage: &mut StorageManager,
    ) -> PlanResult<Option<TupleLiteral>> {
        if self.cost.is_none() {
            return Err(PlanError::NodeNotPrepared);
        }
        if !self.loaded {
            return Err(PlanError::NodeNotPrepared);
        }

        match self.buffer.get(self.position) {
            Some(tuple) => {
                self.position += 1;
                Ok(Some(tuple.clone()))
            }
            None => Ok(None),
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

    /// Remembers the current output position.
    pub fn mark_current_position(&mut self) -> PlanResult<()> {
        self.mark = Some(self.position);
        Ok(())
    }

    /// Rewinds the output to the last mark.
    pub fn reset_to_last_mark(&mut self) -> PlanResult<()> {
        match self.mark {
            Some(position) => {
                self.position = position;
                Ok(())
            }
            None => Err(PlanError::NoMarkSet),
        }
    }

    /// See [`PlanNode::clean_up`](super::PlanNode::clean_up). Releases the sort buffer.
    pub fn clean_up(&mut self, storage: &mut StorageManager) -> PlanResult<()> {
        self.buffer = vec![];
        self.position = 0;
        self.loaded = false;
        self.mark = None;
        self.child.clean_up(storage)
    }
}
