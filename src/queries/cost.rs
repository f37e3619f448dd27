//! Plan-cost bookkeeping.

use std::fmt;

/// The estimated cost of executing a plan subtree.
///
/// The planner's dynamic-programming join search compares candidate plans by `cpu_cost` alone;
/// the tuple and block-I/O estimates are carried along for reporting and for parent operators'
/// own estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanCost {
    /// The estimated number of tuples the subtree produces.
    pub num_tuples: f32,
    /// The estimated average size of a produced tuple, in bytes.
    pub tuple_size: f32,
    /// The estimated CPU effort of producing all tuples.
    pub cpu_cost: f32,
    /// The estimated number of block I/Os performed.
    pub num_block_ios: u64,
}

impl PlanCost {
    /// A zero cost, for plans that produce nothing.
    pub fn zero() -> PlanCost {
        PlanCost {
            num_tuples: 0.0,
            tuple_size: 0.0,
            cpu_cost: 0.0,
            num_block_ios: 0,
        }
    }
}

impl fmt::Display for PlanCost {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Cost[tuples={:.1}, tupSize={:.1}, cpuCost={:.1}, blockIOs={}]",
            self.num_tuples, self.tuple_size, self.cpu_cost, self.num_block_ios
        )
    }
}
