#![deny(missing_docs)]
//! Cost accounting shared by the storage layer and the tree.
//!
//! Operations that touch storage or hash tree nodes return their value
//! wrapped in a [`CostContext`], so callers can see what an operation did
//! without a side channel.

mod context;

use std::ops::{Add, AddAssign};

pub use context::{CostContext, CostResult, CostsExt};

/// Resources consumed by an operation.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct OperationCost {
    /// Number of storage seeks (point reads, writes and iterator moves).
    pub seek_count: u32,
    /// Bytes written to storage, keys included.
    pub storage_written_bytes: u64,
    /// Bytes loaded from storage, keys included.
    pub storage_loaded_bytes: u64,
    /// Number of hash invocations over tree nodes (leaf hashes and
    /// compressions).
    pub hash_node_calls: u32,
}

impl OperationCost {
    /// Cost consisting of `seek_count` seeks only.
    pub fn with_seek_count(seek_count: u32) -> Self {
        OperationCost {
            seek_count,
            ..Default::default()
        }
    }

    /// Cost consisting of `hash_node_calls` node hashes only.
    pub fn with_hash_node_calls(hash_node_calls: u32) -> Self {
        OperationCost {
            hash_node_calls,
            ..Default::default()
        }
    }

    /// `true` if nothing was spent.
    pub fn is_nothing(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for OperationCost {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for OperationCost {
    fn add_assign(&mut self, rhs: Self) {
        self.seek_count += rhs.seek_count;
        self.storage_written_bytes += rhs.storage_written_bytes;
        self.storage_loaded_bytes += rhs.storage_loaded_bytes;
        self.hash_node_calls += rhs.hash_node_calls;
    }
}

/// Early return for functions producing a [`CostResult`].
///
/// The cost of the wrapped expression is added to `$cost`; on `Err` the
/// function returns the error together with everything accumulated so far.
#[macro_export]
macro_rules! cost_return_on_error {
    ( &mut $cost:ident, $($body:tt)+ ) => {
        {
            use $crate::CostsExt;
            let result_with_cost = { $($body)+ };
            let result = result_with_cost.unwrap_add_cost(&mut $cost);
            match result {
                Ok(x) => x,
                Err(e) => return Err(e.into()).wrap_with_cost($cost),
            }
        }
    };
}

/// Same as [`cost_return_on_error`] but for a plain `Result`: nothing is
/// added, the accumulated cost is returned alongside the error.
#[macro_export]
macro_rules! cost_return_on_error_no_add {
    ( &$cost:ident, $($body:tt)+ ) => {
        {
            use $crate::CostsExt;
            let result = { $($body)+ };
            match result {
                Ok(x) => x,
                Err(e) => return Err(e.into()).wrap_with_cost($cost),
            }
        }
    };
}
