// src/resources/bin_packer.rs

//! Backtracking bin packer that assigns requesters to resource ids.
//!
//! Given the ids of a single resource type (with their current free slots)
//! and a batch of requesters that each need `N` slots on *one* id, find an
//! assignment where no id is over-subscribed.
//!
//! The search is a depth-first backtracking walk over requesters sorted by
//! demand (largest first). Ids are tried in an order maintained by an
//! [`AllocationStrategy`]. When a branch fails, every id tied on the same
//! free-slot count is skipped, since those subtrees are identical.
//!
//! Worst case is still exponential in the number of *distinct* free-slot
//! values; fleets of identical ids stay cheap.
//!
//! Internally the capacity table is flattened into dense vectors indexed by
//! position; string ids only appear at the boundary.

use crate::resources::ledger::{Resource, ResourceIds};
use crate::types::PackingStrategy;

/// One requester's demand and (after a successful packing) its assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinPackerAllocation {
    /// Index of the resource group this demand came from.
    pub process_index: usize,
    pub slots_needed: u32,
    /// Filled in by a successful packing; `None` otherwise.
    pub id: Option<String>,
}

impl BinPackerAllocation {
    pub fn new(process_index: usize, slots_needed: u32) -> Self {
        Self {
            process_index,
            slots_needed,
            id: None,
        }
    }
}

/// Ordering policy for candidate ids.
///
/// `free[i]` is the free slot count of id `i`; `order` holds id positions in
/// the order they will be tried.
pub trait AllocationStrategy {
    /// Establish the initial try-order.
    fn initial_sort(free: &[u32], order: &mut [usize]);

    /// Restore the try-order after `order[last]` just lost capacity.
    fn incremental_sort(free: &[u32], order: &mut [usize], last: usize);
}

/// Spread consumers: keep ids ordered by remaining free slots, descending.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobin;

/// Pack consumers: keep using the most recently chosen id first.
#[derive(Debug, Clone, Copy)]
pub struct Block;

fn sort_by_free_descending(free: &[u32], order: &mut [usize]) {
    // Stable: ties keep id order.
    order.sort_by(|&a, &b| free[b].cmp(&free[a]));
}

impl AllocationStrategy for RoundRobin {
    fn initial_sort(free: &[u32], order: &mut [usize]) {
        sort_by_free_descending(free, order);
    }

    fn incremental_sort(free: &[u32], order: &mut [usize], last: usize) {
        let moved = order[last];
        let mut i = last;
        while i + 1 < order.len() && free[order[i + 1]] > free[moved] {
            order[i] = order[i + 1];
            i += 1;
        }
        order[i] = moved;
    }
}

impl AllocationStrategy for Block {
    fn initial_sort(free: &[u32], order: &mut [usize]) {
        sort_by_free_descending(free, order);
    }

    fn incremental_sort(_free: &[u32], order: &mut [usize], last: usize) {
        order[..=last].rotate_right(1);
    }
}

/// Pack `allocations` onto `resources` using the given strategy.
///
/// Returns `true` iff every allocation received an id. On `false` all ids
/// are cleared. `resources` is only read.
pub fn allocate_resources(
    strategy: PackingStrategy,
    resources: &ResourceIds,
    allocations: &mut [BinPackerAllocation],
) -> bool {
    match strategy {
        PackingStrategy::RoundRobin => allocate::<RoundRobin>(resources, allocations),
        PackingStrategy::Block => allocate::<Block>(resources, allocations),
    }
}

pub fn allocate_round_robin(resources: &ResourceIds, allocations: &mut [BinPackerAllocation]) -> bool {
    allocate::<RoundRobin>(resources, allocations)
}

pub fn allocate_block(resources: &ResourceIds, allocations: &mut [BinPackerAllocation]) -> bool {
    allocate::<Block>(resources, allocations)
}

fn allocate<S: AllocationStrategy>(
    resources: &ResourceIds,
    allocations: &mut [BinPackerAllocation],
) -> bool {
    for alloc in allocations.iter_mut() {
        alloc.id = None;
    }
    if allocations.is_empty() {
        return true;
    }

    // Largest demand first; ties keep requester order.
    let mut by_need: Vec<usize> = (0..allocations.len()).collect();
    by_need.sort_by(|&a, &b| allocations[b].slots_needed.cmp(&allocations[a].slots_needed));
    let requests: Vec<u32> = by_need.iter().map(|&i| allocations[i].slots_needed).collect();

    let ids: Vec<&String> = resources.keys().collect();
    let free: Vec<u32> = resources.values().map(Resource::free).collect();
    let mut order: Vec<usize> = (0..ids.len()).collect();
    S::initial_sort(&free, &mut order);

    let mut assigned = vec![None; requests.len()];
    if !search::<S>(&free, &order, 0, &requests, &mut assigned) {
        return false;
    }

    for (pos, &alloc_idx) in by_need.iter().enumerate() {
        allocations[alloc_idx].id = assigned[pos].map(|slot: usize| ids[slot].clone());
    }
    true
}

fn search<S: AllocationStrategy>(
    free: &[u32],
    order: &[usize],
    current: usize,
    requests: &[u32],
    assigned: &mut [Option<usize>],
) -> bool {
    let needed = requests[current];

    let mut idx = 0;
    while idx < order.len() {
        let candidate = order[idx];
        if free[candidate] >= needed {
            assigned[current] = Some(candidate);
            if current + 1 == requests.len() {
                return true;
            }

            let mut next_free = free.to_vec();
            next_free[candidate] -= needed;
            let mut next_order = order.to_vec();
            S::incremental_sort(&next_free, &mut next_order, idx);

            if search::<S>(&next_free, &next_order, current + 1, requests, assigned) {
                return true;
            }
        }

        assigned[current] = None;
        let tied = free[candidate];
        idx += 1;
        while idx < order.len() && free[order[idx]] == tied {
            idx += 1;
        }
    }

    false
}
