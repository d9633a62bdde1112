// tests/bin_packer_properties.rs

use std::collections::BTreeMap;

use proptest::prelude::*;
use testsched::resources::{
    BinPackerAllocation, Resource, ResourceIds, ResourceLedger, ResourceSpec, Socket,
    SpecResource, allocate_resources,
};
use testsched::types::PackingStrategy;

fn ids_strategy() -> impl Strategy<Value = ResourceIds> {
    proptest::collection::vec((1..=6u32, 0..=6u32), 1..=5).prop_map(|caps| {
        caps.into_iter()
            .enumerate()
            .map(|(i, (total, locked))| (i.to_string(), Resource::new(total, locked.min(total))))
            .collect()
    })
}

fn requests_strategy() -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(1..=5u32, 0..=5)
}

fn strategy_strategy() -> impl Strategy<Value = PackingStrategy> {
    prop_oneof![Just(PackingStrategy::RoundRobin), Just(PackingStrategy::Block)]
}

/// Exhaustive search over every assignment of requests to ids.
fn brute_force_feasible(free: &[u32], requests: &[u32]) -> bool {
    fn go(free: &mut [u32], requests: &[u32]) -> bool {
        let Some((&first, rest)) = requests.split_first() else {
            return true;
        };
        for i in 0..free.len() {
            if free[i] >= first {
                free[i] -= first;
                let ok = go(free, rest);
                free[i] += first;
                if ok {
                    return true;
                }
            }
        }
        false
    }
    go(&mut free.to_vec(), requests)
}

fn pack(
    strategy: PackingStrategy,
    ids: &ResourceIds,
    requests: &[u32],
) -> (bool, Vec<BinPackerAllocation>) {
    let mut allocations: Vec<BinPackerAllocation> = requests
        .iter()
        .enumerate()
        .map(|(i, &slots)| BinPackerAllocation::new(i, slots))
        .collect();
    let ok = allocate_resources(strategy, ids, &mut allocations);
    (ok, allocations)
}

proptest! {
    #[test]
    fn packing_never_oversubscribes(
        ids in ids_strategy(),
        requests in requests_strategy(),
        strategy in strategy_strategy(),
    ) {
        let (ok, allocations) = pack(strategy, &ids, &requests);
        if ok {
            let mut used: BTreeMap<String, u32> = BTreeMap::new();
            for alloc in &allocations {
                let id = alloc.id.clone().expect("every requester is assigned");
                *used.entry(id).or_default() += alloc.slots_needed;
            }
            for (id, slots) in used {
                prop_assert!(slots <= ids[&id].free(), "id {id} oversubscribed");
            }
        } else {
            prop_assert!(allocations.iter().all(|a| a.id.is_none()));
        }
    }

    #[test]
    fn packing_finds_a_solution_whenever_one_exists(
        ids in ids_strategy(),
        requests in requests_strategy(),
        strategy in strategy_strategy(),
    ) {
        let free: Vec<u32> = ids.values().map(Resource::free).collect();
        let (ok, _) = pack(strategy, &ids, &requests);
        prop_assert_eq!(ok, brute_force_feasible(&free, &requests));
    }

    #[test]
    fn packing_is_deterministic(
        ids in ids_strategy(),
        requests in requests_strategy(),
        strategy in strategy_strategy(),
    ) {
        let first = pack(strategy, &ids, &requests);
        let second = pack(strategy, &ids, &requests);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn ledger_stays_within_bounds(
        capacities in proptest::collection::vec(1..=8u32, 1..=4),
        ops in proptest::collection::vec((any::<bool>(), 0..4usize, 0..=9u32), 0..40),
    ) {
        let spec = ResourceSpec {
            local_socket: Socket {
                resources: BTreeMap::from([(
                    "gpus".to_string(),
                    capacities
                        .iter()
                        .enumerate()
                        .map(|(i, &capacity)| SpecResource { id: i.to_string(), capacity })
                        .collect(),
                )]),
            },
        };
        let mut ledger = ResourceLedger::from_spec(&spec);
        let mut outstanding: Vec<(String, u32)> = Vec::new();

        for (allocate, idx, slots) in ops {
            let id = idx.to_string();
            if allocate {
                let before = ledger.clone();
                if ledger.allocate_resource("gpus", &id, slots) {
                    outstanding.push((id, slots));
                } else {
                    prop_assert_eq!(&ledger, &before);
                }
            } else if let Some(pos) = outstanding.iter().position(|(o, _)| *o == id) {
                let (id, slots) = outstanding.remove(pos);
                prop_assert!(ledger.deallocate_resource("gpus", &id, slots));
            }

            for r in ledger.resources()["gpus"].values() {
                prop_assert!(r.locked <= r.total);
            }
        }

        for (id, slots) in outstanding {
            prop_assert!(ledger.deallocate_resource("gpus", &id, slots));
        }
        prop_assert!(ledger.all_resources_available());
    }
}

#[test]
fn block_packs_while_round_robin_spreads() {
    let ids: ResourceIds = [("0", 4), ("1", 4)]
        .into_iter()
        .map(|(id, total)| (id.to_string(), Resource::new(total, 0)))
        .collect();

    let (ok, spread) = pack(PackingStrategy::RoundRobin, &ids, &[1, 1]);
    assert!(ok);
    assert_ne!(spread[0].id, spread[1].id);

    let (ok, packed) = pack(PackingStrategy::Block, &ids, &[1, 1]);
    assert!(ok);
    assert_eq!(packed[0].id, packed[1].id);
}
