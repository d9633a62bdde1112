// src/resources/ledger.rs

//! In-memory capacity ledger for named resources.

use std::collections::BTreeMap;

use crate::resources::spec::ResourceSpec;

/// Capacity of a single resource id.
///
/// Invariant: `locked <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resource {
    pub total: u32,
    pub locked: u32,
}

impl Resource {
    pub fn new(total: u32, locked: u32) -> Self {
        Self { total, locked }
    }

    pub fn free(&self) -> u32 {
        self.total - self.locked
    }
}

/// `resource id -> capacity` for one resource type.
pub type ResourceIds = BTreeMap<String, Resource>;

/// `resource type -> resource id -> capacity`.
pub type ResourceTable = BTreeMap<String, ResourceIds>;

/// Tracks total and locked capacity per resource instance.
///
/// Allocation and deallocation never fail loudly: an unknown type/id or a
/// request that would break `0 <= locked <= total` returns `false` and leaves
/// the ledger untouched, because callers routinely probe speculatively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLedger {
    resources: ResourceTable,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger with every declared resource fully free.
    pub fn from_spec(spec: &ResourceSpec) -> Self {
        let mut ledger = Self::new();
        ledger.initialize_from_spec(spec);
        ledger
    }

    /// Replace the whole table with `{total: capacity, locked: 0}` for every
    /// `(type, id)` declared in `spec`.
    pub fn initialize_from_spec(&mut self, spec: &ResourceSpec) {
        self.resources = spec
            .local_socket
            .resources
            .iter()
            .map(|(type_name, ids)| {
                let ids = ids
                    .iter()
                    .map(|r| (r.id.clone(), Resource::new(r.capacity, 0)))
                    .collect();
                (type_name.clone(), ids)
            })
            .collect();
    }

    pub fn allocate_resource(&mut self, resource_type: &str, id: &str, slots: u32) -> bool {
        let Some(resource) = self.lookup_mut(resource_type, id) else {
            return false;
        };
        match resource.locked.checked_add(slots) {
            Some(locked) if locked <= resource.total => {
                resource.locked = locked;
                true
            }
            _ => false,
        }
    }

    pub fn deallocate_resource(&mut self, resource_type: &str, id: &str, slots: u32) -> bool {
        let Some(resource) = self.lookup_mut(resource_type, id) else {
            return false;
        };
        if slots > resource.locked {
            return false;
        }
        resource.locked -= slots;
        true
    }

    /// Read-only snapshot of the full table.
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// `true` when nothing is locked anywhere.
    pub fn all_resources_available(&self) -> bool {
        self.resources
            .values()
            .flat_map(|ids| ids.values())
            .all(|r| r.locked == 0)
    }

    fn lookup_mut(&mut self, resource_type: &str, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(resource_type)?.get_mut(id)
    }
}
