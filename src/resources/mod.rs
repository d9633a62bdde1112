// src/resources/mod.rs

//! Constrained-resource model.
//!
//! - [`spec`] parses the JSON resource spec into a capacity declaration.
//! - [`ledger`] tracks total/locked capacity per resource id while tests run.
//! - [`bin_packer`] finds a feasible id assignment for a batch of demands.
//! - [`requirements`] holds per-test demand and granted allocations.

pub mod bin_packer;
pub mod ledger;
pub mod requirements;
pub mod spec;

pub use bin_packer::{BinPackerAllocation, allocate_resources};
pub use ledger::{Resource, ResourceIds, ResourceLedger, ResourceTable};
pub use requirements::{
    AllocatedResource, GroupAllocation, ResourceGroup, ResourceRequirement, parse_resource_groups,
};
pub use spec::{ResourceSpec, ResourceSpecError, Socket, SpecResource};
