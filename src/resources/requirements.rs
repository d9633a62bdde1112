// src/resources/requirements.rs

//! Per-test resource demand and the resulting per-test allocation.
//!
//! Demand is written in the suite file using the resource-groups syntax:
//!
//! ```text
//! 2,gpus:2,crypto_chips:1;gpus:4
//! ```
//!
//! Groups are separated by `;`. Each group is a comma-separated list of
//! `type:slots` requirements, optionally prefixed by a count that replicates
//! the group (`2,gpus:2` is two groups each needing one 2-slot gpu).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^([a-z_][a-z0-9_]*):([0-9]+)$").expect("valid requirement regex")
});

/// `slots_needed` slots on each of `units_needed` distinct ids of `resource_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequirement {
    pub resource_type: String,
    pub slots_needed: u32,
    pub units_needed: u32,
}

/// The demand of one process of a test.
pub type ResourceGroup = Vec<ResourceRequirement>;

/// One id granted to a group, with the slots taken from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedResource {
    pub id: String,
    pub slots: u32,
}

/// What one group received: `resource type -> granted ids`.
pub type GroupAllocation = BTreeMap<String, Vec<AllocatedResource>>;

/// Parse a resource-groups property string.
///
/// An empty (or all-whitespace) string means "no resource demand".
pub fn parse_resource_groups(text: &str) -> Result<Vec<ResourceGroup>, String> {
    let mut groups = Vec::new();
    if text.trim().is_empty() {
        return Ok(groups);
    }

    for raw_group in text.split(';') {
        let mut fields = raw_group.split(',').map(str::trim).peekable();

        let mut count = 1u32;
        if let Some(first) = fields.peek() {
            if !first.is_empty() && first.bytes().all(|b| b.is_ascii_digit()) {
                count = first
                    .parse()
                    .map_err(|_| format!("invalid group count '{first}' in '{raw_group}'"))?;
                fields.next();
            }
        }

        let mut group = ResourceGroup::new();
        for field in fields {
            let caps = REQUIREMENT.captures(field).ok_or_else(|| {
                format!("invalid resource requirement '{field}' (expected type:slots)")
            })?;
            let slots_needed: u32 = caps[2]
                .parse()
                .map_err(|_| format!("invalid slot count in '{field}'"))?;
            if slots_needed == 0 {
                return Err(format!("resource requirement '{field}' must need at least one slot"));
            }
            group.push(ResourceRequirement {
                resource_type: caps[1].to_string(),
                slots_needed,
                units_needed: 1,
            });
        }

        if group.is_empty() {
            return Err(format!("resource group '{raw_group}' has no requirements"));
        }

        for _ in 0..count {
            groups.push(group.clone());
        }
    }

    Ok(groups)
}
