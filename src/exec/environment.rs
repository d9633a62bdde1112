// src/exec/environment.rs

//! Environment variables describing a test's granted resources.
//!
//! For a test with two groups, the first granted two gpus and the second
//! one crypto chip:
//!
//! ```text
//! TESTSCHED_RESOURCE_GROUP_COUNT=2
//! TESTSCHED_RESOURCE_GROUP_0=gpus
//! TESTSCHED_RESOURCE_GROUP_0_GPUS=id:0,slots:2;id:1,slots:2
//! TESTSCHED_RESOURCE_GROUP_1=crypto_chips
//! TESTSCHED_RESOURCE_GROUP_1_CRYPTO_CHIPS=id:card0,slots:1
//! ```

use crate::resources::GroupAllocation;

pub const ENV_PREFIX: &str = "TESTSCHED_RESOURCE_GROUP";

/// Variables for `groups`; empty when the test holds no resources.
pub fn resource_environment(groups: &[GroupAllocation]) -> Vec<(String, String)> {
    if groups.is_empty() {
        return Vec::new();
    }

    let mut vars = vec![(format!("{ENV_PREFIX}_COUNT"), groups.len().to_string())];
    for (i, group) in groups.iter().enumerate() {
        let types: Vec<&str> = group.keys().map(String::as_str).collect();
        vars.push((format!("{ENV_PREFIX}_{i}"), types.join(",")));

        for (resource_type, granted) in group {
            let value = granted
                .iter()
                .map(|r| format!("id:{},slots:{}", r.id, r.slots))
                .collect::<Vec<_>>()
                .join(";");
            vars.push((
                format!("{ENV_PREFIX}_{i}_{}", resource_type.to_uppercase()),
                value,
            ));
        }
    }
    vars
}
