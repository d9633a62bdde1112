// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TestschedError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TestschedError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.tests))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tests(cfg)?;
    validate_global_config(cfg)?;
    validate_test_names(cfg)?;
    validate_test_properties(cfg)?;
    validate_test_dependencies(cfg)?;
    Ok(())
}

fn config_error(msg: String) -> TestschedError {
    TestschedError::ConfigError(msg)
}

fn ensure_has_tests(cfg: &RawConfigFile) -> Result<()> {
    if cfg.tests.is_empty() {
        return Err(config_error(
            "suite must contain at least one [[test]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.parallel_level == Some(0) {
        return Err(config_error(
            "[config].parallel_level must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.test_load == Some(0) {
        return Err(config_error(
            "[config].test_load must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.poll_interval_ms == 0 {
        return Err(config_error(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_test_names(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for test in cfg.tests.iter() {
        let name = test.name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(config_error(format!(
                "test name '{}' must be non-empty and contain no whitespace",
                test.name
            )));
        }
        if !seen.insert(name) {
            return Err(config_error(format!("duplicate test name '{}'", test.name)));
        }
    }
    Ok(())
}

fn validate_test_properties(cfg: &RawConfigFile) -> Result<()> {
    for test in cfg.tests.iter() {
        if test.processors == 0 {
            return Err(config_error(format!(
                "test '{}' must use at least one processor",
                test.name
            )));
        }
        if !test.cost.is_finite() || test.cost < 0.0 {
            return Err(config_error(format!(
                "test '{}' has invalid cost {}",
                test.name, test.cost
            )));
        }
        if test.resource_lock.iter().any(|r| r.trim().is_empty()) {
            return Err(config_error(format!(
                "test '{}' has an empty name in `resource_lock`",
                test.name
            )));
        }
        test.parsed_resource_groups().map_err(|e| {
            config_error(format!("test '{}' has invalid `resource_groups`: {e}", test.name))
        })?;
    }
    Ok(())
}

fn validate_test_dependencies(cfg: &RawConfigFile) -> Result<()> {
    let names: HashSet<&str> = cfg.tests.iter().map(|t| t.name.as_str()).collect();
    for test in cfg.tests.iter() {
        for dep in test.depends.iter() {
            if dep == &test.name {
                return Err(config_error(format!(
                    "test '{}' cannot depend on itself in `depends`",
                    test.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(config_error(format!(
                    "test '{}' has unknown dependency '{}' in `depends`",
                    test.name, dep
                )));
            }
        }
    }
    Ok(())
}
