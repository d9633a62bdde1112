// tests/suite_config.rs

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use testsched::cli::CliArgs;
use testsched::config::load_and_validate;
use testsched::dag::TestProperties;
use testsched::errors::TestschedError;
use testsched::resources::ResourceSpecError;
use testsched::types::PackingStrategy;

fn write_suite(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("Testsched.toml");
    fs::write(&path, contents).unwrap();
    path
}

fn args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["testsched"];
    argv.extend_from_slice(extra);
    CliArgs::try_parse_from(argv).unwrap()
}

#[test]
fn full_suite_file_is_understood() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[config]
parallel_level = 4
packing_strategy = "block"
resource_spec_file = "resources.json"
lock_timeout_secs = 5
stop_on_failure = true
test_load = 8

[[test]]
name = "build"
cmd = "make"

[[test]]
name = "gpu_smoke"
cmd = "./run_gpu_smoke.sh"
processors = 2
resource_lock = ["database"]
resource_groups = "2,gpus:2;crypto_chips:1"
depends = ["build"]
timeout_secs = 60
working_directory = "build"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.config.parallel_level, Some(4));
    assert_eq!(cfg.config.packing_strategy, PackingStrategy::Block);
    assert_eq!(cfg.config.lock_timeout_secs, 5);
    assert_eq!(cfg.config.poll_interval_ms, 100);
    assert!(cfg.config.stop_on_failure);
    assert_eq!(cfg.config.test_load, Some(8));

    let tests = TestProperties::from_config(&cfg).unwrap();
    assert_eq!(tests.len(), 2);
    let gpu = &tests[1];
    assert_eq!(gpu.id, 1);
    assert_eq!(gpu.depends, vec![0]);
    assert_eq!(gpu.processors, 2);
    assert!(gpu.locked_resources.contains("database"));
    // "2,gpus:2" replicates the first group.
    assert_eq!(gpu.resource_groups.len(), 3);
    assert_eq!(gpu.resource_groups[2][0].resource_type, "crypto_chips");
    assert_eq!(gpu.timeout, Some(std::time::Duration::from_secs(60)));
}

#[test]
fn invalid_suites_are_rejected() {
    let cases = [
        ("", "at least one"),
        (
            "[[test]]\nname = \"a\"\ncmd = \"true\"\n[[test]]\nname = \"a\"\ncmd = \"true\"\n",
            "duplicate test name",
        ),
        (
            "[[test]]\nname = \"a\"\ncmd = \"true\"\ndepends = [\"ghost\"]\n",
            "unknown dependency",
        ),
        (
            "[[test]]\nname = \"a\"\ncmd = \"true\"\ndepends = [\"a\"]\n",
            "cannot depend on itself",
        ),
        (
            "[[test]]\nname = \"a\"\ncmd = \"true\"\nprocessors = 0\n",
            "at least one processor",
        ),
        (
            "[[test]]\nname = \"a\"\ncmd = \"true\"\nresource_groups = \"gpus\"\n",
            "resource_groups",
        ),
        (
            "[config]\nparallel_level = 0\n[[test]]\nname = \"a\"\ncmd = \"true\"\n",
            "parallel_level",
        ),
        (
            "[config]\ntest_load = 0\n[[test]]\nname = \"a\"\ncmd = \"true\"\n",
            "test_load",
        ),
    ];

    for (contents, expected) in cases {
        let dir = tempfile::tempdir().unwrap();
        let path = write_suite(dir.path(), contents);
        match load_and_validate(&path) {
            Err(TestschedError::ConfigError(msg)) => {
                assert!(msg.contains(expected), "{msg:?} should mention {expected:?}")
            }
            other => panic!("expected config error for {contents:?}, got {other:?}"),
        }
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_suite(dir.path(), "[[test]\nname = ");
    assert!(matches!(
        load_and_validate(&path),
        Err(TestschedError::TomlError(_))
    ));
}

#[tokio::test]
async fn dependency_cycle_aborts_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let path = write_suite(
        dir.path(),
        &format!(
            r#"
[[test]]
name = "a"
cmd = "touch {marker}"
depends = ["c"]

[[test]]
name = "b"
cmd = "touch {marker}"
depends = ["a"]

[[test]]
name = "c"
cmd = "touch {marker}"
depends = ["b"]
"#,
            marker = marker.display()
        ),
    );

    let err = testsched::run(args(&["--config", path.to_str().unwrap(), "-j", "2"]))
        .await
        .unwrap_err();
    match err.downcast_ref::<TestschedError>() {
        Some(TestschedError::DependencyCycle(cycle)) => {
            for name in ["a", "b", "c"] {
                assert!(cycle.contains(name), "{cycle}");
            }
        }
        other => panic!("expected a dependency cycle, got {other:?}"),
    }
    assert!(!marker.exists());
    assert!(!dir.path().join(".testsched").exists());
}

#[tokio::test]
async fn missing_resource_spec_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[config]
resource_spec_file = "nowhere.json"

[[test]]
name = "a"
cmd = "true"
resource_groups = "gpus:1"
"#,
    );

    let err = testsched::run(args(&["--config", path.to_str().unwrap()]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TestschedError>(),
        Some(TestschedError::ResourceSpec(ResourceSpecError::FileNotFound(_)))
    ));
}

#[tokio::test]
async fn invalid_resource_spec_names_the_reason() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("resources.json");
    fs::write(&spec, r#"{ "version": { "major": 1, "minor": 0 }, "local": [ 3 ] }"#).unwrap();
    let path = write_suite(dir.path(), "[[test]]\nname = \"a\"\ncmd = \"true\"\n");

    let err = testsched::run(args(&[
        "--config",
        path.to_str().unwrap(),
        "--resource-spec-file",
        spec.to_str().unwrap(),
    ]))
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TestschedError>(),
        Some(TestschedError::ResourceSpec(ResourceSpecError::InvalidSocketSpec))
    ));
}

#[tokio::test]
async fn resource_spec_error_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    fs::write(
        dir.path().join("resources.json"),
        r#"{ "version": { "major": 2, "minor": 0 }, "local": [] }"#,
    )
    .unwrap();
    let path = write_suite(
        dir.path(),
        &format!(
            "[config]\nresource_spec_file = \"resources.json\"\n\n[[test]]\nname = \"a\"\ncmd = \"touch {}\"\n",
            marker.display()
        ),
    );

    let err = testsched::run(args(&["--config", path.to_str().unwrap()]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TestschedError>(),
        Some(TestschedError::ResourceSpec(ResourceSpecError::UnsupportedVersion {
            major: 2,
            minor: 0
        }))
    ));
    assert!(!marker.exists());
    assert!(!dir.path().join(".testsched").exists());
}

#[tokio::test]
async fn show_only_lists_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let path = write_suite(
        dir.path(),
        &format!(
            "[[test]]\nname = \"a\"\ncmd = \"touch {}\"\n",
            marker.display()
        ),
    );

    let ok = testsched::run(args(&["--config", path.to_str().unwrap(), "--show-only"]))
        .await
        .unwrap();
    assert!(ok);
    assert!(!marker.exists());
}
