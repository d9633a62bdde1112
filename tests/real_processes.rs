// tests/real_processes.rs
//
// End-to-end runs through `testsched::run` with real `sh` processes.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::mpsc;

use testsched::cli::CliArgs;
use testsched::dag::{NotRunReason, Scheduler, SchedulerOptions, TestProperties, TestStatus};
use testsched::engine::{CoreRuntime, Runtime, RuntimeOptions};
use testsched::errors::TestschedError;
use testsched::exec::RealExecutorBackend;
use testsched::history::{CostData, LockedFile, cost_data_path};

fn write_suite(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("Testsched.toml");
    fs::write(&path, contents).unwrap();
    path
}

async fn run_suite(path: &Path, extra: &[&str]) -> bool {
    let mut argv = vec!["testsched", "--config", path.to_str().unwrap()];
    argv.extend_from_slice(extra);
    testsched::run(CliArgs::try_parse_from(argv).unwrap())
        .await
        .unwrap()
}

fn cost_data(dir: &Path) -> CostData {
    CostData::read(&cost_data_path(&dir.join(".testsched"))).unwrap()
}

#[tokio::test]
async fn records_costs_and_failures_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join(".testsched")).unwrap();
    fs::write(
        cost_data_path(&dir.path().join(".testsched")),
        "retired_test 7 2.5\n---\n",
    )
    .unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[[test]]
name = "ok"
cmd = "exit 0"

[[test]]
name = "broken"
cmd = "exit 3"
"#,
    );

    assert!(!run_suite(&path, &["-j", "2"]).await);
    let data = cost_data(dir.path());
    assert_eq!(data.last_failed, vec!["broken".to_string()]);
    let runs = |name: &str| {
        data.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.previous_runs)
    };
    assert_eq!(runs("ok"), Some(1));
    assert_eq!(runs("broken"), Some(1));
    assert_eq!(runs("retired_test"), Some(7));

    assert!(!run_suite(&path, &["-j", "2"]).await);
    let data = cost_data(dir.path());
    let ok = data.records.iter().find(|r| r.name == "ok").unwrap();
    assert_eq!(ok.previous_runs, 2);
    assert!(ok.cost >= 0.0);
}

#[tokio::test]
async fn runs_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("fixtures")).unwrap();
    fs::write(dir.path().join("fixtures/data.txt"), "x").unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[[test]]
name = "reads_fixture"
cmd = "test -f data.txt"
working_directory = "fixtures"
"#,
    );

    assert!(run_suite(&path, &[]).await);
}

#[tokio::test]
async fn missing_working_directory_fails_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[[test]]
name = "nowhere"
cmd = "true"
working_directory = "does_not_exist"

[[test]]
name = "fine"
cmd = "true"
"#,
    );

    assert!(!run_suite(&path, &[]).await);
    let data = cost_data(dir.path());
    assert_eq!(data.last_failed, vec!["nowhere".to_string()]);
}

#[tokio::test]
async fn missing_program_is_a_launch_failure() {
    let tests = vec![
        TestProperties::new(0, "ghost", "/definitely/not/a/binary_xyz --flag"),
        TestProperties::new(1, "fine", "exit 0"),
    ];
    let scheduler = Scheduler::new(
        tests,
        SchedulerOptions {
            parallel_level: 2,
            ..SchedulerOptions::default()
        },
    )
    .unwrap();
    let (tx, rx) = mpsc::channel(64);
    let core = CoreRuntime::new(scheduler, RuntimeOptions::default());
    let summary = Runtime::new(core, rx, RealExecutorBackend::new(tx))
        .quiet(true)
        .run()
        .await
        .unwrap();

    match &summary.result_of("ghost").unwrap().status {
        TestStatus::NotRun(NotRunReason::LaunchFailed(msg)) => {
            assert!(msg.contains("binary_xyz"), "{msg}")
        }
        other => panic!("expected a launch failure, got {other:?}"),
    }
    assert_eq!(summary.result_of("fine").unwrap().status, TestStatus::Passed);
    assert_eq!(summary.failed(), vec!["ghost"]);
}

#[tokio::test]
async fn exports_granted_resources() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("resources.json"),
        r#"{
            "version": { "major": 1, "minor": 0 },
            "local": [ { "gpus": [ { "id": "0", "slots": 4 } ] } ]
        }"#,
    )
    .unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[config]
resource_spec_file = "resources.json"

[[test]]
name = "gpu"
cmd = 'test "$TESTSCHED_RESOURCE_GROUP_COUNT" = 1 && test "$TESTSCHED_RESOURCE_GROUP_0" = gpus && test "$TESTSCHED_RESOURCE_GROUP_0_GPUS" = "id:0,slots:3"'
resource_groups = "gpus:3"

[[test]]
name = "plain"
cmd = 'test -z "$TESTSCHED_RESOURCE_GROUP_COUNT"'
"#,
    );

    assert!(run_suite(&path, &[]).await);
}

#[tokio::test]
async fn timeout_kills_the_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_suite(
        dir.path(),
        r#"
[[test]]
name = "sleepy"
cmd = "sleep 30"
timeout_secs = 1
"#,
    );

    let started = Instant::now();
    assert!(!run_suite(&path, &[]).await);
    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(cost_data(dir.path()).last_failed, vec!["sleepy".to_string()]);
}

#[tokio::test]
async fn failover_skips_tests_finished_by_an_interrupted_run() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("count");
    let path = write_suite(
        dir.path(),
        &format!(
            r#"
[[test]]
name = "first"
cmd = "echo first >> {counter}"

[[test]]
name = "second"
cmd = "echo second >> {counter}"
"#,
            counter = counter.display()
        ),
    );
    // An earlier run got as far as test #1.
    fs::create_dir_all(dir.path().join(".testsched")).unwrap();
    fs::write(dir.path().join(".testsched/Checkpoint.txt"), "0\n").unwrap();

    assert!(run_suite(&path, &["--failover"]).await);
    assert_eq!(fs::read_to_string(&counter).unwrap(), "second\n");
    assert!(!dir.path().join(".testsched/Checkpoint.txt").exists());

    // Without --failover a stale checkpoint is ignored.
    fs::write(dir.path().join(".testsched/Checkpoint.txt"), "0\n").unwrap();
    fs::remove_file(&counter).unwrap();
    assert!(run_suite(&path, &[]).await);
    assert_eq!(fs::read_to_string(&counter).unwrap(), "first\nsecond\n");
}

#[tokio::test]
async fn locked_cost_data_fails_the_run_after_the_tests_ran() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let path = write_suite(
        dir.path(),
        &format!(
            r#"
[config]
lock_timeout_secs = 1

[[test]]
name = "ok"
cmd = "touch {marker}"
"#,
            marker = marker.display()
        ),
    );
    let cost_path = cost_data_path(&dir.path().join(".testsched"));
    let _held = LockedFile::acquire(&cost_path, Duration::from_secs(1)).unwrap();

    let argv = vec!["testsched", "--config", path.to_str().unwrap()];
    let err = testsched::run(CliArgs::try_parse_from(argv).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TestschedError>(),
        Some(TestschedError::LockTimeout { .. })
    ));
    assert!(marker.exists());
    assert!(!cost_path.exists());
}

#[tokio::test]
async fn stop_on_failure_skips_the_remaining_tests() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let path = write_suite(
        dir.path(),
        &format!(
            r#"
[[test]]
name = "first"
cmd = "exit 1"

[[test]]
name = "second"
cmd = "touch {marker}"
"#,
            marker = marker.display()
        ),
    );

    assert!(!run_suite(&path, &["--stop-on-failure"]).await);
    assert!(!marker.exists());
    assert_eq!(cost_data(dir.path()).last_failed, vec!["first".to_string()]);

    // Without the flag the failure does not stop the run.
    assert!(!run_suite(&path, &[]).await);
    assert!(marker.exists());
}
