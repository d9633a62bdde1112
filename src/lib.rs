// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod history;
pub mod logging;
pub mod resources;
pub mod types;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{LoadSource, RunSummary, Scheduler, SchedulerOptions, TestProperties};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, StopTime};
use crate::errors::TestschedError;
use crate::exec::RealExecutorBackend;
use crate::history::{Checkpoint, CostData, checkpoint_path, cost_data_path, update_cost_data};
use crate::resources::ResourceSpec;

/// Lower bound when `--parallel` is given without a value.
const MIN_AUTO_PARALLEL_LEVEL: usize = 2;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - suite loading and cost history
/// - resource spec
/// - scheduler / checkpoint / runtime
/// - executor
/// - Ctrl-C handling
///
/// Returns whether every test passed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading suite {:?}", args.config))?;
    let root = config_root_dir(&args.config);

    let parallel_level = resolve_parallel_level(args.parallel, cfg.config.parallel_level)?;
    let strategy = args
        .packing_strategy
        .unwrap_or(cfg.config.packing_strategy);

    let mut tests = TestProperties::from_config(&cfg)?;
    for test in &mut tests {
        if let Some(dir) = test.working_directory.take() {
            test.working_directory = Some(root.join(dir));
        }
    }

    let state_dir = root.join(&cfg.config.state_dir);
    let cost_path = cost_data_path(&state_dir);
    let lock_timeout = cfg.config.lock_timeout();

    let history = CostData::read(&cost_path)?;
    history.apply_to(&mut tests, parallel_level);

    let mut stdout = io::stdout();
    let names: Vec<String> = tests.iter().map(|t| t.name.clone()).collect();
    let resource_spec = match resource_spec_path(&args, &cfg, &root) {
        Some(path) => Some(load_resource_spec(&path, &names, &mut stdout)?),
        None => None,
    };

    let stop_on_failure = args.stop_on_failure || cfg.config.stop_on_failure;
    let test_load = args.test_load.or(cfg.config.test_load);
    let options = SchedulerOptions {
        parallel_level,
        packing_strategy: strategy,
        resource_spec,
        last_failed: history.last_failed.clone(),
        stop_on_failure,
        test_load,
        load_source: LoadSource::System,
    };
    let mut scheduler = match Scheduler::new(tests, options) {
        Ok(s) => s,
        Err(err @ TestschedError::DependencyCycle(_)) => {
            write!(stdout, "{}", format_aborted(&names, "Dependency cycle"))?;
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    if args.show_only {
        print!("{}", scheduler.format_test_list());
        return Ok(true);
    }

    let checkpoint = Checkpoint::new(checkpoint_path(&state_dir), lock_timeout);
    for id in checkpoint.load_for_resume(args.failover)? {
        if !scheduler.force_complete(id) {
            warn!(id, "checkpoint names a test that cannot be resumed; ignoring");
        }
    }

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Process executor backend (real implementation in production).
    let executor = RealExecutorBackend::new(rt_tx.clone());

    // Ctrl-C → stop starting tests, let running ones finish.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let stop_time = args
        .stop_after
        .map(|secs| StopTime::after(Duration::from_secs(secs)))
        .unwrap_or_default();
    let options = RuntimeOptions {
        poll_interval: cfg.config.poll_interval(),
        stop_time,
    };

    info!(
        tests = scheduler.total(),
        parallel_level,
        ?strategy,
        failover = args.failover,
        stop_on_failure,
        test_load = ?test_load,
        "starting test run"
    );

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, options);

    // Construct the async IO shell around the core.
    let summary = Runtime::new(core, rt_rx, executor)
        .with_checkpoint(checkpoint)
        .run()
        .await?;

    report_and_record(&mut stdout, &summary, &cost_path, lock_timeout)?;

    Ok(summary.all_passed())
}

/// Parse the resource spec, or list every test as not run and fail.
fn load_resource_spec(path: &Path, names: &[String], out: &mut impl Write) -> Result<ResourceSpec> {
    match ResourceSpec::read_from_json_file(path) {
        Ok(spec) => {
            debug!(path = ?path, "resource spec loaded");
            Ok(spec)
        }
        Err(err) => {
            write!(out, "{}", format_aborted(names, "Invalid resource spec"))?;
            Err(TestschedError::from(err).into())
        }
    }
}

/// Print the summary, then fold this run into the cost history.
///
/// The summary is written first so a cost file that cannot be updated
/// still leaves the results on screen.
fn report_and_record(
    out: &mut impl Write,
    summary: &RunSummary,
    cost_path: &Path,
    lock_timeout: Duration,
) -> Result<()> {
    write!(out, "{}", summary.render())?;
    out.flush()?;
    report_resumed(summary);

    if let Err(err) = update_cost_data(cost_path, &summary.costs, &summary.failed(), lock_timeout) {
        error!(path = %cost_path.display(), error = %err, "cost data not updated");
        return Err(err.into());
    }
    Ok(())
}

/// Explicit value wins, then the suite file, then serial.
///
/// A bare `--parallel` uses the machine's parallelism.
fn resolve_parallel_level(cli: Option<Option<usize>>, configured: Option<usize>) -> Result<usize> {
    let level = match cli {
        Some(Some(n)) => n,
        Some(None) => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(MIN_AUTO_PARALLEL_LEVEL),
        None => configured.unwrap_or(1),
    };
    if level == 0 {
        bail!("parallel level must be at least 1");
    }
    Ok(level)
}

/// CLI paths are taken as given; suite paths are relative to the suite file.
fn resource_spec_path(args: &CliArgs, cfg: &ConfigFile, root: &Path) -> Option<PathBuf> {
    match (&args.resource_spec_file, &cfg.config.resource_spec_file) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(path)) => Some(root.join(path)),
        (None, None) => None,
    }
}

/// Figure out the directory relative paths in the suite resolve against.
///
/// - If the suite path has a non-empty parent (e.g. "ci/Testsched.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Testsched.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Not-run listing for a run that never started.
fn format_aborted(names: &[String], reason: &str) -> String {
    let mut out = format!(
        "\n0% tests passed, 0 tests failed out of {}\n",
        names.len()
    );
    if !names.is_empty() {
        out.push_str("\nThe following tests did not run:\n");
        for (id, name) in names.iter().enumerate() {
            out.push_str(&format!("\t{:>3} - {} ({})\n", id + 1, name, reason));
        }
    }
    out
}

fn report_resumed(summary: &RunSummary) {
    if !summary.resumed.is_empty() {
        info!(
            resumed = summary.resumed.len(),
            "tests skipped because an earlier run already finished them"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::LockedFile;
    use crate::resources::ResourceSpecError;

    #[test]
    fn parallel_level_precedence() {
        assert_eq!(resolve_parallel_level(None, None).unwrap(), 1);
        assert_eq!(resolve_parallel_level(None, Some(3)).unwrap(), 3);
        assert_eq!(resolve_parallel_level(Some(Some(5)), Some(3)).unwrap(), 5);
        assert!(resolve_parallel_level(Some(None), Some(1)).unwrap() >= 2);
        assert!(resolve_parallel_level(Some(Some(0)), None).is_err());
    }

    #[test]
    fn bare_file_name_resolves_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config_root_dir(Path::new("Testsched.toml")), cwd);
        assert_eq!(
            config_root_dir(Path::new("ci/Testsched.toml")),
            PathBuf::from("ci")
        );
    }

    #[test]
    fn bad_resource_spec_lists_every_test_as_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("resources.json");
        std::fs::write(&spec, r#"{ "version": { "major": 2, "minor": 0 }, "local": [] }"#).unwrap();

        let mut out = Vec::new();
        let err = load_resource_spec(&spec, &["a".into(), "b".into()], &mut out).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TestschedError>(),
            Some(TestschedError::ResourceSpec(ResourceSpecError::UnsupportedVersion { .. }))
        ));
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("0 tests failed out of 2"));
        assert!(out.contains("\t  1 - a (Invalid resource spec)"));
        assert!(out.contains("\t  2 - b (Invalid resource spec)"));
    }

    #[test]
    fn summary_is_printed_even_when_cost_data_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let cost_path = cost_data_path(dir.path());
        let _held = LockedFile::acquire(&cost_path, Duration::from_secs(1)).unwrap();

        let summary = RunSummary {
            total: 1,
            ..RunSummary::default()
        };
        let mut out = Vec::new();
        let err = report_and_record(&mut out, &summary, &cost_path, Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TestschedError>(),
            Some(TestschedError::LockTimeout { .. })
        ));
        assert!(String::from_utf8(out).unwrap().contains("tests failed out of 1"));
        assert!(!cost_path.exists());
    }

    #[test]
    fn aborted_run_lists_every_test() {
        let out = format_aborted(&["a".into(), "b".into()], "Dependency cycle");
        assert!(out.contains("out of 2"));
        assert!(out.contains("\t  1 - a (Dependency cycle)"));
        assert!(out.contains("\t  2 - b (Dependency cycle)"));
    }
}
