// src/exec/test_runner.rs

//! Individual test process runner.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTest;
use crate::engine::{RuntimeEvent, TestOutcome};
use crate::errors::{Result, TestschedError};
use crate::exec::environment::resource_environment;

/// How long to keep draining output after the process itself is gone.
/// Background grandchildren may hold the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Leading words the shell handles itself.
const SHELL_BUILTINS: &[&str] = &[
    "!", ".", ":", "[", "alias", "break", "case", "cd", "command", "continue", "echo", "eval",
    "exec", "exit", "export", "false", "for", "if", "printf", "pwd", "read", "return", "set",
    "shift", "test", "trap", "true", "type", "ulimit", "umask", "unset", "until", "wait", "while",
];

/// A spawned test process.
#[derive(Debug)]
pub struct RunningTest {
    child: Child,
    started: Instant,
}

/// Spawn the test's command.
///
/// Errors here (a missing program or working directory) are launch
/// failures.
pub fn spawn_test(test: &ScheduledTest) -> Result<RunningTest> {
    info!(
        test = %test.name,
        id = test.id,
        cmd = %test.cmd,
        processors = test.processors,
        "starting test process"
    );

    if !cfg!(windows) {
        ensure_program_exists(&test.cmd, test.working_directory.as_deref())?;
    }

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&test.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&test.cmd);
        c
    };

    if let Some(dir) = &test.working_directory {
        cmd.current_dir(dir);
    }
    cmd.envs(resource_environment(&test.allocated_resources));
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning process for test '{}'", test.name))?;

    Ok(RunningTest {
        child,
        started: Instant::now(),
    })
}

/// Wait for a spawned test, enforcing its timeout, and report the outcome.
pub async fn wait_for_test(
    test: ScheduledTest,
    running: RunningTest,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let RunningTest { mut child, started } = running;

    // Drain both pipes concurrently so the child never blocks on a full buffer.
    let stdout = tokio::spawn(read_stream(child.stdout.take()));
    let stderr = tokio::spawn(read_stream(child.stderr.take()));

    let outcome = match test.timeout {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => outcome_from(&test, status),
            Err(_) => {
                warn!(test = %test.name, id = test.id, ?limit, "test timed out; killing process");
                if let Err(e) = child.kill().await {
                    warn!(test = %test.name, error = %e, "failed to kill timed-out test");
                }
                TestOutcome::TimedOut
            }
        },
        None => outcome_from(&test, child.wait().await),
    };
    let duration = started.elapsed();

    let mut output = String::new();
    for mut handle in [stdout, stderr] {
        match timeout(OUTPUT_GRACE, &mut handle).await {
            Ok(Ok(text)) => output.push_str(&text),
            Ok(Err(e)) => debug!(test = %test.name, error = %e, "output reader failed"),
            Err(_) => {
                debug!(test = %test.name, "output still open after exit; truncating");
                handle.abort();
            }
        }
    }

    if runtime_tx
        .send(RuntimeEvent::TestCompleted {
            id: test.id,
            outcome,
            duration,
            output,
        })
        .await
        .is_err()
    {
        error!(test = %test.name, id = test.id, "runtime gone; dropping test completion");
    }
}

/// The program a command line starts with, when it names a file.
///
/// Builtins and words the shell would still expand are left to the shell.
fn leading_program(cmd: &str) -> Option<&str> {
    let word = cmd.split_whitespace().next()?;
    let needs_shell = word.contains(|c: char| "$`'\"=(){}<>|;&*?[]~\\".contains(c));
    if needs_shell || SHELL_BUILTINS.contains(&word) {
        return None;
    }
    Some(word)
}

/// Fail unless the command's program can be found.
///
/// Paths are taken relative to the working directory, bare names are
/// looked up on `PATH`. A missing program would otherwise surface as the
/// shell's exit status 127.
fn ensure_program_exists(cmd: &str, working_directory: Option<&Path>) -> Result<()> {
    let Some(program) = leading_program(cmd) else {
        return Ok(());
    };

    let found = if program.contains('/') {
        let path = Path::new(program);
        match working_directory {
            Some(dir) if path.is_relative() => dir.join(path).is_file(),
            _ => path.is_file(),
        }
    } else {
        match std::env::var_os("PATH") {
            Some(paths) => std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()),
            None => true,
        }
    };

    if found {
        Ok(())
    } else {
        Err(TestschedError::ExecutableNotFound(program.to_string()))
    }
}

fn outcome_from(test: &ScheduledTest, status: std::io::Result<ExitStatus>) -> TestOutcome {
    match status {
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            info!(
                test = %test.name,
                id = test.id,
                exit_code = code,
                success = status.success(),
                "test process exited"
            );
            if status.success() {
                TestOutcome::Success
            } else {
                TestOutcome::Failed(code)
            }
        }
        Err(e) => {
            error!(test = %test.name, id = test.id, error = %e, "waiting for test process failed");
            TestOutcome::Failed(-1)
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stream.read_to_end(&mut buf).await {
        debug!(error = %e, "reading test output failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_and_shell_syntax_are_left_to_the_shell() {
        assert_eq!(leading_program("exit 3"), None);
        assert_eq!(leading_program("test -f data.txt"), None);
        assert_eq!(leading_program("FOO=1 ./run.sh"), None);
        assert_eq!(leading_program("$RUNNER --fast"), None);
        assert_eq!(leading_program(""), None);
        assert_eq!(leading_program("sleep 30"), Some("sleep"));
        assert_eq!(
            leading_program("  ./run_gpu_smoke.sh --all"),
            Some("./run_gpu_smoke.sh")
        );
    }

    #[cfg(unix)]
    #[test]
    fn programs_resolve_against_working_directory_and_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "exit 0\n").unwrap();

        assert!(ensure_program_exists("./run.sh --quick", Some(dir.path())).is_ok());
        assert!(ensure_program_exists("sh -c true", None).is_ok());
        assert!(ensure_program_exists("exit 0", Some(dir.path())).is_ok());

        assert!(matches!(
            ensure_program_exists("./missing.sh", Some(dir.path())),
            Err(TestschedError::ExecutableNotFound(p)) if p == "./missing.sh"
        ));
        assert!(matches!(
            ensure_program_exists("/definitely/not/a/binary_xyz --flag", None),
            Err(TestschedError::ExecutableNotFound(_))
        ));
        assert!(matches!(
            ensure_program_exists("no_such_program_for_testsched", None),
            Err(TestschedError::ExecutableNotFound(_))
        ));
    }
}
