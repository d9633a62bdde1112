//! Shared helpers for the `testsched` integration tests.

pub mod builders;
pub mod fake_executor;

pub use builders::{SuiteBuilder, TestConfigBuilder};
pub use fake_executor::{ExecEvent, ExecLog, FakeExecutor};

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for a whole scheduling run driven by a fake executor.
pub const RUN_DEADLINE: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test subscriber once per test binary.
///
/// Output is captured per test and only shown for failures (or with
/// `--nocapture`). The filter comes from `TESTSCHED_LOG`, then `RUST_LOG`,
/// then `info`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("TESTSCHED_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing if it takes longer than [`RUN_DEADLINE`].
pub async fn within_deadline<F, T>(f: F) -> anyhow::Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(RUN_DEADLINE, f)
        .await
        .map_err(|_| anyhow::anyhow!("run did not finish within {RUN_DEADLINE:?}"))
}
