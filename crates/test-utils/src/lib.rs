pub mod builders;
pub mod fake_executor;

use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

use healtrack::engine::{
    CoreRuntime, EngineHandle, Runtime, RuntimeMessage, RuntimeOptions, Watchdogs,
};
use healtrack::errors::Result;
use healtrack::exec::ExecutorBackend;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A running engine wired to a test executor.
pub struct TestEngine {
    pub handle: EngineHandle,
    pub task: JoinHandle<Result<()>>,
}

/// Start core + runtime + watchdogs around the executor built by
/// `make_executor`, which receives the runtime's sender.
pub fn start_engine<E, F>(options: RuntimeOptions, make_executor: F) -> TestEngine
where
    E: ExecutorBackend + 'static,
    F: FnOnce(mpsc::Sender<RuntimeMessage>) -> E,
{
    let (tx, rx) = mpsc::channel::<RuntimeMessage>(256);
    let executor = make_executor(tx.clone());
    let watchdogs = Watchdogs::new(options.watchdog_timeout, tx.downgrade());
    let runtime = Runtime::new(CoreRuntime::new(options), rx, executor, watchdogs);

    TestEngine {
        handle: EngineHandle::new(tx),
        task: tokio::spawn(runtime.run()),
    }
}

/// Options with a watchdog long enough to never fire during a test.
pub fn quiet_options() -> RuntimeOptions {
    RuntimeOptions {
        watchdog_timeout: Duration::from_secs(3600),
        ..RuntimeOptions::default()
    }
}
