// src/lib.rs

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod executions;
pub mod healing;
pub mod ids;
pub mod logging;
pub mod server;
pub mod stream;
pub mod types;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_or_default};
use crate::engine::{
    CoreRuntime, EngineHandle, Runtime, RuntimeMessage, RuntimeOptions, Watchdogs,
};
use crate::events::PushEvent;
use crate::exec::RealExecutorBackend;
use crate::executions::ExecutionRequest;
use crate::ids::ExecutionId;
use crate::stream::Subscription;

/// Exit code of `--run` when at least one run did not pass.
pub const EXIT_TESTS_FAILED: i32 = 2;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading
/// - core / runtime / watchdogs
/// - executor
/// - either the HTTP server or the one-shot `--run` mode
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut cfg = load_or_default(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;

    if let Some(bind) = &args.bind {
        cfg.bind = bind
            .parse()
            .with_context(|| format!("--bind '{bind}' is not a socket address"))?;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(0);
    }

    let run_once = !args.runs.is_empty();

    // Runtime message channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeMessage>(256);

    // Process executor backend (real implementation in production).
    let executor = RealExecutorBackend::new(rt_tx.clone(), cfg.runner.clone());
    let watchdogs = Watchdogs::new(cfg.watchdog_timeout, rt_tx.downgrade());

    let options = RuntimeOptions {
        exit_when_idle: run_once,
        retain_finished: cfg.retain_finished,
        watchdog_timeout: cfg.watchdog_timeout,
        report_url_template: cfg.runner.report_url_template.clone(),
    };

    // Construct the pure core and the async IO shell around it.
    let core = CoreRuntime::new(options);
    let runtime = Runtime::new(core, rt_rx, executor, watchdogs);
    let handle = EngineHandle::new(rt_tx);
    let runtime_task = tokio::spawn(runtime.run());

    if run_once {
        // Ctrl-C → graceful shutdown.
        let shutdown = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; shutting down");
            let _ = shutdown.shutdown().await;
        });

        let requests: Vec<ExecutionRequest> = args
            .runs
            .into_iter()
            .map(|spec| spec.into_request(args.mode, args.browser))
            .collect();
        let code = run_and_report(&handle, requests).await?;
        drop(handle);
        runtime_task.await.context("runtime task panicked")??;
        return Ok(code);
    }

    let shutdown = handle.clone();
    server::serve(cfg.bind, handle, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
        }
        info!("Ctrl+C received; shutting down");
        let _ = shutdown.shutdown().await;
    })
    .await?;

    runtime_task.await.context("runtime task panicked")??;
    Ok(0)
}

/// Start `requests`, print every push event as one JSON line on stdout and
/// return the exit code once all runs are terminal.
async fn run_and_report(handle: &EngineHandle, requests: Vec<ExecutionRequest>) -> Result<i32> {
    let started = handle.start_subscribed(requests).await?;
    info!(runs = started.len(), "runs started");

    let outcomes = join_all(
        started
            .into_iter()
            .map(|(id, subscription)| print_events(id, subscription)),
    )
    .await;

    let failed = outcomes.iter().filter(|passed| !**passed).count();
    if failed == 0 {
        info!("all runs passed");
        Ok(0)
    } else {
        warn!(failed, "some runs did not pass");
        Ok(EXIT_TESTS_FAILED)
    }
}

/// Returns whether the run passed.
async fn print_events(execution_id: ExecutionId, mut subscription: Subscription<PushEvent>) -> bool {
    let mut passed = false;
    while let Some(event) = subscription.recv().await {
        if let PushEvent::TestFinished { success, .. } = &event {
            passed = *success;
        }
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%execution_id, error = %err, "event not serializable"),
        }
    }
    debug!(%execution_id, passed, "push channel closed");
    passed
}

/// Print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("healtrack dry-run");
    println!("  server.bind = {}", cfg.bind);
    println!("  runner.program = {}", cfg.runner.program);
    println!("  runner.args = {:?}", cfg.runner.args);
    if !cfg.runner.headed_args.is_empty() {
        println!("  runner.headed_args = {:?}", cfg.runner.headed_args);
    }
    if let Some(ref dir) = cfg.runner.working_dir {
        println!("  runner.working_dir = {}", dir.display());
    }
    println!(
        "  runner.forward_plain_output = {}",
        cfg.runner.forward_plain_output
    );
    if let Some(ref dir) = cfg.runner.artifacts_dir {
        println!("  runner.artifacts_dir = {}", dir.display());
    }
    if let Some(ref template) = cfg.runner.report_url_template {
        println!("  runner.report_url_template = {template}");
    }
    println!("  runner.stop_grace = {:?}", cfg.runner.stop_grace);
    println!("  watchdog.timeout = {:?}", cfg.watchdog_timeout);
    println!("  history.retain_finished = {}", cfg.retain_finished);

    debug!("dry-run complete (no execution)");
}
