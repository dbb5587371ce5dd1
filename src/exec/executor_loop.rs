// src/exec/executor_loop.rs

//! Main executor loop that manages running runner processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::engine::{RuntimeMessage, ScheduledRun};
use crate::exec::runner::run_execution;
use crate::ids::ExecutionId;

#[derive(Debug)]
pub enum ExecutorCommand {
    Start(ScheduledRun),
    Stop(ExecutionId),
}

/// Internal handle for a live runner process.
///
/// - `cancel` asks the runner task to terminate its process group.
/// - `handle` is the Tokio task supervising the process.
struct ActiveRun {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each run is supervised by its own Tokio task; runs share nothing, so any
/// number of them (including several of the same test case) proceed in
/// parallel. There is at most one process per execution id.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeMessage>,
    runner: RunnerConfig,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);
    let runner = Arc::new(runner);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<ExecutionId, ActiveRun> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, run| !run.handle.is_finished());
            match command {
                ExecutorCommand::Start(run) => start_run(run, &mut active, &runner, &runtime_tx),
                ExecutorCommand::Stop(execution_id) => stop_run(execution_id, &mut active),
            }
        }

        // Dropping the cancel senders stops every remaining runner.
        info!(remaining = active.len(), "executor loop finished (channel closed)");
    });

    tx
}

fn start_run(
    run: ScheduledRun,
    active: &mut HashMap<ExecutionId, ActiveRun>,
    runner: &Arc<RunnerConfig>,
    runtime_tx: &mpsc::Sender<RuntimeMessage>,
) {
    let execution_id = run.execution_id;
    if active.contains_key(&execution_id) {
        warn!(%execution_id, "runner already active for this execution; start ignored");
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let runner = Arc::clone(runner);

    let handle = tokio::spawn(async move {
        run_execution(run, runner, rt_tx, cancel_rx).await;
        debug!(%execution_id, "runner future finished");
    });

    active.insert(
        execution_id,
        ActiveRun {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn stop_run(execution_id: ExecutionId, active: &mut HashMap<ExecutionId, ActiveRun>) {
    let Some(run) = active.get_mut(&execution_id) else {
        debug!(%execution_id, "no live runner to stop");
        return;
    };

    match run.cancel.take() {
        Some(cancel) => {
            if cancel.send(()).is_err() {
                debug!(%execution_id, "runner already finished while stopping");
            }
        }
        None => debug!(%execution_id, "runner already being stopped"),
    }
}
