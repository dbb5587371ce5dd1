// src/exec/runner.rs

//! One test runner process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::engine::{RuntimeEvent, RuntimeMessage, ScheduledRun};
use crate::events::{Artifacts, Normalizer, PushEvent, RunnerExit};
use crate::exec::artifacts::collect_artifacts;
use crate::exec::command::build_command;
use crate::ids::ExecutionId;

/// Run the test runner for one execution, forwarding normalized stdout
/// events to the runtime.
///
/// - When the process exits on its own, a terminal event is synthesized if
///   the runner did not report one, then `RunnerExited` is sent.
/// - If the cancel channel fires (operator stop), the process group is
///   terminated and **no** further event is sent for this execution.
/// - If the process cannot be started, a terminal `error` event is sent.
pub async fn run_execution(
    run: ScheduledRun,
    runner: Arc<RunnerConfig>,
    runtime_tx: mpsc::Sender<RuntimeMessage>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let execution_id = run.execution_id;
    if let Err(err) = run_execution_inner(run, &runner, &runtime_tx, cancel_rx).await {
        error!(%execution_id, error = %format!("{err:#}"), "test runner error");
        let _ = send_event(
            &runtime_tx,
            execution_id,
            PushEvent::Error {
                message: format!("failed to run test runner: {err:#}"),
            },
        )
        .await;
    }
}

async fn send_event(
    runtime_tx: &mpsc::Sender<RuntimeMessage>,
    execution_id: ExecutionId,
    event: PushEvent,
) -> Result<()> {
    runtime_tx
        .send(RuntimeMessage::Event(RuntimeEvent::RunnerEvent {
            execution_id,
            event,
        }))
        .await
        .context("runtime loop is gone")
}

async fn run_execution_inner(
    run: ScheduledRun,
    runner: &RunnerConfig,
    runtime_tx: &mpsc::Sender<RuntimeMessage>,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let execution_id = run.execution_id;
    info!(
        %execution_id,
        program = %runner.program,
        test = %run.request.test_key(),
        "starting test runner"
    );

    let mut child = build_command(runner, &run)
        .spawn()
        .with_context(|| format!("spawning '{}'", runner.program))?;

    let stdout = child
        .stdout
        .take()
        .context("runner stdout was not captured")?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf).await {
                debug!(%execution_id, "stderr: {}", line);
            }
        });
    }

    let mut normalizer = Normalizer::new(
        execution_id,
        runner.forward_plain_output,
        run.report_hint.clone(),
    );
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    // Read stdout to EOF, then wait for the exit status. A cancellation
    // request wins at either point.
    loop {
        tokio::select! {
            line = read_line_lossy(&mut reader, &mut buf) => match line {
                Ok(Some(line)) => {
                    if let Some(event) = normalizer.push_line(&line) {
                        send_event(runtime_tx, execution_id, event).await?;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(%execution_id, error = %err, "reading runner stdout failed");
                    break;
                }
            },
            _ = &mut cancel_rx => {
                terminate(&mut child, runner.stop_grace, execution_id).await;
                return Ok(());
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => status.context("waiting for test runner")?,
        _ = &mut cancel_rx => {
            terminate(&mut child, runner.stop_grace, execution_id).await;
            return Ok(());
        }
    };

    let exit = RunnerExit::from_status(status);
    info!(%execution_id, %exit, "test runner exited");

    let artifacts = if !normalizer.terminal_seen() && exit.success() {
        collect_artifacts(runner.artifacts_dir.as_deref(), execution_id)
    } else {
        Artifacts::default()
    };
    if let Some(event) = normalizer.finish(exit, artifacts) {
        send_event(runtime_tx, execution_id, event).await?;
    }

    runtime_tx
        .send(RuntimeMessage::Event(RuntimeEvent::RunnerExited {
            execution_id,
            exit,
        }))
        .await
        .context("runtime loop is gone")?;

    Ok(())
}

/// Read one line, replacing invalid UTF-8 instead of failing on it.
///
/// Returns `None` at EOF. The line terminator is stripped.
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// SIGTERM to the runner's process group, then SIGKILL after `grace`.
///
/// A dropped cancel sender (executor shutting down) is treated the same as
/// an explicit stop.
async fn terminate(child: &mut Child, grace: Duration, execution_id: ExecutionId) {
    info!(%execution_id, ?grace, "stopping test runner");

    #[cfg(unix)]
    signal_group(child, nix::sys::signal::Signal::SIGTERM, execution_id);
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        debug!(%execution_id, "test runner stopped within grace period");
        return;
    }

    warn!(%execution_id, "test runner ignored SIGTERM; killing");
    #[cfg(unix)]
    signal_group(child, nix::sys::signal::Signal::SIGKILL, execution_id);
    if let Err(err) = child.kill().await {
        warn!(%execution_id, error = %err, "failed to kill test runner");
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal, execution_id: ExecutionId) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), signal) {
        debug!(%execution_id, ?signal, error = %err, "signalling runner process group failed");
    }
}
