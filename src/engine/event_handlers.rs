// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dashboard::{DashboardCounters, FeedEvent, aggregate};
use crate::engine::{RuntimeOptions, ScheduledRun};
use crate::events::{PushEvent, RunnerExit};
use crate::executions::{ExecutionRecord, ExecutionRequest, ExecutionStore, SyntheticFinish};
use crate::healing::{HealingEvent, HealingReconciler, ReconcileKind};
use crate::ids::{ExecutionId, HealingId};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    OpenExecutionChannel(ExecutionId),
    PublishExecution(ExecutionId, PushEvent),
    CloseExecutionChannel(ExecutionId),
    /// Drop every trace of a closed channel whose record was evicted.
    ForgetExecutionChannel(ExecutionId),
    OpenHealingChannel(HealingId),
    PublishHealing(HealingId, FeedEvent),
    CloseHealingChannel(HealingId),
    /// Publish on the dashboard feed.
    PublishFeed(FeedEvent),
    /// Start the test runner for a freshly accepted execution.
    SpawnRunner(ScheduledRun),
    /// Terminate the runner's process group.
    KillRunner(ExecutionId),
    ArmWatchdog(ExecutionId),
    DisarmWatchdog(ExecutionId),
    /// Request that the process exits (used for `--run` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn new(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

fn status_feed(record: &ExecutionRecord, counters: DashboardCounters) -> CoreCommand {
    CoreCommand::PublishFeed(FeedEvent::ExecutionStatus {
        execution_id: record.execution_id,
        status: record.status,
        summary: record.summary.clone(),
        counters,
    })
}

/// Accept a run: record it, open its channel, arm the watchdog, start the runner.
pub fn handle_execution_requested(
    store: &mut ExecutionStore,
    options: &RuntimeOptions,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    request: ExecutionRequest,
    now: DateTime<Utc>,
) -> CoreStep {
    if store.get(&execution_id).is_some() {
        warn!(%execution_id, "duplicate execution id; request ignored");
        return CoreStep::empty();
    }

    let report_hint = options.report_hint(execution_id);
    let record = ExecutionRecord::new(execution_id, &request, report_hint.clone(), now);

    info!(
        %execution_id,
        test = %record.test_key,
        mode = %request.mode,
        browser = %request.browser,
        "execution accepted"
    );

    let feed = status_feed(&record, counters);
    store.insert(record);

    CoreStep::new(vec![
        CoreCommand::OpenExecutionChannel(execution_id),
        CoreCommand::ArmWatchdog(execution_id),
        CoreCommand::SpawnRunner(ScheduledRun {
            execution_id,
            request,
            report_hint,
        }),
        feed,
    ])
}

pub fn handle_subscriber_connected(
    store: &mut ExecutionStore,
    counters: DashboardCounters,
    execution_id: ExecutionId,
) -> CoreStep {
    let Some(record) = store.get_mut(&execution_id) else {
        return CoreStep::empty();
    };
    if !record.mark_connected() {
        return CoreStep::empty();
    }

    debug!(%execution_id, "first subscriber connected");
    CoreStep::new(vec![status_feed(record, counters)])
}

/// Apply a normalized runner event to its execution.
///
/// The first delivered event disarms the watchdog. A terminal event closes
/// the push channel after it has been published.
pub fn handle_runner_event(
    store: &mut ExecutionStore,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    event: PushEvent,
    now: DateTime<Utc>,
) -> CoreStep {
    let Some(record) = store.get_mut(&execution_id) else {
        debug!(%execution_id, kind = event.event_type(), "event for unknown execution dropped");
        return CoreStep::empty();
    };

    if record.is_terminal() {
        debug!(
            %execution_id,
            kind = event.event_type(),
            status = ?record.status,
            "event after terminal status dropped"
        );
        return CoreStep::empty();
    }

    let first = record.events_delivered == 0;
    let changed = record.apply(&event, now);
    let terminal = event.is_terminal();

    let mut commands = Vec::new();
    if first || terminal {
        commands.push(CoreCommand::DisarmWatchdog(execution_id));
    }
    commands.push(CoreCommand::PublishExecution(execution_id, event));
    if terminal {
        info!(
            %execution_id,
            status = ?record.status,
            summary = record.summary.as_deref().unwrap_or(""),
            "execution finished"
        );
        commands.push(CoreCommand::CloseExecutionChannel(execution_id));
    }
    if changed {
        commands.push(status_feed(record, counters));
    }

    CoreStep::new(commands)
}

pub fn handle_runner_exited(
    store: &mut ExecutionStore,
    execution_id: ExecutionId,
    exit: RunnerExit,
) -> CoreStep {
    let Some(record) = store.get_mut(&execution_id) else {
        return CoreStep::empty();
    };

    if record.exit_code.is_none() {
        record.exit_code = exit.code;
    }
    if record.is_terminal() {
        debug!(%execution_id, %exit, "runner exited");
    } else {
        warn!(%execution_id, %exit, "runner exited without a terminal event");
    }

    CoreStep::empty()
}

/// Synthesize a terminal result for a run the runner never reported on.
fn finish_synthetic(
    store: &mut ExecutionStore,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    kind: SyntheticFinish,
    detail: &str,
    now: DateTime<Utc>,
) -> CoreStep {
    let Some(record) = store.get_mut(&execution_id) else {
        return CoreStep::empty();
    };
    if record.is_terminal() {
        return CoreStep::empty();
    }

    warn!(%execution_id, reason = kind.describe(), "closing execution without runner result");

    // A runner that never reported is presumed hung.
    let mut commands = vec![
        CoreCommand::KillRunner(execution_id),
        CoreCommand::DisarmWatchdog(execution_id),
    ];
    for event in record.finish_synthetic(kind, detail, now) {
        commands.push(CoreCommand::PublishExecution(execution_id, event));
    }
    commands.push(CoreCommand::CloseExecutionChannel(execution_id));
    commands.push(status_feed(record, counters));

    CoreStep::new(commands)
}

/// The watchdog fired. Only acts if no runner event was ever delivered.
pub fn handle_watchdog_elapsed(
    store: &mut ExecutionStore,
    options: &RuntimeOptions,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    now: DateTime<Utc>,
) -> CoreStep {
    match store.get(&execution_id) {
        Some(record) if !record.is_terminal() && record.events_delivered == 0 => {}
        _ => {
            debug!(%execution_id, "watchdog elapsed after progress; ignored");
            return CoreStep::empty();
        }
    }

    let detail = format!(
        "no progress from the test runner within {}s",
        options.watchdog_timeout.as_secs_f64()
    );
    finish_synthetic(
        store,
        counters,
        execution_id,
        SyntheticFinish::TimeoutFallback,
        &detail,
        now,
    )
}

pub fn handle_force_complete(
    store: &mut ExecutionStore,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    now: DateTime<Utc>,
) -> CoreStep {
    finish_synthetic(
        store,
        counters,
        execution_id,
        SyntheticFinish::Forced,
        "completed by operator",
        now,
    )
}

/// Stop a run: publish the stop notice, close the channel, kill the runner.
pub fn handle_stop(
    store: &mut ExecutionStore,
    counters: DashboardCounters,
    execution_id: ExecutionId,
    now: DateTime<Utc>,
) -> CoreStep {
    let Some(record) = store.get_mut(&execution_id) else {
        return CoreStep::empty();
    };
    if record.is_terminal() {
        debug!(%execution_id, status = ?record.status, "stop for finished execution ignored");
        return CoreStep::empty();
    }

    info!(%execution_id, "stopping execution");
    let notice = record.stop(now);

    CoreStep::new(vec![
        CoreCommand::KillRunner(execution_id),
        CoreCommand::DisarmWatchdog(execution_id),
        CoreCommand::PublishExecution(execution_id, notice),
        CoreCommand::CloseExecutionChannel(execution_id),
        status_feed(record, counters),
    ])
}

/// Reconcile a healing notification and fan the result out.
pub fn handle_healing_notification(
    healing: &mut HealingReconciler,
    event: HealingEvent,
    now: DateTime<Utc>,
) -> CoreStep {
    let outcome = healing.apply(event, now);
    if !outcome.changed() {
        return CoreStep::empty();
    }

    let Some(record) = healing.get(&outcome.healing_id).cloned() else {
        return CoreStep::empty();
    };
    let counters = aggregate(healing.records(), healing.active());
    let id = outcome.healing_id;
    let update = FeedEvent::LocatorFix { record, counters };

    let mut commands = Vec::new();
    if outcome.kind == ReconcileKind::Created {
        commands.push(CoreCommand::OpenHealingChannel(id));
    }
    commands.push(CoreCommand::PublishHealing(id, update.clone()));
    commands.push(CoreCommand::PublishFeed(update));
    if outcome.became_terminal {
        commands.push(CoreCommand::CloseHealingChannel(id));
    }

    CoreStep::new(commands)
}
