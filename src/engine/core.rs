// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (execution records, healing records)
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from the channel, publishing on push channels, starting and
//! killing runners and arming watchdog timers.
//!
//! The core is unit tested without any Tokio, channels or processes.

use chrono::{DateTime, Utc};

use crate::dashboard::{DashboardCounters, DashboardSnapshot, aggregate};
use crate::engine::event_handlers::{
    CoreCommand, CoreStep, handle_execution_requested, handle_force_complete,
    handle_healing_notification, handle_runner_event, handle_runner_exited, handle_stop,
    handle_subscriber_connected, handle_watchdog_elapsed,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::executions::{ExecutionRecord, ExecutionStore};
use crate::healing::HealingReconciler;
use crate::ids::ExecutionId;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    executions: ExecutionStore,
    healing: HealingReconciler,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            executions: ExecutionStore::new(options.retain_finished),
            healing: HealingReconciler::new(),
            options,
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn executions(&self) -> &ExecutionStore {
        &self.executions
    }

    pub fn healing(&self) -> &HealingReconciler {
        &self.healing
    }

    pub fn execution(&self, id: &ExecutionId) -> Option<&ExecutionRecord> {
        self.executions.get(id)
    }

    pub fn counters(&self) -> DashboardCounters {
        aggregate(self.healing.records(), self.healing.active())
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            counters: self.counters(),
            executions_in_flight: self.executions.in_flight(),
            healing: self.healing.records().to_vec(),
            executions: self.executions.iter().cloned().collect(),
        }
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        self.step_at(event, Utc::now())
    }

    /// [`CoreRuntime::step`] with an explicit clock.
    pub fn step_at(&mut self, event: RuntimeEvent, now: DateTime<Utc>) -> CoreStep {
        let counters = self.counters();

        let mut step = match event {
            RuntimeEvent::ExecutionRequested {
                execution_id,
                request,
            } => handle_execution_requested(
                &mut self.executions,
                &self.options,
                counters,
                execution_id,
                request,
                now,
            ),
            RuntimeEvent::RunnerEvent {
                execution_id,
                event,
            } => handle_runner_event(&mut self.executions, counters, execution_id, event, now),
            RuntimeEvent::RunnerExited { execution_id, exit } => {
                handle_runner_exited(&mut self.executions, execution_id, exit)
            }
            RuntimeEvent::SubscriberConnected { execution_id } => {
                handle_subscriber_connected(&mut self.executions, counters, execution_id)
            }
            RuntimeEvent::WatchdogElapsed { execution_id } => handle_watchdog_elapsed(
                &mut self.executions,
                &self.options,
                counters,
                execution_id,
                now,
            ),
            RuntimeEvent::ForceCompleteRequested { execution_id } => {
                handle_force_complete(&mut self.executions, counters, execution_id, now)
            }
            RuntimeEvent::StopRequested { execution_id } => {
                handle_stop(&mut self.executions, counters, execution_id, now)
            }
            RuntimeEvent::HealingNotified { event } => {
                handle_healing_notification(&mut self.healing, event, now)
            }
            RuntimeEvent::ShutdownRequested => {
                return CoreStep {
                    commands: vec![CoreCommand::RequestExit],
                    keep_running: false,
                };
            }
        };

        // Evicted runs can no longer be looked up, so their closed channels
        // need not be remembered either.
        for execution_id in self.executions.prune_finished() {
            step.commands.push(CoreCommand::ForgetExecutionChannel(execution_id));
        }

        // In `--run` mode, exit once every accepted run is terminal.
        if self.options.exit_when_idle
            && !self.executions.is_empty()
            && self.executions.all_terminal()
        {
            step.keep_running = false;
            step.commands.push(CoreCommand::RequestExit);
        }

        step
    }
}
