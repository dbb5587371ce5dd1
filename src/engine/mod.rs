// src/engine/mod.rs

//! Execution tracking engine.
//!
//! All state (execution records, healing records, the active set) lives in
//! one place and changes in one place:
//!
//! - [`core`] is a synchronous, deterministic state machine. It consumes one
//!   [`RuntimeEvent`] at a time and returns commands; it has no channels,
//!   timers or processes.
//! - [`runtime`] is the async shell. It owns the core, the push-channel
//!   multiplexers and the watchdog timers, reads [`RuntimeMessage`]s from a
//!   single mpsc channel, and executes the core's commands.
//! - [`handle`] is the cloneable API used by the CLI and the HTTP server.
//!
//! Because every mutation goes through the one loop, two notifications for
//! the same execution or healing attempt can never interleave.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::dashboard::{DashboardSnapshot, FeedEvent};
use crate::events::{PushEvent, RunnerExit};
use crate::executions::{ExecutionRecord, ExecutionRequest};
use crate::healing::HealingEvent;
use crate::ids::{ExecutionId, HealingId};
use crate::stream::{StreamError, Subscription};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;
pub mod watchdog;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::EngineHandle;
pub use runtime::Runtime;
pub use watchdog::Watchdogs;

/// Options shared by the core and the async shell.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Stop the runtime once every accepted execution is terminal
    /// (used for `--run`).
    pub exit_when_idle: bool,
    /// Finished execution records kept in memory.
    pub retain_finished: usize,
    /// Watchdog timeout, used in the fallback message.
    pub watchdog_timeout: Duration,
    /// Report location template with an `{execution_id}` placeholder.
    pub report_url_template: Option<String>,
}

impl RuntimeOptions {
    pub fn report_hint(&self, execution_id: ExecutionId) -> Option<String> {
        self.report_url_template
            .as_ref()
            .map(|t| t.replace("{execution_id}", &execution_id.to_string()))
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            exit_when_idle: false,
            retain_finished: 200,
            watchdog_timeout: Duration::from_secs(30),
            report_url_template: None,
        }
    }
}

/// A run the executor should start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRun {
    pub execution_id: ExecutionId,
    pub request: ExecutionRequest,
    pub report_hint: Option<String>,
}

/// State-changing events flowing into the core.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A run was accepted under a freshly generated id.
    ExecutionRequested {
        execution_id: ExecutionId,
        request: ExecutionRequest,
    },
    /// A normalized runner event (including synthesized terminal events).
    RunnerEvent {
        execution_id: ExecutionId,
        event: PushEvent,
    },
    /// The runner process exited on its own.
    RunnerExited {
        execution_id: ExecutionId,
        exit: RunnerExit,
    },
    /// A subscriber attached to the execution's push channel.
    SubscriberConnected { execution_id: ExecutionId },
    WatchdogElapsed { execution_id: ExecutionId },
    ForceCompleteRequested { execution_id: ExecutionId },
    StopRequested { execution_id: ExecutionId },
    HealingNotified { event: HealingEvent },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Read requests and subscriptions, answered by the runtime loop.
#[derive(Debug)]
pub enum RuntimeQuery {
    Snapshot {
        reply: oneshot::Sender<DashboardSnapshot>,
    },
    Execution {
        execution_id: ExecutionId,
        reply: oneshot::Sender<Option<ExecutionRecord>>,
    },
    SubscribeExecution {
        execution_id: ExecutionId,
        reply: oneshot::Sender<Result<Subscription<PushEvent>, StreamError>>,
    },
    /// Accept a batch of runs and subscribe to each in one loop iteration,
    /// so that no event is published before its subscription exists and
    /// no run finishes before the whole batch is accepted.
    StartSubscribed {
        runs: Vec<(ExecutionId, ExecutionRequest)>,
        reply: oneshot::Sender<Vec<Result<Subscription<PushEvent>, StreamError>>>,
    },
    SubscribeHealing {
        healing_id: HealingId,
        reply: oneshot::Sender<Result<Subscription<FeedEvent>, StreamError>>,
    },
    SubscribeFeed {
        reply: oneshot::Sender<Result<Subscription<FeedEvent>, StreamError>>,
    },
}

/// Everything the runtime loop receives.
#[derive(Debug)]
pub enum RuntimeMessage {
    Event(RuntimeEvent),
    Query(RuntimeQuery),
}

impl From<RuntimeEvent> for RuntimeMessage {
    fn from(event: RuntimeEvent) -> Self {
        RuntimeMessage::Event(event)
    }
}

impl From<RuntimeQuery> for RuntimeMessage {
    fn from(query: RuntimeQuery) -> Self {
        RuntimeMessage::Query(query)
    }
}
