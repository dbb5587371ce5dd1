// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can swap in a fake executor that emits scripted runner events
//! without spawning processes.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::config::RunnerConfig;
use crate::engine::{RuntimeMessage, ScheduledRun};
use crate::errors::{Error, Result};
use crate::ids::ExecutionId;

use super::executor_loop::{ExecutorCommand, spawn_executor};

/// How runner processes are started and stopped.
pub trait ExecutorBackend: Send {
    /// Start the runner for a freshly accepted execution.
    fn spawn_runner(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Forcefully stop the runner. Must not produce further runner events
    /// for this execution.
    fn stop_runner(
        &mut self,
        execution_id: ExecutionId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
///
/// Forwards commands to the background loop started by [`spawn_executor`].
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeMessage>, runner: RunnerConfig) -> Self {
        let tx = spawn_executor(runtime_tx, runner);
        Self { tx }
    }

    fn forward(
        &self,
        command: ExecutorCommand,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();
        Box::pin(async move {
            tx.send(command).await.map_err(Error::from)?;
            Ok(())
        })
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_runner(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.forward(ExecutorCommand::Start(run))
    }

    fn stop_runner(
        &mut self,
        execution_id: ExecutionId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.forward(ExecutorCommand::Stop(execution_id))
    }
}
