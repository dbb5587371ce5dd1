// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dashboard::FeedEvent;
use crate::errors::Result;
use crate::events::PushEvent;
use crate::exec::ExecutorBackend;
use crate::ids::{ExecutionId, HealingId};
use crate::stream::Multiplexer;

use super::core::CoreRuntime;
use super::watchdog::Watchdogs;
use super::{CoreCommand, RuntimeEvent, RuntimeMessage, RuntimeQuery};

/// Drives the core in response to [`RuntimeMessage`]s and performs the IO
/// the core asks for.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// tracking semantics. It owns the push-channel multiplexers, the watchdog
/// timers and the executor backend, and it is the only task that touches
/// any of them.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeMessage>,
    executor: E,
    watchdogs: Watchdogs,
    executions: Multiplexer<ExecutionId, PushEvent>,
    healing: Multiplexer<HealingId, FeedEvent>,
    feed: Multiplexer<(), FeedEvent>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("watchdogs", &self.watchdogs)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeMessage>,
        executor: E,
        watchdogs: Watchdogs,
    ) -> Self {
        let mut feed = Multiplexer::new();
        feed.open(());

        Self {
            core,
            event_rx,
            executor,
            watchdogs,
            executions: Multiplexer::new(),
            healing: Multiplexer::new(),
            feed,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeMessage`s from `event_rx`.
    /// - Feeds events into the core runtime and answers queries.
    /// - Executes commands returned by the core (publish, spawn, kill, exit).
    pub async fn run(mut self) -> Result<()> {
        info!("healtrack runtime started");

        loop {
            let message = match self.event_rx.recv().await {
                Some(m) => m,
                None => {
                    info!("runtime channel closed; exiting");
                    break;
                }
            };

            let keep_running = match message {
                RuntimeMessage::Event(event) => self.dispatch(event).await?,
                RuntimeMessage::Query(query) => self.answer(query).await?,
            };

            if !keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        // Subscribers see end-of-stream; runners are killed on drop.
        self.watchdogs.disarm_all();
        self.executions.close_all();
        self.healing.close_all();
        self.feed.close_all();

        info!("runtime exiting");
        Ok(())
    }

    async fn dispatch(&mut self, event: RuntimeEvent) -> Result<bool> {
        debug!(?event, "runtime received event");

        if let RuntimeEvent::WatchdogElapsed { execution_id } = &event {
            self.watchdogs.forget(execution_id);
        }

        let step = self.core.step(event);
        for command in step.commands {
            self.execute_command(command).await?;
        }

        Ok(step.keep_running)
    }

    async fn answer(&mut self, query: RuntimeQuery) -> Result<bool> {
        match query {
            RuntimeQuery::Snapshot { reply } => {
                let _ = reply.send(self.core.snapshot());
            }
            RuntimeQuery::Execution {
                execution_id,
                reply,
            } => {
                let _ = reply.send(self.core.execution(&execution_id).cloned());
            }
            RuntimeQuery::SubscribeExecution {
                execution_id,
                reply,
            } => {
                let subscription = self
                    .executions
                    .subscribe_with_greeting(execution_id, PushEvent::Connected { execution_id });
                if subscription.is_ok() {
                    self.dispatch(RuntimeEvent::SubscriberConnected { execution_id })
                        .await?;
                }
                let _ = reply.send(subscription);
            }
            RuntimeQuery::StartSubscribed { runs, reply } => {
                let mut subscriptions = Vec::with_capacity(runs.len());
                let mut keep_running = true;
                for (execution_id, request) in runs {
                    keep_running &= self
                        .dispatch(RuntimeEvent::ExecutionRequested {
                            execution_id,
                            request,
                        })
                        .await?;
                    let subscription = self.executions.subscribe_with_greeting(
                        execution_id,
                        PushEvent::Connected { execution_id },
                    );
                    if subscription.is_ok() {
                        self.dispatch(RuntimeEvent::SubscriberConnected { execution_id })
                            .await?;
                    }
                    subscriptions.push(subscription);
                }
                let _ = reply.send(subscriptions);
                return Ok(keep_running);
            }
            RuntimeQuery::SubscribeHealing { healing_id, reply } => {
                let _ = reply.send(self.healing.subscribe(healing_id));
            }
            RuntimeQuery::SubscribeFeed { reply } => {
                let _ = reply.send(self.feed.subscribe(()));
            }
        }
        Ok(true)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::OpenExecutionChannel(id) => {
                self.executions.open(id);
            }
            CoreCommand::PublishExecution(id, event) => {
                let reached = self.executions.publish(id, event);
                debug!(execution_id = %id, subscribers = reached, "execution event published");
            }
            CoreCommand::CloseExecutionChannel(id) => {
                self.executions.close(id);
            }
            CoreCommand::ForgetExecutionChannel(id) => {
                self.executions.forget(&id);
            }
            CoreCommand::OpenHealingChannel(id) => {
                self.healing.open(id);
            }
            CoreCommand::PublishHealing(id, event) => {
                self.healing.publish(id, event);
            }
            CoreCommand::CloseHealingChannel(id) => {
                self.healing.close(id);
            }
            CoreCommand::PublishFeed(event) => {
                self.feed.publish((), event);
            }
            CoreCommand::SpawnRunner(run) => {
                debug!(execution_id = %run.execution_id, "spawning runner");
                self.executor.spawn_runner(run).await?;
            }
            CoreCommand::KillRunner(id) => {
                self.executor.stop_runner(id).await?;
            }
            CoreCommand::ArmWatchdog(id) => {
                self.watchdogs.arm(id);
            }
            CoreCommand::DisarmWatchdog(id) => {
                self.watchdogs.disarm(&id);
            }
            CoreCommand::RequestExit => {
                // keep_running=false already ends the loop.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }
}
