// src/engine/handle.rs

//! Cloneable front door to the runtime loop.

use tokio::sync::{mpsc, oneshot};

use crate::dashboard::{DashboardSnapshot, FeedEvent};
use crate::engine::{RuntimeEvent, RuntimeMessage, RuntimeQuery};
use crate::errors::{HealtrackError, Result};
use crate::events::PushEvent;
use crate::executions::{ExecutionRecord, ExecutionRequest};
use crate::healing::HealingEvent;
use crate::ids::{ExecutionId, HealingId};
use crate::stream::Subscription;

/// Used by the HTTP server and the CLI. Every call is a message to the
/// runtime loop; a closed loop surfaces as [`HealtrackError::EngineUnavailable`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<RuntimeMessage>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<RuntimeMessage>) -> Self {
        Self { tx }
    }

    async fn send(&self, message: impl Into<RuntimeMessage>) -> Result<()> {
        self.tx
            .send(message.into())
            .await
            .map_err(|_| HealtrackError::EngineUnavailable)
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RuntimeQuery,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| HealtrackError::EngineUnavailable)
    }

    /// Accept one run. The runner starts as soon as the loop processes it.
    pub async fn start(&self, request: ExecutionRequest) -> Result<ExecutionId> {
        let execution_id = ExecutionId::new();
        self.send(RuntimeEvent::ExecutionRequested {
            execution_id,
            request,
        })
        .await?;
        Ok(execution_id)
    }

    /// Accept several runs; ids are returned in request order.
    pub async fn start_bulk(&self, requests: Vec<ExecutionRequest>) -> Result<Vec<ExecutionId>> {
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            ids.push(self.start(request).await?);
        }
        Ok(ids)
    }

    /// Accept runs and subscribe to each before any of them can publish.
    pub async fn start_subscribed(
        &self,
        requests: Vec<ExecutionRequest>,
    ) -> Result<Vec<(ExecutionId, Subscription<PushEvent>)>> {
        let runs: Vec<(ExecutionId, ExecutionRequest)> = requests
            .into_iter()
            .map(|request| (ExecutionId::new(), request))
            .collect();
        let ids: Vec<ExecutionId> = runs.iter().map(|(id, _)| *id).collect();

        let subscriptions = self
            .ask(|reply| RuntimeQuery::StartSubscribed { runs, reply })
            .await?;

        ids.into_iter()
            .zip(subscriptions)
            .map(|(id, sub)| sub.map(|s| (id, s)).map_err(HealtrackError::from))
            .collect()
    }

    pub async fn subscribe_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Subscription<PushEvent>> {
        let subscription = self
            .ask(|reply| RuntimeQuery::SubscribeExecution {
                execution_id,
                reply,
            })
            .await?;
        Ok(subscription?)
    }

    pub async fn subscribe_healing(&self, healing_id: HealingId) -> Result<Subscription<FeedEvent>> {
        let subscription = self
            .ask(|reply| RuntimeQuery::SubscribeHealing { healing_id, reply })
            .await?;
        Ok(subscription?)
    }

    pub async fn subscribe_feed(&self) -> Result<Subscription<FeedEvent>> {
        let subscription = self
            .ask(|reply| RuntimeQuery::SubscribeFeed { reply })
            .await?;
        Ok(subscription?)
    }

    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        self.ask(|reply| RuntimeQuery::Snapshot { reply }).await
    }

    pub async fn execution(&self, execution_id: ExecutionId) -> Result<Option<ExecutionRecord>> {
        self.ask(|reply| RuntimeQuery::Execution {
            execution_id,
            reply,
        })
        .await
    }

    async fn require_execution(&self, execution_id: ExecutionId) -> Result<()> {
        match self.execution(execution_id).await? {
            Some(_) => Ok(()),
            None => Err(HealtrackError::ExecutionNotFound(execution_id.to_string())),
        }
    }

    /// Stop a run. Stopping a finished run is a no-op.
    pub async fn stop(&self, execution_id: ExecutionId) -> Result<()> {
        self.require_execution(execution_id).await?;
        self.send(RuntimeEvent::StopRequested { execution_id }).await
    }

    /// Close a stalled run as finished. No-op for finished runs.
    pub async fn force_complete(&self, execution_id: ExecutionId) -> Result<()> {
        self.require_execution(execution_id).await?;
        self.send(RuntimeEvent::ForceCompleteRequested { execution_id })
            .await
    }

    pub async fn notify_healing(&self, event: HealingEvent) -> Result<()> {
        self.send(RuntimeEvent::HealingNotified { event }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::ShutdownRequested).await
    }

    /// Whether the runtime loop is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
