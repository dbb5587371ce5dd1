// src/engine/watchdog.rs

//! One-shot watchdog timers, one per execution.
//!
//! A timer sleeps for the configured timeout and then feeds
//! [`RuntimeEvent::WatchdogElapsed`] back into the runtime loop. Whether
//! that still matters is decided by the core, so a timer that fires just
//! after the first runner event is harmless.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::engine::{RuntimeEvent, RuntimeMessage};
use crate::ids::ExecutionId;

#[derive(Debug)]
pub struct Watchdogs {
    timeout: Duration,
    // Weak so pending timers do not keep the runtime channel open.
    runtime_tx: mpsc::WeakSender<RuntimeMessage>,
    timers: HashMap<ExecutionId, JoinHandle<()>>,
}

impl Watchdogs {
    pub fn new(timeout: Duration, runtime_tx: mpsc::WeakSender<RuntimeMessage>) -> Self {
        Self {
            timeout,
            runtime_tx,
            timers: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, execution_id: &ExecutionId) -> bool {
        self.timers.contains_key(execution_id)
    }

    /// Start (or restart) the timer for `execution_id`.
    pub fn arm(&mut self, execution_id: ExecutionId) {
        self.disarm(&execution_id);

        let timeout = self.timeout;
        let weak = self.runtime_tx.clone();
        let handle = tokio::spawn(async move {
            sleep(timeout).await;
            let Some(tx) = weak.upgrade() else {
                return;
            };
            debug!(%execution_id, "watchdog elapsed; emitting WatchdogElapsed");
            let _ = tx
                .send(RuntimeMessage::Event(RuntimeEvent::WatchdogElapsed {
                    execution_id,
                }))
                .await;
        });

        trace!(%execution_id, ?timeout, "watchdog armed");
        self.timers.insert(execution_id, handle);
    }

    /// Cancel the timer. Returns `false` if none was armed.
    pub fn disarm(&mut self, execution_id: &ExecutionId) -> bool {
        match self.timers.remove(execution_id) {
            Some(handle) => {
                handle.abort();
                trace!(%execution_id, "watchdog disarmed");
                true
            }
            None => false,
        }
    }

    /// Drop bookkeeping for a timer that already fired.
    pub fn forget(&mut self, execution_id: &ExecutionId) {
        self.timers.remove(execution_id);
    }

    pub fn disarm_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}
