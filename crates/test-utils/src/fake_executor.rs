use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use healtrack::engine::{RuntimeEvent, RuntimeMessage, ScheduledRun};
use healtrack::errors::Result;
use healtrack::events::{PushEvent, RunnerExit};
use healtrack::exec::ExecutorBackend;
use healtrack::ids::ExecutionId;

/// What a fake runner does once started.
#[derive(Debug, Clone, Default)]
pub struct RunnerScript {
    /// Events emitted, in order. `TestStarted` ids are rewritten to the
    /// run's id.
    pub events: Vec<PushEvent>,
    /// Reported after the events, if set.
    pub exit: Option<RunnerExit>,
}

impl RunnerScript {
    /// Emits nothing and never exits.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn then(mut self, event: PushEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn exit(mut self, code: i32) -> Self {
        self.exit = Some(RunnerExit::from_code(code));
        self
    }
}

/// A fake executor that:
/// - records which runs were started and stopped
/// - plays the script registered for the run's test id (silent otherwise).
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeMessage>,
    scripts: HashMap<String, RunnerScript>,
    spawned: Arc<Mutex<Vec<ScheduledRun>>>,
    stopped: Arc<Mutex<Vec<ExecutionId>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeMessage>) -> Self {
        Self {
            runtime_tx,
            scripts: HashMap::new(),
            spawned: Arc::new(Mutex::new(Vec::new())),
            stopped: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_script(mut self, test_id: &str, script: RunnerScript) -> Self {
        self.scripts.insert(test_id.to_string(), script);
        self
    }

    pub fn spawned(&self) -> Arc<Mutex<Vec<ScheduledRun>>> {
        Arc::clone(&self.spawned)
    }

    pub fn stopped(&self) -> Arc<Mutex<Vec<ExecutionId>>> {
        Arc::clone(&self.stopped)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_runner(
        &mut self,
        run: ScheduledRun,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let script = self
            .scripts
            .get(&run.request.test_id)
            .cloned()
            .unwrap_or_default();
        self.spawned.lock().unwrap().push(run.clone());

        Box::pin(async move {
            let execution_id = run.execution_id;
            // Play from a separate task: the runtime is blocked on this call.
            tokio::spawn(async move {
                for event in script.events {
                    let event = match event {
                        PushEvent::TestStarted { message, .. } => PushEvent::TestStarted {
                            execution_id,
                            message,
                        },
                        other => other,
                    };
                    let message = RuntimeMessage::Event(RuntimeEvent::RunnerEvent {
                        execution_id,
                        event,
                    });
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
                if let Some(exit) = script.exit {
                    let _ = tx
                        .send(RuntimeMessage::Event(RuntimeEvent::RunnerExited {
                            execution_id,
                            exit,
                        }))
                        .await;
                }
            });
            Ok(())
        })
    }

    fn stop_runner(
        &mut self,
        execution_id: ExecutionId,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.stopped.lock().unwrap().push(execution_id);
        Box::pin(async { Ok(()) })
    }
}
