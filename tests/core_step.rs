// tests/core_step.rs

use std::time::Duration;

use chrono::Utc;

use healtrack::dashboard::FeedEvent;
use healtrack::engine::{CoreCommand, CoreRuntime, RuntimeEvent, RuntimeOptions};
use healtrack::events::{PushEvent, RunnerExit};
use healtrack::executions::ExecutionStatus;
use healtrack::healing::HealingStatus;
use healtrack::ids::ExecutionId;
use healtrack_test_utils::builders::{RequestBuilder, finished, healing, log_line, test_started};

fn options() -> RuntimeOptions {
    RuntimeOptions {
        watchdog_timeout: Duration::from_secs(30),
        report_url_template: Some("/reports/{execution_id}/index.html".into()),
        ..RuntimeOptions::default()
    }
}

fn accept(core: &mut CoreRuntime) -> (ExecutionId, Vec<CoreCommand>) {
    let id = ExecutionId::new();
    let step = core.step(RuntimeEvent::ExecutionRequested {
        execution_id: id,
        request: RequestBuilder::new("TC-1").build(),
    });
    (id, step.commands)
}

fn published(commands: &[CoreCommand]) -> Vec<&PushEvent> {
    commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::PublishExecution(_, event) => Some(event),
            _ => None,
        })
        .collect()
}

fn closes(commands: &[CoreCommand], id: ExecutionId) -> bool {
    commands
        .iter()
        .any(|c| matches!(c, CoreCommand::CloseExecutionChannel(x) if *x == id))
}

fn kills(commands: &[CoreCommand], id: ExecutionId) -> bool {
    commands
        .iter()
        .any(|c| matches!(c, CoreCommand::KillRunner(x) if *x == id))
}

#[test]
fn acceptance_opens_channel_before_spawning_runner() {
    let mut core = CoreRuntime::new(options());
    let (id, commands) = accept(&mut core);

    let open = commands
        .iter()
        .position(|c| matches!(c, CoreCommand::OpenExecutionChannel(x) if *x == id))
        .expect("channel opened");
    let spawn = commands
        .iter()
        .position(|c| matches!(c, CoreCommand::SpawnRunner(run) if run.execution_id == id))
        .expect("runner spawned");
    assert!(open < spawn);
    assert!(commands.iter().any(|c| matches!(c, CoreCommand::ArmWatchdog(x) if *x == id)));

    let record = core.execution(&id).expect("record");
    assert_eq!(record.status, ExecutionStatus::Starting);
    assert_eq!(
        record.report_hint.as_deref(),
        Some(format!("/reports/{id}/index.html").as_str())
    );
}

#[test]
fn first_event_disarms_watchdog_and_terminal_closes_channel() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);

    let step = core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: test_started(id),
    });
    assert!(step.commands.iter().any(|c| matches!(c, CoreCommand::DisarmWatchdog(_))));
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Running));

    let step = core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: log_line("clicking"),
    });
    assert!(!step.commands.iter().any(|c| matches!(c, CoreCommand::DisarmWatchdog(_))));

    let step = core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: finished(true),
    });
    assert!(closes(&step.commands, id));
    let record = core.execution(&id).expect("record");
    assert_eq!(record.status, ExecutionStatus::Finished);
    assert_eq!(record.success, Some(true));
    assert_eq!(record.summary.as_deref(), Some("Passed"));
    assert_eq!(record.report_url, record.report_hint);
}

#[test]
fn events_after_terminal_are_dropped() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);
    core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: finished(false),
    });

    let step = core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: log_line("late"),
    });
    assert!(step.commands.is_empty());
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Finished));
}

#[test]
fn watchdog_fallback_happens_at_most_once() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);

    let step = core.step(RuntimeEvent::WatchdogElapsed { execution_id: id });
    let events = published(&step.commands);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], PushEvent::Log { message, .. } if message.contains("timeout fallback")));
    match events[1] {
        PushEvent::TestFinished {
            success, report_url, ..
        } => {
            assert!(!success);
            assert_eq!(report_url.as_deref(), Some(format!("/reports/{id}/index.html").as_str()));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(closes(&step.commands, id));
    assert!(kills(&step.commands, id));

    let record = core.execution(&id).expect("record");
    assert_eq!(record.status, ExecutionStatus::Finished);
    assert!(record.summary.as_deref().unwrap_or("").contains("timeout fallback"));

    let again = core.step(RuntimeEvent::WatchdogElapsed { execution_id: id });
    assert!(again.commands.is_empty());
}

#[test]
fn watchdog_is_ignored_once_progress_was_delivered() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);
    core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: test_started(id),
    });

    let step = core.step(RuntimeEvent::WatchdogElapsed { execution_id: id });
    assert!(step.commands.is_empty());
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Running));
}

#[test]
fn force_complete_synthesizes_finished() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);
    core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: test_started(id),
    });

    let step = core.step(RuntimeEvent::ForceCompleteRequested { execution_id: id });
    assert!(closes(&step.commands, id));
    assert!(kills(&step.commands, id));
    let record = core.execution(&id).expect("record");
    assert_eq!(record.status, ExecutionStatus::Finished);
    assert!(record.summary.as_deref().unwrap_or("").contains("forced completion"));

    let again = core.step(RuntimeEvent::ForceCompleteRequested { execution_id: id });
    assert!(again.commands.is_empty());
}

#[test]
fn stop_kills_runner_and_closes_channel() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);

    let step = core.step(RuntimeEvent::StopRequested { execution_id: id });
    assert!(kills(&step.commands, id));
    assert!(closes(&step.commands, id));
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Stopped));

    let late = core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: finished(true),
    });
    assert!(late.commands.is_empty());
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Stopped));
}

#[test]
fn runner_exit_fills_in_exit_code() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);
    core.step(RuntimeEvent::RunnerEvent {
        execution_id: id,
        event: PushEvent::Error {
            message: "boom".into(),
        },
    });
    core.step(RuntimeEvent::RunnerExited {
        execution_id: id,
        exit: RunnerExit::from_code(4),
    });

    let record = core.execution(&id).expect("record");
    assert_eq!(record.status, ExecutionStatus::Error);
    assert_eq!(record.exit_code, Some(4));
    assert_eq!(record.summary.as_deref(), Some("Error: boom"));
}

#[test]
fn subscriber_marks_connected_only_before_progress() {
    let mut core = CoreRuntime::new(options());
    let (id, _) = accept(&mut core);

    let step = core.step(RuntimeEvent::SubscriberConnected { execution_id: id });
    assert_eq!(step.commands.len(), 1);
    assert_eq!(core.execution(&id).map(|r| r.status), Some(ExecutionStatus::Connected));

    let again = core.step(RuntimeEvent::SubscriberConnected { execution_id: id });
    assert!(again.commands.is_empty());
}

#[test]
fn exit_when_idle_stops_after_last_terminal_run() {
    let mut core = CoreRuntime::new(RuntimeOptions {
        exit_when_idle: true,
        ..options()
    });
    let (a, _) = accept(&mut core);
    let (b, _) = accept(&mut core);

    let step = core.step(RuntimeEvent::RunnerEvent {
        execution_id: a,
        event: finished(true),
    });
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::StopRequested { execution_id: b });
    assert!(!step.keep_running);
    assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
}

#[test]
fn finished_records_are_pruned_beyond_retention() {
    let mut core = CoreRuntime::new(RuntimeOptions {
        retain_finished: 2,
        ..options()
    });

    let mut ids = Vec::new();
    let mut forgotten = Vec::new();
    for _ in 0..4 {
        let (id, _) = accept(&mut core);
        let step = core.step(RuntimeEvent::RunnerEvent {
            execution_id: id,
            event: finished(true),
        });
        forgotten.extend(step.commands.iter().filter_map(|c| match c {
            CoreCommand::ForgetExecutionChannel(x) => Some(*x),
            _ => None,
        }));
        ids.push(id);
    }
    let (running, _) = accept(&mut core);

    assert_eq!(core.executions().len(), 3);
    assert!(core.execution(&ids[0]).is_none());
    assert!(core.execution(&ids[1]).is_none());
    assert!(core.execution(&ids[3]).is_some());
    assert!(core.execution(&running).is_some());
    assert_eq!(forgotten, vec![ids[0], ids[1]]);
}

#[test]
fn healing_updates_fan_out_with_fresh_counters() {
    let mut core = CoreRuntime::new(options());

    let step = core.step_at(
        RuntimeEvent::HealingNotified {
            event: healing("locatorA", "#old", HealingStatus::Detected),
        },
        Utc::now(),
    );
    assert!(matches!(step.commands[0], CoreCommand::OpenHealingChannel(_)));
    let counters = step.commands.iter().find_map(|c| match c {
        CoreCommand::PublishFeed(FeedEvent::LocatorFix { counters, .. }) => Some(*counters),
        _ => None,
    });
    let counters = counters.expect("feed update");
    assert_eq!(counters.total_runs, 1);
    assert_eq!(counters.currently_executing, 1);

    let step = core.step(RuntimeEvent::HealingNotified {
        event: healing("locatorA", "#old", HealingStatus::Fixed),
    });
    assert!(matches!(step.commands.last(), Some(CoreCommand::CloseHealingChannel(_))));

    let snapshot = core.snapshot();
    assert_eq!(snapshot.counters.total_runs, 1);
    assert_eq!(snapshot.counters.successful_fixes, 1);
    assert_eq!(snapshot.counters.currently_executing, 0);

    let dup = core.step(RuntimeEvent::HealingNotified {
        event: healing("locatorA", "#old", HealingStatus::Fixed),
    });
    assert!(dup.commands.is_empty());
}

#[test]
fn shutdown_stops_the_loop() {
    let mut core = CoreRuntime::new(options());
    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(!step.keep_running);
}
