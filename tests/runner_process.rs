// tests/runner_process.rs
#![cfg(unix)]

mod common;
use crate::common::{drain, event_types, init_tracing, with_timeout};

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use healtrack::config::RunnerConfig;
use healtrack::engine::{RuntimeOptions, ScheduledRun};
use healtrack::events::PushEvent;
use healtrack::exec::RealExecutorBackend;
use healtrack::exec::command::render_args;
use healtrack::executions::ExecutionStatus;
use healtrack::ids::ExecutionId;
use healtrack::types::Browser;
use healtrack_test_utils::builders::RequestBuilder;
use healtrack_test_utils::{quiet_options, start_engine};

type TestResult = Result<(), Box<dyn Error>>;

fn sh(script: &str) -> RunnerConfig {
    RunnerConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        headed_args: Vec::new(),
        working_dir: None,
        forward_plain_output: false,
        artifacts_dir: None,
        report_url_template: None,
        stop_grace: Duration::from_millis(200),
    }
}

async fn run_one(
    runner: RunnerConfig,
    options: RuntimeOptions,
) -> Result<(ExecutionId, Vec<PushEvent>), Box<dyn Error>> {
    let engine = start_engine(options, |tx| RealExecutorBackend::new(tx, runner));
    let mut started = engine
        .handle
        .start_subscribed(vec![RequestBuilder::new("TC-7").browser(Browser::Firefox).build()])
        .await?;
    let (id, subscription) = started.remove(0);
    let events = with_timeout(drain(subscription)).await;

    engine.handle.shutdown().await?;
    with_timeout(engine.task).await??;
    Ok((id, events))
}

#[test]
fn args_are_rendered_with_placeholders() {
    let mut runner = sh("ignored");
    runner.args = vec![
        "test".into(),
        "{test_class}".into(),
        "--grep={test_id}".into(),
        "--project={browser}".into(),
        "--out=reports/{execution_id}".into(),
        "{unknown}".into(),
    ];
    runner.headed_args = vec!["--headed".into(), "--mode={mode}".into()];

    let id = ExecutionId::new();
    let headless = ScheduledRun {
        execution_id: id,
        request: RequestBuilder::new("TC-9").build(),
        report_hint: None,
    };
    assert_eq!(
        render_args(&runner, &headless),
        vec![
            "test".to_string(),
            "CheckoutTests".to_string(),
            "--grep=TC-9".to_string(),
            "--project=chromium".to_string(),
            format!("--out=reports/{id}"),
            "{unknown}".to_string(),
        ]
    );

    let headed = ScheduledRun {
        request: RequestBuilder::new("TC-9").headed().build(),
        ..headless
    };
    let args = render_args(&runner, &headed);
    assert_eq!(&args[args.len() - 2..], &["--headed".to_string(), "--mode=headed".to_string()]);
}

#[tokio::test]
async fn runner_json_lines_are_streamed() -> TestResult {
    init_tracing();

    let script = r#"
echo 'Running 1 test using 1 worker'
echo '{"type":"test_started","message":"starting"}'
printf '{"type":"log","message":"%s/%s"}\n' "$HEALTRACK_BROWSER" "$HEALTRACK_MODE"
echo '{"type":"step_completed","stepNumber":1,"stepTitle":"open","status":"passed","duration":5}'
echo 'not json at all'
echo '{"type":"test_finished","success":true,"exitCode":0}'
echo '{"type":"log","message":"after the end"}'
"#;
    let (_, events) = run_one(sh(script), quiet_options()).await?;

    assert_eq!(
        event_types(&events),
        vec!["connected", "test_started", "log", "step_completed", "test_finished"]
    );
    match &events[2] {
        PushEvent::Log { message, .. } => assert_eq!(message, "firefox/headless"),
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_output_does_not_end_the_stream() -> TestResult {
    init_tracing();

    let script = r#"
echo '{"type":"test_started"}'
printf 'bad \377\376 bytes\n'
printf 'stderr \377 noise\n' >&2
echo 'more stderr' >&2
printf '{"type":"log","message":"caf\351"}\n'
echo '{"type":"test_finished","success":false,"exitCode":1}'
"#;
    let (_, events) = run_one(sh(script), quiet_options()).await?;

    assert_eq!(
        event_types(&events),
        vec!["connected", "test_started", "log", "test_finished"]
    );
    match &events[2] {
        PushEvent::Log { message, .. } => assert_eq!(message, "caf\u{FFFD}"),
        other => panic!("unexpected: {other:?}"),
    }
    match events.last() {
        Some(PushEvent::TestFinished { success, .. }) => assert!(!*success),
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn clean_exit_without_result_collects_artifacts() -> TestResult {
    init_tracing();

    let artifacts = tempfile::tempdir()?;
    let script = format!(
        r#"
dir='{}'/"$HEALTRACK_EXECUTION_ID"
mkdir -p "$dir"
touch "$dir/b.png" "$dir/a.jpg" "$dir/run.webm" "$dir/trace.zip"
echo '{{"type":"test_started"}}'
"#,
        artifacts.path().display()
    );
    let mut runner = sh(&script);
    runner.artifacts_dir = Some(artifacts.path().to_path_buf());

    let options = RuntimeOptions {
        report_url_template: Some("/reports/{execution_id}".into()),
        ..quiet_options()
    };
    let (id, events) = run_one(runner, options).await?;

    match events.last() {
        Some(PushEvent::TestFinished {
            success,
            exit_code,
            report_url,
            screenshots,
            videos,
            ..
        }) => {
            assert!(*success);
            assert_eq!(*exit_code, Some(0));
            assert_eq!(report_url.as_deref(), Some(format!("/reports/{id}").as_str()));
            let names: Vec<String> = screenshots
                .iter()
                .map(|p| PathBuf::from(p).file_name().unwrap().to_string_lossy().into_owned())
                .collect();
            assert_eq!(names, vec!["a.jpg".to_string(), "b.png".to_string()]);
            assert_eq!(videos.len(), 1);
        }
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn crash_before_result_becomes_error() -> TestResult {
    init_tracing();

    let (_, events) = run_one(
        sh(r#"echo '{"type":"test_started"}'; exit 3"#),
        quiet_options(),
    )
    .await?;

    match events.last() {
        Some(PushEvent::Error { message }) => assert!(message.contains("exit code 3"), "{message}"),
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_a_terminal_error() -> TestResult {
    init_tracing();

    let mut runner = sh("");
    runner.program = "/definitely/not/a/runner".to_string();
    let (_, events) = run_one(runner, quiet_options()).await?;

    assert_eq!(event_types(&events), vec!["connected", "error"]);
    match &events[1] {
        PushEvent::Error { message } => {
            assert!(message.starts_with("failed to run test runner"), "{message}")
        }
        other => panic!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn stop_kills_a_runner_that_ignores_sigterm() -> TestResult {
    init_tracing();

    let pid_dir = tempfile::tempdir()?;
    let pid_file = pid_dir.path().join("runner.pid");
    let script = format!(
        r#"trap '' TERM; echo $$ > '{}'; echo '{{"type":"test_started"}}'; while true; do sleep 1; done"#,
        pid_file.display()
    );

    let engine = start_engine(quiet_options(), |tx| RealExecutorBackend::new(tx, sh(&script)));
    let mut started = engine
        .handle
        .start_subscribed(vec![RequestBuilder::new("TC-hang").build()])
        .await?;
    let (id, mut subscription) = started.remove(0);

    loop {
        match with_timeout(subscription.recv()).await {
            Some(PushEvent::TestStarted { .. }) => break,
            Some(_) => continue,
            None => panic!("channel closed early"),
        }
    }
    engine.handle.stop(id).await?;
    let rest = with_timeout(drain(subscription)).await;
    assert_eq!(event_types(&rest), vec!["log"]);

    let pid: i32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
    let gone = with_timeout(async {
        loop {
            let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
            if !alive {
                break true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(gone);

    let record = engine.handle.execution(id).await?.expect("record");
    assert_eq!(record.status, ExecutionStatus::Stopped);

    engine.handle.shutdown().await?;
    with_timeout(engine.task).await??;
    Ok(())
}
