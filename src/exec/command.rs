// src/exec/command.rs

//! Building the test runner command for one execution.

use std::process::Stdio;

use tokio::process::Command;

use crate::config::RunnerConfig;
use crate::engine::ScheduledRun;
use crate::types::RunMode;

pub const ENV_EXECUTION_ID: &str = "HEALTRACK_EXECUTION_ID";
pub const ENV_BROWSER: &str = "HEALTRACK_BROWSER";
pub const ENV_MODE: &str = "HEALTRACK_MODE";

/// Substitute the run's placeholders in one argument template.
///
/// Supported: `{product}`, `{test_class}`, `{test_id}`, `{browser}`,
/// `{mode}`, `{execution_id}`. Anything else is left untouched.
pub fn render_template(template: &str, run: &ScheduledRun) -> String {
    let request = &run.request;
    template
        .replace("{product}", &request.product)
        .replace("{test_class}", &request.test_class)
        .replace("{test_id}", &request.test_id)
        .replace("{browser}", request.browser.as_str())
        .replace("{mode}", request.mode.as_str())
        .replace("{execution_id}", &run.execution_id.to_string())
}

/// Final argument list: rendered `args`, then `headed_args` in headed mode.
pub fn render_args(runner: &RunnerConfig, run: &ScheduledRun) -> Vec<String> {
    let headed = match run.request.mode {
        RunMode::Headed => runner.headed_args.as_slice(),
        RunMode::Headless => &[],
    };

    runner
        .args
        .iter()
        .chain(headed)
        .map(|arg| render_template(arg, run))
        .collect()
}

/// The runner gets its own process group so a stop reaches the browsers it
/// launched, not only the top-level process.
pub fn build_command(runner: &RunnerConfig, run: &ScheduledRun) -> Command {
    let mut cmd = Command::new(&runner.program);
    cmd.args(render_args(runner, run))
        .env(ENV_EXECUTION_ID, run.execution_id.to_string())
        .env(ENV_BROWSER, run.request.browser.as_str())
        .env(ENV_MODE, run.request.mode.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &runner.working_dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}
