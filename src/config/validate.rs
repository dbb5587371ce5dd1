// src/config/validate.rs

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, RunnerConfig, RunnerSection};
use crate::errors::{HealtrackError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HealtrackError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let bind = validate_bind(&raw.server.bind)?;
        let runner = validate_runner(raw.runner)?;
        let watchdog_timeout = validate_watchdog(&raw.watchdog.timeout)?;
        validate_history(raw.history.retain_finished)?;

        Ok(ConfigFile::new_unchecked(
            bind,
            runner,
            watchdog_timeout,
            raw.history.retain_finished,
        ))
    }
}

fn validate_bind(bind: &str) -> Result<SocketAddr> {
    bind.trim().parse::<SocketAddr>().map_err(|e| {
        HealtrackError::ConfigError(format!("[server].bind '{bind}' is not a socket address: {e}"))
    })
}

fn validate_runner(runner: RunnerSection) -> Result<RunnerConfig> {
    if runner.program.trim().is_empty() {
        return Err(HealtrackError::ConfigError(
            "[runner].program must not be empty".to_string(),
        ));
    }

    if let Some(template) = &runner.report_url_template {
        if template.trim().is_empty() {
            return Err(HealtrackError::ConfigError(
                "[runner].report_url_template must not be empty when set".to_string(),
            ));
        }
    }

    let stop_grace = parse_duration(&runner.stop_grace).map_err(|e| {
        HealtrackError::ConfigError(format!("[runner].stop_grace: {e}"))
    })?;

    Ok(RunnerConfig {
        program: runner.program,
        args: runner.args,
        headed_args: runner.headed_args,
        working_dir: runner.working_dir,
        forward_plain_output: runner.forward_plain_output,
        artifacts_dir: runner.artifacts_dir,
        report_url_template: runner.report_url_template,
        stop_grace,
    })
}

fn validate_watchdog(timeout: &str) -> Result<Duration> {
    let timeout = parse_duration(timeout)
        .map_err(|e| HealtrackError::ConfigError(format!("[watchdog].timeout: {e}")))?;

    if timeout.is_zero() {
        return Err(HealtrackError::ConfigError(
            "[watchdog].timeout must be greater than zero".to_string(),
        ));
    }

    Ok(timeout)
}

fn validate_history(retain_finished: usize) -> Result<()> {
    if retain_finished == 0 {
        return Err(HealtrackError::ConfigError(
            "[history].retain_finished must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
