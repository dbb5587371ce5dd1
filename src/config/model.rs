// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:7878"
///
/// [runner]
/// program = "npx"
/// args = ["playwright", "test", "{test_class}", "--grep", "{test_id}"]
/// headed_args = ["--headed"]
///
/// [watchdog]
/// timeout = "30s"
///
/// [history]
/// retain_finished = 200
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub history: HistorySection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// `[runner]` section: how the external test runner is launched.
///
/// `args` and `headed_args` may contain the placeholders `{product}`,
/// `{test_class}`, `{test_id}`, `{browser}`, `{mode}` and `{execution_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra arguments appended when the run is requested in headed mode.
    #[serde(default = "default_headed_args")]
    pub headed_args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Turn non-JSON stdout lines into `log` events instead of dropping them.
    #[serde(default)]
    pub forward_plain_output: bool,

    /// Directory whose `<execution_id>/` subdirectory holds screenshots and
    /// videos for a run.
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,

    /// Report location known as soon as a run is accepted, with an
    /// `{execution_id}` placeholder.
    #[serde(default)]
    pub report_url_template: Option<String>,

    /// Time between SIGTERM and SIGKILL when a run is stopped.
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,
}

fn default_program() -> String {
    "npx".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "playwright".to_string(),
        "test".to_string(),
        "{test_class}".to_string(),
        "--grep".to_string(),
        "{test_id}".to_string(),
        "--project={browser}".to_string(),
    ]
}

fn default_headed_args() -> Vec<String> {
    vec!["--headed".to_string()]
}

fn default_stop_grace() -> String {
    "2s".to_string()
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            headed_args: default_headed_args(),
            working_dir: None,
            forward_plain_output: false,
            artifacts_dir: None,
            report_url_template: None,
            stop_grace: default_stop_grace(),
        }
    }
}

/// `[watchdog]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    /// How long an accepted run may stay silent before the fallback fires.
    #[serde(default = "default_watchdog_timeout")]
    pub timeout: String,
}

fn default_watchdog_timeout() -> String {
    "30s".to_string()
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            timeout: default_watchdog_timeout(),
        }
    }
}

/// `[history]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    /// Maximum number of finished execution records kept in memory.
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

fn default_retain_finished() -> usize {
    200
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            retain_finished: default_retain_finished(),
        }
    }
}

/// Validated runner settings, with durations parsed.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub headed_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub forward_plain_output: bool,
    pub artifacts_dir: Option<PathBuf>,
    pub report_url_template: Option<String>,
    pub stop_grace: Duration,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (see [`super::validate`])
/// or [`ConfigFile::default`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub bind: SocketAddr,
    pub runner: RunnerConfig,
    pub watchdog_timeout: Duration,
    pub retain_finished: usize,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        bind: SocketAddr,
        runner: RunnerConfig,
        watchdog_timeout: Duration,
        retain_finished: usize,
    ) -> Self {
        Self {
            bind,
            runner,
            watchdog_timeout,
            retain_finished,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let runner = RunnerSection::default();
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
            runner: RunnerConfig {
                program: runner.program,
                args: runner.args,
                headed_args: runner.headed_args,
                working_dir: runner.working_dir,
                forward_plain_output: runner.forward_plain_output,
                artifacts_dir: runner.artifacts_dir,
                report_url_template: runner.report_url_template,
                stop_grace: Duration::from_secs(2),
            },
            watchdog_timeout: Duration::from_secs(30),
            retain_finished: default_retain_finished(),
        }
    }
}
