// src/executions/record.rs

//! Per-run execution record and the transitions runner events cause on it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{PushEvent, TestStep};
use crate::ids::ExecutionId;
use crate::types::{Browser, LogSeverity, RunMode};

/// Lifecycle of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted; runner being started.
    Starting,
    /// A subscriber attached before the runner reported anything.
    Connected,
    Running,
    Finished,
    Error,
    Stopped,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Finished | ExecutionStatus::Error | ExecutionStatus::Stopped
        )
    }
}

/// `(product, test class, test case id)`.
///
/// Not unique across runs: the same test case may run several times
/// concurrently, each with its own [`ExecutionId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKey {
    pub product: String,
    pub test_class: String,
    pub test_id: String,
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.product, self.test_class, self.test_id)
    }
}

/// Body of an execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub product: String,
    pub test_class: String,
    pub test_id: String,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub browser: Browser,
}

impl ExecutionRequest {
    pub fn test_key(&self) -> TestKey {
        TestKey {
            product: self.product.clone(),
            test_class: self.test_class.clone(),
            test_id: self.test_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub message: String,
    pub level: LogSeverity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScreenshot {
    pub step_number: u32,
    pub url: String,
}

/// Why a run was closed without the runner reporting a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticFinish {
    /// The watchdog expired before any event arrived.
    TimeoutFallback,
    /// An operator forced completion of a stalled run.
    Forced,
}

impl SyntheticFinish {
    pub fn describe(self) -> &'static str {
        match self {
            SyntheticFinish::TimeoutFallback => "timeout fallback",
            SyntheticFinish::Forced => "forced completion",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub test_key: TestKey,
    pub mode: RunMode,
    pub browser: Browser,
    pub status: ExecutionStatus,
    pub logs: Vec<LogEntry>,
    pub steps: Vec<TestStep>,
    pub step_screenshots: Vec<StepScreenshot>,
    pub report_url: Option<String>,
    pub exit_code: Option<i32>,
    pub success: Option<bool>,
    /// Human-readable outcome, set once the run is terminal.
    pub summary: Option<String>,
    /// Report location known at acceptance time.
    pub report_hint: Option<String>,
    /// Runner events applied to this record.
    pub events_delivered: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn new(
        execution_id: ExecutionId,
        request: &ExecutionRequest,
        report_hint: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            execution_id,
            test_key: request.test_key(),
            mode: request.mode,
            browser: request.browser,
            status: ExecutionStatus::Starting,
            logs: Vec::new(),
            steps: Vec::new(),
            step_screenshots: Vec::new(),
            report_url: None,
            exit_code: None,
            success: None,
            summary: None,
            report_hint,
            events_delivered: 0,
            started_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// First subscriber attached.
    pub fn mark_connected(&mut self) -> bool {
        if self.status == ExecutionStatus::Starting {
            self.status = ExecutionStatus::Connected;
            return true;
        }
        false
    }

    /// Apply one runner event. Returns `true` if `status` changed.
    ///
    /// Callers must not apply events to terminal records.
    pub fn apply(&mut self, event: &PushEvent, now: DateTime<Utc>) -> bool {
        let before = self.status;
        self.events_delivered += 1;

        match event {
            PushEvent::Connected { .. } => {}
            PushEvent::TestStarted { message, .. } | PushEvent::TestRunning { message } => {
                self.status = ExecutionStatus::Running;
                self.push_log(message, LogSeverity::Info, now);
            }
            PushEvent::HeadlessMode { message } => {
                self.push_log(message, LogSeverity::Info, now);
            }
            PushEvent::Log {
                message,
                level,
                timestamp,
            } => {
                self.logs.push(LogEntry {
                    message: message.clone(),
                    level: *level,
                    timestamp: *timestamp,
                });
            }
            PushEvent::StepCompleted {
                step_number,
                step_title,
                status,
                duration,
                screenshot_url,
                ..
            } => {
                self.status = ExecutionStatus::Running;
                self.steps.push(TestStep {
                    step_number: *step_number,
                    title: step_title.clone(),
                    status: *status,
                    duration: *duration,
                });
                if let Some(url) = screenshot_url {
                    self.step_screenshots.push(StepScreenshot {
                        step_number: *step_number,
                        url: url.clone(),
                    });
                }
            }
            PushEvent::TestFinished {
                success,
                exit_code,
                report_url,
                test_steps,
                ..
            } => {
                self.status = ExecutionStatus::Finished;
                self.success = Some(*success);
                self.exit_code = *exit_code;
                self.report_url = report_url.clone().or_else(|| self.report_hint.clone());
                if self.steps.is_empty() && !test_steps.is_empty() {
                    self.steps = test_steps.clone();
                }
                self.summary = Some(match (success, exit_code) {
                    (true, _) => "Passed".to_string(),
                    (false, Some(code)) => format!("Failed (exit code {code})"),
                    (false, None) => "Failed".to_string(),
                });
                self.finished_at = Some(now);
            }
            PushEvent::Error { message } => {
                self.status = ExecutionStatus::Error;
                self.push_log(message, LogSeverity::Error, now);
                self.summary = Some(format!("Error: {message}"));
                self.finished_at = Some(now);
            }
        }

        self.status != before
    }

    /// Close the run as `finished` without a runner result.
    ///
    /// Returns the events to publish: a warning log and `test_finished`.
    pub fn finish_synthetic(
        &mut self,
        kind: SyntheticFinish,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Vec<PushEvent> {
        let message = format!("Finished ({}): {detail}", kind.describe());
        self.push_log(&message, LogSeverity::Warn, now);
        self.status = ExecutionStatus::Finished;
        self.success = Some(false);
        self.report_url = self.report_hint.clone();
        self.summary = Some(message.clone());
        self.finished_at = Some(now);

        vec![
            PushEvent::Log {
                message,
                level: LogSeverity::Warn,
                timestamp: now,
            },
            PushEvent::TestFinished {
                success: false,
                exit_code: None,
                report_url: self.report_url.clone(),
                screenshots: Vec::new(),
                videos: Vec::new(),
                test_steps: self.steps.clone(),
            },
        ]
    }

    /// Operator stop.
    pub fn stop(&mut self, now: DateTime<Utc>) -> PushEvent {
        let message = "Stopped by user".to_string();
        self.push_log(&message, LogSeverity::Warn, now);
        self.status = ExecutionStatus::Stopped;
        self.summary = Some(message.clone());
        self.finished_at = Some(now);
        PushEvent::Log {
            message,
            level: LogSeverity::Warn,
            timestamp: now,
        }
    }

    fn push_log(&mut self, message: &str, level: LogSeverity, now: DateTime<Utc>) {
        if message.is_empty() {
            return;
        }
        self.logs.push(LogEntry {
            message: message.to_string(),
            level,
            timestamp: now,
        });
    }
}
