// src/events/mod.rs

//! Typed progress events.
//!
//! [`PushEvent`] is the closed set of events delivered to execution
//! subscribers. The runner emits the same shapes as JSON lines on stdout;
//! [`normalizer`] turns those lines into typed events.

pub mod normalizer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::types::{LogSeverity, StepStatus};

pub use normalizer::{Normalizer, ParsedLine, RunnerExit, parse_line};

/// One step of a test case, as reported in `test_finished.testSteps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub step_number: u32,
    pub title: String,
    #[serde(default)]
    pub status: StepStatus,
    /// Milliseconds.
    #[serde(default)]
    pub duration: u64,
}

/// Event delivered over an execution's push channel, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PushEvent {
    /// Greeting sent to each new subscriber.
    Connected { execution_id: ExecutionId },
    TestStarted {
        execution_id: ExecutionId,
        #[serde(default)]
        message: String,
    },
    HeadlessMode {
        #[serde(default)]
        message: String,
    },
    TestRunning {
        #[serde(default)]
        message: String,
    },
    Log {
        message: String,
        #[serde(default)]
        level: LogSeverity,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        step_number: u32,
        #[serde(default)]
        step_title: String,
        #[serde(default)]
        status: StepStatus,
        /// Milliseconds.
        #[serde(default)]
        duration: u64,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
        #[serde(default)]
        screenshot_url: Option<String>,
    },
    TestFinished {
        success: bool,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        report_url: Option<String>,
        #[serde(default)]
        screenshots: Vec<String>,
        #[serde(default)]
        videos: Vec<String>,
        #[serde(default)]
        test_steps: Vec<TestStep>,
    },
    Error { message: String },
}

impl PushEvent {
    /// `test_finished` and `error` end an execution's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PushEvent::TestFinished { .. } | PushEvent::Error { .. })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PushEvent::Connected { .. } => "connected",
            PushEvent::TestStarted { .. } => "test_started",
            PushEvent::HeadlessMode { .. } => "headless_mode",
            PushEvent::TestRunning { .. } => "test_running",
            PushEvent::Log { .. } => "log",
            PushEvent::StepCompleted { .. } => "step_completed",
            PushEvent::TestFinished { .. } => "test_finished",
            PushEvent::Error { .. } => "error",
        }
    }

    pub fn log(level: LogSeverity, message: impl Into<String>) -> Self {
        PushEvent::Log {
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// Screenshots and videos found for a run after the runner exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub screenshots: Vec<String>,
    pub videos: Vec<String>,
}
