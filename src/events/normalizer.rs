// src/events/normalizer.rs

//! Runner output → typed events.
//!
//! The runner writes one JSON object per line on stdout, tagged by `type`
//! with the same shapes as [`PushEvent`]. Anything that does not parse is
//! dropped without surfacing an error. Order is never changed: each line
//! yields at most one event, in line order.
//!
//! A [`Normalizer`] guarantees the sequence it produces for one run ends in
//! at most one terminal event. If the runner never reported one, [`finish`]
//! synthesizes it from the process exit status.
//!
//! [`finish`]: Normalizer::finish

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::trace;

use crate::events::{Artifacts, PushEvent};
use crate::ids::ExecutionId;
use crate::types::LogSeverity;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
});

/// Classification of a single stdout line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Event(PushEvent),
    /// Not JSON at all; plain runner chatter.
    Plain(String),
    Dropped(&'static str),
}

/// Parse one raw line of runner output.
///
/// `test_started` events get the run's `execution_id` injected; the runner's
/// own value (if any) is ignored. `connected` is a channel greeting, never a
/// runner event, and is dropped.
pub fn parse_line(line: &str, execution_id: ExecutionId) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Dropped("blank line");
    }
    if !line.starts_with('{') {
        return ParsedLine::Plain(line.to_string());
    }

    let mut value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return ParsedLine::Dropped("malformed json"),
    };

    let Some(obj) = value.as_object_mut() else {
        return ParsedLine::Dropped("json is not an object");
    };

    match obj.get("type").and_then(Value::as_str) {
        None => return ParsedLine::Dropped("missing type"),
        Some("connected") => return ParsedLine::Dropped("connected is not a runner event"),
        Some("test_started") => {
            obj.insert(
                "executionId".to_string(),
                Value::String(execution_id.to_string()),
            );
        }
        Some(_) => {}
    }

    match serde_json::from_value::<PushEvent>(value) {
        Ok(event) => ParsedLine::Event(event),
        Err(_) => ParsedLine::Dropped("unknown type or invalid fields"),
    }
}

/// How the runner process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl RunnerExit {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for RunnerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "terminated by signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Stateful per-run normalizer.
#[derive(Debug)]
pub struct Normalizer {
    execution_id: ExecutionId,
    forward_plain_output: bool,
    report_hint: Option<String>,
    terminal_seen: bool,
}

impl Normalizer {
    pub fn new(
        execution_id: ExecutionId,
        forward_plain_output: bool,
        report_hint: Option<String>,
    ) -> Self {
        Self {
            execution_id,
            forward_plain_output,
            report_hint,
            terminal_seen: false,
        }
    }

    pub fn terminal_seen(&self) -> bool {
        self.terminal_seen
    }

    /// Feed one stdout line; returns the event it produced, if any.
    pub fn push_line(&mut self, line: &str) -> Option<PushEvent> {
        if self.terminal_seen {
            trace!(execution_id = %self.execution_id, "line after terminal event dropped");
            return None;
        }

        let event = match parse_line(line, self.execution_id) {
            ParsedLine::Event(event) => event,
            ParsedLine::Plain(text) if self.forward_plain_output => {
                let text = ANSI_ESCAPE.replace_all(&text, "");
                PushEvent::log(LogSeverity::Info, text)
            }
            ParsedLine::Plain(_) => {
                trace!(execution_id = %self.execution_id, "plain output line dropped");
                return None;
            }
            ParsedLine::Dropped(reason) => {
                trace!(execution_id = %self.execution_id, reason, "runner line dropped");
                return None;
            }
        };

        Some(self.admit(event))
    }

    /// Called once the process has exited on its own.
    ///
    /// Returns the synthesized terminal event when the runner did not report
    /// one: `test_finished` for a clean exit, `error` otherwise.
    pub fn finish(&mut self, exit: RunnerExit, artifacts: Artifacts) -> Option<PushEvent> {
        if self.terminal_seen {
            return None;
        }

        let event = if exit.success() {
            PushEvent::TestFinished {
                success: true,
                exit_code: exit.code,
                report_url: self.report_hint.clone(),
                screenshots: artifacts.screenshots,
                videos: artifacts.videos,
                test_steps: Vec::new(),
            }
        } else {
            PushEvent::Error {
                message: format!("test runner exited before reporting a result ({exit})"),
            }
        };

        Some(self.admit(event))
    }

    fn admit(&mut self, mut event: PushEvent) -> PushEvent {
        if let PushEvent::TestFinished { report_url, .. } = &mut event {
            if report_url.is_none() {
                *report_url = self.report_hint.clone();
            }
        }
        if event.is_terminal() {
            self.terminal_seen = true;
        }
        event
    }
}
