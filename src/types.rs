use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether the browser under test is shown on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Headless,
    Headed,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Headless => "headless",
            RunMode::Headed => "headed",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headless" => Ok(RunMode::Headless),
            "headed" => Ok(RunMode::Headed),
            other => Err(format!(
                "invalid mode: {other} (expected \"headless\" or \"headed\")"
            )),
        }
    }
}

/// Browser engine the runner should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!(
                "invalid browser: {other} (expected chromium, firefox or webkit)"
            )),
        }
    }
}

/// Severity attached to a runner `log` event.
///
/// Unknown levels coming from the runner collapse into `Other` instead of
/// failing the whole line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    #[serde(other)]
    Other,
}

/// Result of a single test step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    #[default]
    #[serde(other)]
    Unknown,
}
