// src/cli.rs

//! CLI argument parsing using `clap`.

use std::str::FromStr;

use clap::{Parser, ValueEnum};

use crate::executions::ExecutionRequest;
use crate::types::{Browser, RunMode};

/// Command-line arguments for `healtrack`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "healtrack",
    version,
    about = "Run browser test cases and track execution and self-healing progress.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If the default file does not exist, built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = "Healtrack.toml")]
    pub config: String,

    /// Override `[server].bind`.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Run these test cases (`product:testClass:testId`) without starting the
    /// HTTP server, print push events as JSON lines, and exit when all runs
    /// are finished.
    #[arg(long = "run", value_name = "TEST", value_parser = parse_test_spec)]
    pub runs: Vec<TestSpec>,

    /// Browser mode for `--run`.
    #[arg(long, value_name = "MODE", default_value = "headless", value_parser = RunMode::from_str)]
    pub mode: RunMode,

    /// Browser for `--run`.
    #[arg(long, value_name = "BROWSER", default_value = "chromium", value_parser = Browser::from_str)]
    pub browser: Browser,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HEALTRACK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// A test case named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    pub product: String,
    pub test_class: String,
    pub test_id: String,
}

impl TestSpec {
    pub fn into_request(self, mode: RunMode, browser: Browser) -> ExecutionRequest {
        ExecutionRequest {
            product: self.product,
            test_class: self.test_class,
            test_id: self.test_id,
            mode,
            browser,
        }
    }
}

/// Parse `product:testClass:testId`.
pub fn parse_test_spec(s: &str) -> Result<TestSpec, String> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [product, test_class, test_id]
            if !product.is_empty() && !test_class.is_empty() && !test_id.is_empty() =>
        {
            Ok(TestSpec {
                product: product.to_string(),
                test_class: test_class.to_string(),
                test_id: test_id.to_string(),
            })
        }
        _ => Err(format!(
            "invalid test '{s}' (expected product:testClass:testId)"
        )),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
