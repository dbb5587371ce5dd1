// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the test runner, using
//! `tokio::process::Command`, and reporting back to the engine via
//! `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the loop that tracks live runner processes.
//! - [`runner`] supervises a single runner process.
//! - [`command`] builds the runner command line and environment.
//! - [`artifacts`] collects screenshots and videos after a clean exit.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake implementation.

pub mod artifacts;
pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::{ExecutorCommand, spawn_executor};
