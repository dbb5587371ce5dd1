// src/executions/mod.rs

//! Execution records: one per accepted test-case run.

pub mod record;
pub mod store;

pub use record::{
    ExecutionRecord, ExecutionRequest, ExecutionStatus, LogEntry, StepScreenshot,
    SyntheticFinish, TestKey,
};
pub use store::ExecutionStore;
