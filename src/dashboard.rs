// src/dashboard.rs

//! Dashboard counters and snapshots.
//!
//! Counters are always derived from the reconciled records on demand and
//! never stored, so they cannot drift from the data they summarize.

use std::collections::HashSet;

use serde::Serialize;

use crate::executions::{ExecutionRecord, ExecutionStatus};
use crate::healing::{HealingRecord, HealingStatus};
use crate::ids::{ExecutionId, HealingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounters {
    pub total_runs: usize,
    pub successful_fixes: usize,
    pub currently_executing: usize,
}

/// Compute the counters from the reconciled healing records and active set.
pub fn aggregate(records: &[HealingRecord], active: &HashSet<HealingId>) -> DashboardCounters {
    DashboardCounters {
        total_runs: records.len(),
        successful_fixes: records
            .iter()
            .filter(|r| r.status == HealingStatus::Fixed)
            .count(),
        currently_executing: active.len(),
    }
}

/// Read-only view served to dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub counters: DashboardCounters,
    /// Test executions that have not reached a terminal status.
    pub executions_in_flight: usize,
    pub healing: Vec<HealingRecord>,
    pub executions: Vec<ExecutionRecord>,
}

/// Update pushed on the dashboard feed and on per-attempt healing channels.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FeedEvent {
    LocatorFix {
        record: HealingRecord,
        counters: DashboardCounters,
    },
    ExecutionStatus {
        execution_id: ExecutionId,
        status: ExecutionStatus,
        summary: Option<String>,
        counters: DashboardCounters,
    },
}
