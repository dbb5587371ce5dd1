// src/healing/mod.rs

//! Self-healing pipeline tracking.
//!
//! A locator repair attempt is reported by an external producer as a series
//! of notifications (`detected`, `analyzing`, `healing`, then `fixed`,
//! `failed` or `error`). Notifications can be duplicated, delayed or arrive
//! out of order, and the producer may not have a session id yet when it
//! first reports a problem.
//!
//! - [`correlate`] decides which existing record (if any) a notification
//!   belongs to. It is pure and has no I/O.
//! - [`reconciler`] merges notifications into one [`HealingRecord`] per
//!   attempt and maintains the set of attempts still in flight.

pub mod correlate;
pub mod reconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::HealingId;

pub use correlate::{CorrelationKey, correlate};
pub use reconciler::{HealingReconciler, ReconcileKind, ReconcileOutcome};

/// Pipeline status of a repair attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealingStatus {
    Detected,
    Analyzing,
    Healing,
    Fixed,
    Failed,
    Error,
}

impl HealingStatus {
    /// Position in the pipeline. All terminal statuses share the last stage.
    pub fn stage(self) -> u8 {
        match self {
            HealingStatus::Detected => 0,
            HealingStatus::Analyzing => 1,
            HealingStatus::Healing => 2,
            HealingStatus::Fixed | HealingStatus::Failed | HealingStatus::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.stage() == 3
    }
}

/// One inbound notification about a repair attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingEvent {
    pub locator_key: String,
    pub old_locator: String,
    #[serde(default)]
    pub new_locator: Option<String>,
    pub status: HealingStatus,
    #[serde(default)]
    pub healing_session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
}

/// Wire envelope: `{"type": "locatorFix", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HealingNotification {
    #[serde(rename = "locatorFix")]
    LocatorFix(HealingEvent),
}

impl HealingNotification {
    pub fn into_event(self) -> HealingEvent {
        match self {
            HealingNotification::LocatorFix(event) => event,
        }
    }
}

/// Reconciled state of one repair attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingRecord {
    pub healing_id: HealingId,
    pub locator_key: String,
    pub old_locator: String,
    pub new_locator: Option<String>,
    pub status: HealingStatus,
    pub error: Option<String>,
    pub healing_session_id: Option<String>,
    /// Set when the attempt is first seen; never overwritten.
    pub execution_start_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub events_applied: u32,
    /// A notification without session id was applied to this record.
    #[serde(skip)]
    pub(crate) sessionless_bound: bool,
}

impl HealingRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
