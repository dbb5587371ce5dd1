// src/healing/reconciler.rs

//! Merge healing notifications into one record per repair attempt.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::healing::correlate::correlate;
use crate::healing::{HealingEvent, HealingRecord};
use crate::ids::HealingId;

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    /// First sighting of this attempt; a new record was created.
    Created,
    /// Merged into an existing in-flight record.
    ///
    /// `regressed` is set when the notification's stage was lower than the
    /// record's. It is still applied.
    Merged { regressed: bool },
    /// The matching record is already terminal; nothing changed.
    IgnoredTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub healing_id: HealingId,
    pub kind: ReconcileKind,
    /// The record reached a terminal status with this notification.
    pub became_terminal: bool,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self.kind, ReconcileKind::IgnoredTerminal)
    }
}

/// Owns every healing record of the process lifetime plus the active set.
///
/// Invariant, checked by [`HealingReconciler::is_consistent`]: `active`
/// holds exactly the ids of records whose status is not terminal.
#[derive(Debug, Default)]
pub struct HealingReconciler {
    records: Vec<HealingRecord>,
    index: HashMap<HealingId, usize>,
    active: HashSet<HealingId>,
}

impl HealingReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in creation order.
    pub fn records(&self) -> &[HealingRecord] {
        &self.records
    }

    pub fn get(&self, id: &HealingId) -> Option<&HealingRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn active(&self) -> &HashSet<HealingId> {
        &self.active
    }

    pub fn is_consistent(&self) -> bool {
        let in_flight: HashSet<HealingId> = self
            .records
            .iter()
            .filter(|r| !r.is_terminal())
            .map(|r| r.healing_id)
            .collect();
        in_flight == self.active
    }

    /// Reconcile one notification.
    pub fn apply(&mut self, event: HealingEvent, now: DateTime<Utc>) -> ReconcileOutcome {
        let sessionless = event.healing_session_id.is_none();
        let outcome = match correlate(self.records.iter(), &event) {
            None => self.create(event, now),
            Some(id) => self.merge(id, event, now),
        };
        // Later sessionless notifications for this locator follow this one,
        // even when it was ignored.
        if sessionless {
            if let Some(&i) = self.index.get(&outcome.healing_id) {
                self.records[i].sessionless_bound = true;
            }
        }
        outcome
    }

    fn create(&mut self, event: HealingEvent, now: DateTime<Utc>) -> ReconcileOutcome {
        let healing_id = HealingId::new();
        let terminal = event.status.is_terminal();

        info!(
            healing_id = %healing_id,
            locator_key = %event.locator_key,
            status = ?event.status,
            "new healing attempt observed"
        );

        let record = HealingRecord {
            healing_id,
            locator_key: event.locator_key,
            old_locator: event.old_locator,
            new_locator: event.new_locator,
            status: event.status,
            error: event.error,
            healing_session_id: event.healing_session_id,
            execution_start_time: now,
            updated_at: now,
            events_applied: 1,
            sessionless_bound: false,
        };

        self.index.insert(healing_id, self.records.len());
        self.records.push(record);
        self.refresh_active(healing_id, terminal);

        ReconcileOutcome {
            healing_id,
            kind: ReconcileKind::Created,
            became_terminal: terminal,
        }
    }

    fn merge(&mut self, id: HealingId, event: HealingEvent, now: DateTime<Utc>) -> ReconcileOutcome {
        let Some(&i) = self.index.get(&id) else {
            // correlate only returns ids taken from `records`
            return self.create(event, now);
        };
        let record = &mut self.records[i];

        if record.is_terminal() {
            debug!(
                healing_id = %id,
                status = ?record.status,
                incoming = ?event.status,
                "healing attempt already terminal; notification ignored"
            );
            return ReconcileOutcome {
                healing_id: id,
                kind: ReconcileKind::IgnoredTerminal,
                became_terminal: false,
            };
        }

        let regressed = event.status.stage() < record.status.stage();
        if regressed {
            warn!(
                healing_id = %id,
                from = ?record.status,
                to = ?event.status,
                "healing stage regression applied"
            );
        }

        record.status = event.status;
        if event.new_locator.is_some() {
            record.new_locator = event.new_locator;
        }
        if event.error.is_some() {
            record.error = event.error;
        }
        if record.healing_session_id.is_none() && event.healing_session_id.is_some() {
            record.healing_session_id = event.healing_session_id;
        }
        record.updated_at = now;
        record.events_applied += 1;

        let terminal = record.is_terminal();
        debug!(healing_id = %id, status = ?record.status, "healing notification merged");
        self.refresh_active(id, terminal);

        ReconcileOutcome {
            healing_id: id,
            kind: ReconcileKind::Merged { regressed },
            became_terminal: terminal,
        }
    }

    fn refresh_active(&mut self, id: HealingId, terminal: bool) {
        if terminal {
            self.active.remove(&id);
        } else {
            self.active.insert(id);
        }
    }
}
