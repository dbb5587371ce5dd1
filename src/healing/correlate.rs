// src/healing/correlate.rs

//! Content-based correlation of healing notifications.
//!
//! Notifications are matched on `(locatorKey, oldLocator)` plus the healing
//! session id when one is known. The session id is optional on both sides:
//!
//! - incoming with session `s`: a record carrying `s` wins; otherwise an
//!   in-flight record without a session matches (and will adopt `s`);
//!   a record with a *different* session never matches.
//! - incoming without session: the record that earlier sessionless
//!   notifications for this locator went to wins. The first one picks the
//!   most recent in-flight record, otherwise the most recent finished one,
//!   so that re-deliveries of a terminal notification collapse onto the
//!   record they finished.
//!
//! Either way, notifications with equal [`CorrelationKey`]s always end up in
//! the same record. "Most recent" is creation order of the records passed in.

use crate::healing::{HealingEvent, HealingRecord};
use crate::ids::HealingId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub locator_key: String,
    pub old_locator: String,
    pub session: Option<String>,
}

impl CorrelationKey {
    pub fn of_event(event: &HealingEvent) -> Self {
        Self {
            locator_key: event.locator_key.clone(),
            old_locator: event.old_locator.clone(),
            session: event.healing_session_id.clone(),
        }
    }

    pub fn of_record(record: &HealingRecord) -> Self {
        Self {
            locator_key: record.locator_key.clone(),
            old_locator: record.old_locator.clone(),
            session: record.healing_session_id.clone(),
        }
    }

    fn same_locator(&self, other: &CorrelationKey) -> bool {
        self.locator_key == other.locator_key && self.old_locator == other.old_locator
    }
}

/// Find the record an incoming notification belongs to.
///
/// `existing` must yield records in creation order.
pub fn correlate<'a, I>(existing: I, incoming: &HealingEvent) -> Option<HealingId>
where
    I: IntoIterator<Item = &'a HealingRecord>,
{
    let wanted = CorrelationKey::of_event(incoming);

    let candidates: Vec<&HealingRecord> = existing
        .into_iter()
        .filter(|r| CorrelationKey::of_record(r).same_locator(&wanted))
        .collect();

    let pick = match wanted.session.as_deref() {
        Some(session) => candidates
            .iter()
            .rev()
            .find(|r| r.healing_session_id.as_deref() == Some(session))
            .or_else(|| {
                candidates
                    .iter()
                    .rev()
                    .find(|r| r.healing_session_id.is_none() && !r.is_terminal())
            }),
        None => candidates
            .iter()
            .rev()
            .find(|r| r.sessionless_bound)
            .or_else(|| candidates.iter().rev().find(|r| !r.is_terminal()))
            .or_else(|| candidates.last()),
    };

    pick.map(|r| r.healing_id)
}
