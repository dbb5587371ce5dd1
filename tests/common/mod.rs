#![allow(dead_code)]

pub use healtrack_test_utils::{init_tracing, with_timeout};

use healtrack::events::PushEvent;
use healtrack::stream::Subscription;

/// Collect everything a subscription yields until its channel closes.
pub async fn drain<T>(mut subscription: Subscription<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(event) = subscription.recv().await {
        out.push(event);
    }
    out
}

pub fn event_types(events: &[PushEvent]) -> Vec<&'static str> {
    events.iter().map(PushEvent::event_type).collect()
}
