// tests/multiplexer.rs

use proptest::prelude::*;

use healtrack::stream::{Multiplexer, StreamError};

#[test]
fn subscribers_see_publish_order_then_end_of_stream() {
    let mut mux: Multiplexer<u32, String> = Multiplexer::new();
    assert!(mux.open(1));
    let mut sub = mux.subscribe(1).expect("open channel");

    mux.publish(1, "a".into());
    mux.publish(1, "b".into());
    assert!(mux.close(1));

    assert_eq!(sub.try_recv().as_deref(), Some("a"));
    assert_eq!(sub.try_recv().as_deref(), Some("b"));
    assert_eq!(sub.try_recv(), None);
}

#[test]
fn late_subscribers_get_no_backlog() {
    let mut mux: Multiplexer<u32, u32> = Multiplexer::new();
    mux.open(7);
    mux.publish(7, 1);

    let mut late = mux.subscribe(7).expect("open channel");
    mux.publish(7, 2);

    assert_eq!(late.try_recv(), Some(2));
    assert_eq!(late.try_recv(), None);
    assert_eq!(mux.published(&7), Some(2));
}

#[test]
fn greeting_reaches_only_the_new_subscriber() {
    let mut mux: Multiplexer<u32, &'static str> = Multiplexer::new();
    mux.open(1);
    let mut first = mux.subscribe(1).expect("open");
    let mut second = mux.subscribe_with_greeting(1, "hello").expect("open");
    mux.publish(1, "event");

    assert_eq!(first.try_recv(), Some("event"));
    assert_eq!(first.try_recv(), None);
    assert_eq!(second.try_recv(), Some("hello"));
    assert_eq!(second.try_recv(), Some("event"));
}

#[test]
fn forgotten_keys_are_no_longer_remembered() {
    let mut mux: Multiplexer<u32, u32> = Multiplexer::new();
    mux.open(5);
    mux.open(6);
    mux.close(5);
    assert_eq!(mux.closed_count(), 1);

    mux.forget(&5);
    mux.forget(&6);
    assert_eq!(mux.closed_count(), 0);
    assert_eq!(mux.subscribe(5).unwrap_err(), StreamError::UnknownChannel);
    assert_eq!(mux.subscribe(6).unwrap_err(), StreamError::UnknownChannel);
    assert!(!mux.is_open(&6));
}

#[test]
fn close_is_idempotent_and_final() {
    let mut mux: Multiplexer<u32, u32> = Multiplexer::new();
    mux.open(3);
    assert!(mux.close(3));
    assert!(!mux.close(3));
    assert!(!mux.open(3), "closed channels are never reopened");

    assert_eq!(mux.subscribe(3).unwrap_err(), StreamError::Closed);
    assert_eq!(mux.subscribe(4).unwrap_err(), StreamError::UnknownChannel);
    assert_eq!(mux.publish(3, 1), 0);
}

#[test]
fn dropped_subscribers_are_pruned_on_publish() {
    let mut mux: Multiplexer<u32, u32> = Multiplexer::new();
    mux.open(1);
    let keep = mux.subscribe(1).expect("open");
    let gone = mux.subscribe(1).expect("open");
    assert_eq!(mux.subscriber_count(&1), 2);

    drop(gone);
    assert_eq!(mux.publish(1, 10), 1);
    assert_eq!(mux.subscriber_count(&1), 1);
    drop(keep);
}

#[test]
fn keys_are_independent() {
    let mut mux: Multiplexer<u32, u32> = Multiplexer::new();
    mux.open(1);
    mux.open(2);
    let mut one = mux.subscribe(1).expect("open");
    let mut two = mux.subscribe(2).expect("open");

    mux.publish(1, 100);
    mux.close(2);
    mux.publish(1, 101);

    assert_eq!(one.try_recv(), Some(100));
    assert_eq!(one.try_recv(), Some(101));
    assert_eq!(two.try_recv(), None);
    assert!(mux.is_open(&1));
    assert!(!mux.is_open(&2));
}

#[tokio::test]
async fn into_stream_ends_when_channel_closes() {
    use futures::StreamExt;

    let mut mux: Multiplexer<(), u32> = Multiplexer::new();
    mux.open(());
    let sub = mux.subscribe(()).expect("open");
    mux.publish((), 1);
    mux.publish((), 2);
    mux.close_all();

    let collected: Vec<u32> = sub.into_stream().collect().await;
    assert_eq!(collected, vec![1, 2]);
}

#[derive(Debug, Clone)]
enum Op {
    Publish(u32),
    Subscribe,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<u32>().prop_map(Op::Publish),
        1 => Just(Op::Subscribe),
    ]
}

proptest! {
    /// Every subscriber sees exactly the suffix of the publish sequence that
    /// started after it subscribed, in order, without duplicates.
    #[test]
    fn subscribers_observe_contiguous_suffix(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let mut mux: Multiplexer<u8, u32> = Multiplexer::new();
        mux.open(0);

        let mut published = Vec::new();
        let mut subscribers = Vec::new();

        for op in ops {
            match op {
                Op::Publish(v) => {
                    mux.publish(0, v);
                    published.push(v);
                }
                Op::Subscribe => {
                    let sub = mux.subscribe(0).expect("open channel");
                    subscribers.push((published.len(), sub));
                }
            }
        }
        mux.close(0);

        for (start, mut sub) in subscribers {
            let mut seen = Vec::new();
            while let Some(v) = sub.try_recv() {
                seen.push(v);
            }
            prop_assert_eq!(&seen[..], &published[start..]);
        }
    }
}
