use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use ripple_batch::StreamEvent;
use ripple_session::{Config, ReshapingPolicy, Subscription};
use ripple_testing::Recorder;

use crate::{int64, render, QueryFixture};

fn union_fixture(reshaping: ReshapingPolicy) -> QueryFixture {
    QueryFixture::try_new(
        Config::default(),
        [int64(false), int64(false)],
        Default::default(),
        reshaping,
        |container, left, right| container.union(left, right),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_channel_ends_with_stream() {
    let fixture = union_fixture(ReshapingPolicy::None);
    let query = fixture.run();
    let events = query
        .process
        .egress(&fixture.output)
        .unwrap()
        .channel()
        .unwrap();

    let left = query.left.clone();
    let right = query.right.clone();
    let producer = tokio::task::spawn_blocking(move || {
        for time in 0..5 {
            left.on_next(StreamEvent::point(0, time, time)).unwrap();
        }
        left.on_completed().unwrap();
        right.on_completed().unwrap();
    });

    let received: Vec<String> = events.map(|event| event.to_string()).collect().await;
    producer.await.unwrap();
    insta::assert_snapshot!(render(received), @r###"
    point(0, 0, 0i64)
    point(0, 1, 1i64)
    point(0, 2, 2i64)
    point(0, 3, 3i64)
    point(0, 4, 4i64)
    punctuation(0, inf)
    "###);
    query.assert_no_leaks();
}

#[test]
fn test_dispose_from_callback() {
    let fixture = union_fixture(ReshapingPolicy::None);
    let query = fixture.run();
    let egress = query.process.egress(&fixture.output).unwrap();

    let subscription: Arc<Mutex<Option<Subscription>>> = Arc::default();
    let seen = Recorder::new();
    let handle = subscription.clone();
    let record = seen.clone();
    *subscription.lock() = Some(
        egress
            .subscribe(move |event: &StreamEvent| {
                record.push(event.to_string());
                if let Some(subscription) = handle.lock().as_ref() {
                    subscription.dispose();
                }
            })
            .unwrap(),
    );

    query.push_left([
        StreamEvent::point(0, 1, 1i64),
        StreamEvent::point(0, 2, 2i64),
        StreamEvent::punctuation(5),
    ]);
    query.right.on_completed().unwrap();
    insta::assert_snapshot!(render(seen.take()), @r###"
    point(0, 1, 1i64)
    "###);
    assert!(subscription.lock().as_ref().unwrap().is_disposed());

    // Other subscribers are unaffected.
    insta::assert_snapshot!(query.take_output(), @r###"
    point(0, 1, 1i64)
    point(0, 2, 2i64)
    punctuation(0, 5)
    "###);

    query.left.on_completed().unwrap();
    assert!(seen.is_empty());
}

#[test]
fn test_late_subscriber_sees_later_output() {
    let fixture = union_fixture(ReshapingPolicy::None);
    let query = fixture.run();
    query.right.on_completed().unwrap();
    query.push_left([StreamEvent::point(0, 1, 1i64), StreamEvent::punctuation(2)]);

    let late = Recorder::new();
    let subscription = query
        .process
        .egress(&fixture.output)
        .unwrap()
        .subscribe(late.callback())
        .unwrap();
    query.push_left([StreamEvent::point(0, 3, 3i64), StreamEvent::punctuation(4)]);
    insta::assert_snapshot!(render(late.to_strings()), @r###"
    point(0, 3, 3i64)
    punctuation(0, 4)
    "###);

    drop(subscription);
    query.left.on_completed().unwrap();
    assert_eq!(late.len(), 2);
    assert_eq!(query.take_events().len(), 5);
}

#[test]
fn test_coalesce_end_edges() {
    insta::allow_duplicates! {
    for config in crate::configs() {
        let fixture = QueryFixture::try_new(
            config,
            [int64(false), int64(false)],
            Default::default(),
            ReshapingPolicy::CoalesceEndEdges,
            |container, left, right| container.union(left, right),
        )
        .unwrap();
        let query = fixture.run();
        query.right.on_completed().unwrap();

        query.push_left([
            StreamEvent::start(1, 0, 1i64),
            StreamEvent::end(1, 5, 0, 1i64),
            StreamEvent::start(2, 6, 2i64),
            StreamEvent::punctuation(7),
        ]);
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [0, 5), 1i64)
        start(2, 6, 2i64)
        punctuation(0, 7)
        "###);

        // A start edge at the end of the output is held until a flush.
        query.push_left([StreamEvent::start(3, 8, 3i64), StreamEvent::start(4, 9, 4i64)]);
        query.process.flush().unwrap();
        insta::assert_snapshot!(query.take_output(), @r###"
        start(3, 8, 3i64)
        "###);
        query.assert_no_leaks();
    }
    }
}
