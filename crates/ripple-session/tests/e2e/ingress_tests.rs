//! Ingress policies observed through a running query.
//!
//! The right input completes immediately, so the union passes the left
//! input through unchanged.

use std::sync::Arc;

use parking_lot::Mutex;
use ripple_batch::{StreamEvent, SyncTime};
use ripple_ingress::{DisorderPolicy, IngressOptions};
use ripple_session::{Error, ReshapingPolicy};

use crate::{configs, int64, QueryFixture};

fn union_of_left(config: ripple_session::Config, options: IngressOptions) -> QueryFixture {
    QueryFixture::try_new(
        config,
        [int64(true), int64(true)],
        options,
        ReshapingPolicy::None,
        |container, left, right| container.union(left, right),
    )
    .unwrap()
}

#[test]
fn test_drop_late_events_behind_low_watermark() {
    insta::allow_duplicates! {
    for config in configs() {
        let options = IngressOptions::default().with_disorder(DisorderPolicy::Drop {
            reorder_latency: 500,
        });
        let fixture = union_of_left(config, options);
        let query = fixture.run();
        query.right.on_completed().unwrap();

        query.push_left([
            StreamEvent::point(0, 1, 1i64),
            StreamEvent::point(0, 101, 2i64),
            StreamEvent::low_watermark(100),
            StreamEvent::point(0, 99, 3i64),
        ]);
        query.left.on_completed().unwrap();

        insta::assert_snapshot!(query.take_output(), @r###"
        point(0, 1, 1i64)
        low_watermark(100)
        point(0, 101, 2i64)
        low_watermark(inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_late_event_poisons_process() {
    let fixture = union_of_left(Default::default(), IngressOptions::default());
    let query = fixture.run();

    query.push_left([StreamEvent::point(0, 10, 1i64)]);
    let error = query
        .left
        .on_next(StreamEvent::point(0, 5, 2i64))
        .unwrap_err();
    assert!(matches!(error.current_context(), Error::StreamProcessing));
    assert!(matches!(
        error.downcast_ref::<ripple_ingress::Error>(),
        Some(ripple_ingress::Error::OutOfOrder { .. })
    ));
    assert!(query.process.is_failed());

    let error = query
        .right
        .on_next(StreamEvent::point(0, 20, 3i64))
        .unwrap_err();
    assert!(matches!(error.current_context(), Error::ProcessFailed));
    let error = query.process.flush().unwrap_err();
    assert!(matches!(error.current_context(), Error::ProcessFailed));
    let error = query.process.checkpoint(&mut Vec::new()).unwrap_err();
    assert!(matches!(error.current_context(), Error::ProcessFailed));
}

#[test]
fn test_low_watermark_regression_fails() {
    let fixture = union_of_left(Default::default(), IngressOptions::default());
    let query = fixture.run();

    query.push_left([StreamEvent::low_watermark(100)]);
    let error = query
        .left
        .on_next(StreamEvent::low_watermark(50))
        .unwrap_err();
    assert!(matches!(
        error.downcast_ref::<ripple_ingress::Error>(),
        Some(ripple_ingress::Error::LowWatermarkRegression { .. })
    ));
}

#[test]
fn test_invalid_options_rejected_at_registration() {
    let options = IngressOptions::default().with_low_watermark(
        ripple_ingress::PeriodicLowWatermarkPolicy::Time { period: 10, lag: 0 },
    );
    let error = QueryFixture::try_new(
        Default::default(),
        [int64(false), int64(false)],
        options,
        ReshapingPolicy::None,
        |container, left, right| container.union(left, right),
    )
    .unwrap_err();
    assert!(matches!(error.current_context(), Error::RegisterInput));
}

#[test]
fn test_output_batches_are_bounded_and_ordered() {
    for config in configs() {
        let fixture = QueryFixture::try_new(
            config.with_data_batch_size(5),
            [int64(false), int64(false)],
            IngressOptions::default(),
            ReshapingPolicy::None,
            |container, left, right| container.union(left, right),
        )
        .unwrap();
        let query = fixture.run();

        let bounds: Arc<Mutex<Vec<(usize, SyncTime, SyncTime)>>> = Arc::default();
        let recorded = bounds.clone();
        let _batches = query
            .process
            .egress(&fixture.output)
            .unwrap()
            .subscribe_batches(move |batch| {
                recorded
                    .lock()
                    .push((batch.len(), batch.min_timestamp(), batch.max_timestamp()))
            })
            .unwrap();

        query.right.on_completed().unwrap();
        query
            .left
            .on_next_batch((0..12).map(|i| StreamEvent::point(0, i * 10, i)))
            .unwrap();
        query.left.on_completed().unwrap();

        let bounds = bounds.lock().clone();
        assert!(bounds.len() >= 3, "{bounds:?}");
        for (len, min, max) in &bounds {
            assert!(*len <= 5, "{bounds:?}");
            assert!(min <= max, "{bounds:?}");
        }
        for window in bounds.windows(2) {
            assert!(window[0].2 <= window[1].1, "{bounds:?}");
        }

        let events = query.take_events();
        assert_eq!(events.len(), 13);
        assert_eq!(events[12].to_string(), "punctuation(0, inf)");
        query.assert_no_leaks();
    }
}
