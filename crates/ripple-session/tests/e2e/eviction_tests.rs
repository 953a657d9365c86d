use ripple_batch::{EventKind, StreamEvent};
use ripple_operators::OperatorOptions;

use crate::{configs, render, QueryFixture};

/// A partition with an open interval must not keep the partitions that
/// come and go behind it resident.
#[test]
fn test_dormant_partition_does_not_block_eviction() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, true, |container, left, right| {
            container.left_outer_join(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([StreamEvent::interval(1, 0, 1000, 1i64)]);
        for round in 1..=20i64 {
            let key = 100 + round as u64;
            let time = round * 10;
            query.push_left([
                StreamEvent::point(key, time, round),
                StreamEvent::low_watermark(time + 1),
            ]);
            query.push_right([
                StreamEvent::point(key, time, round),
                StreamEvent::low_watermark(time + 1),
            ]);

            let resident = query.process.num_partitions(&fixture.stream).unwrap();
            assert!(resident <= 3, "{resident} partitions resident after round {round}");
        }

        let events = query.take_events();
        let matched = events
            .iter()
            .filter(|event| event.kind.is_data() && event.key != 1)
            .count();
        assert_eq!(matched, 20);
        assert!(events.iter().all(|event| event.key != 1));

        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [0, 1000), {left: 1i64, right: null})
        low_watermark(inf)
        "###);
        assert_eq!(query.process.num_partitions(&fixture.stream).unwrap(), 0);
        query.assert_no_leaks();
    }
    }
}

/// Rounds larger than a batch evict the partitions they touch while the
/// dormant partition keeps its state and still matches when it wakes up.
#[test]
fn test_dormant_partition_survives_multi_batch_rounds() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(
            config.with_data_batch_size(5),
            true,
            |container, left, right| {
                container.left_outer_join(left, right, OperatorOptions::default())
            },
        );
        let query = fixture.run();

        query.push_left([StreamEvent::interval(1, 0, 1000, 1i64)]);
        for round in 1..=10i64 {
            let time = round * 10;
            let points = |offset: i64| {
                (0..7u64)
                    .map(|key| StreamEvent::point(100 + key, time, offset + key as i64))
                    .collect::<Vec<_>>()
            };
            query.push_left(points(0));
            query.push_left([StreamEvent::low_watermark(time + 1)]);
            query.push_right(points(100));
            query.push_right([StreamEvent::low_watermark(time + 1)]);
        }
        assert!(query.process.num_partitions(&fixture.stream).unwrap() <= 8);
        let matched = query
            .take_events()
            .into_iter()
            .filter(|event| event.kind.is_data())
            .count();
        assert_eq!(matched, 70);

        query.push_right([StreamEvent::point(1, 500, 9i64)]);
        query.complete();
        let woken: Vec<_> = query
            .take_events()
            .into_iter()
            .filter(|event| event.kind.is_data() && event.key == 1)
            .collect();
        insta::assert_snapshot!(render(woken), @r###"
        point(1, 500, {left: 1i64, right: 9i64})
        "###);
        query.assert_no_leaks();
    }
    }
}

/// The output low watermark is held back by the open interval even though
/// the inputs advance.
#[test]
fn test_open_interval_holds_output_low_watermark() {
    let fixture = QueryFixture::new(Default::default(), true, |container, left, right| {
        container.left_outer_join(left, right, OperatorOptions::default())
    });
    let query = fixture.run();

    query.push_left([
        StreamEvent::interval(1, 5, 1000, 1i64),
        StreamEvent::low_watermark(100),
    ]);
    query.push_right([StreamEvent::low_watermark(100)]);
    let low_watermarks: Vec<_> = query
        .take_events()
        .into_iter()
        .filter(|event| event.kind == EventKind::LowWatermark)
        .map(|event| event.to_string())
        .collect();
    insta::assert_snapshot!(render(low_watermarks), @r###"
    low_watermark(5)
    "###);
}
