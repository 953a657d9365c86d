use ripple_batch::StreamEvent;
use ripple_operators::OperatorOptions;

use crate::{configs, QueryFixture};

#[test]
fn test_where_not_exists_partitioned() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, true, |container, left, right| {
            container.where_not_exists(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([
            StreamEvent::interval(1, 10, 15, 1i64),
            StreamEvent::interval(1, 30, 35, 2i64),
        ]);
        // [5, 10) ends where the first left interval starts, and [10, 15)
        // is on key 2, so neither excludes anything on the left.
        query.push_right([
            StreamEvent::interval(1, 5, 10, 10i64),
            StreamEvent::interval(2, 10, 15, 20i64),
        ]);
        insta::assert_snapshot!(query.take_output(), @"");

        query.push_left([StreamEvent::low_watermark(20)]);
        query.push_right([StreamEvent::low_watermark(20)]);
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [10, 15), 1i64)
        low_watermark(20)
        "###);

        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [30, 35), 2i64)
        low_watermark(inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_where_not_exists_unpartitioned() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, false, |container, left, right| {
            container.where_not_exists(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([
            StreamEvent::interval(1, 0, 10, 1i64),
            StreamEvent::start(2, 0, 2i64),
        ]);
        query.push_right([StreamEvent::point(1, 5, 0i64)]);
        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        start(2, 0, 2i64)
        punctuation(0, inf)
        "###);
        query.assert_no_leaks();
    }
    }
}
