use ripple_batch::StreamEvent;
use ripple_operators::OperatorOptions;
use ripple_session::{QueryContainer, ReshapingPolicy};
use ripple_testing::Recorder;

use crate::{configs, render, QueryFixture};

#[test]
fn test_union_interleaves_by_time() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, false, |container, left, right| {
            container.union(left, right)
        });
        let query = fixture.run();

        query.push_left([
            StreamEvent::point(0, 1, 1i64),
            StreamEvent::point(0, 5, 5i64),
            StreamEvent::punctuation(10),
        ]);
        query.push_right([StreamEvent::point(0, 3, 3i64), StreamEvent::punctuation(4)]);
        insta::assert_snapshot!(query.take_output(), @r###"
        point(0, 1, 1i64)
        point(0, 3, 3i64)
        punctuation(0, 4)
        "###);

        query.right.on_completed().unwrap();
        insta::assert_snapshot!(query.take_output(), @r###"
        point(0, 5, 5i64)
        punctuation(0, 10)
        "###);

        query.left.on_completed().unwrap();
        insta::assert_snapshot!(query.take_output(), @r###"
        punctuation(0, inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_union_of_stream_with_itself() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, false, |container, left, _| {
            container.union(left, left)
        });
        let query = fixture.run();

        query.push_left([StreamEvent::point(0, 1, 1i64), StreamEvent::punctuation(10)]);
        insta::assert_snapshot!(query.take_output(), @r###"
        point(0, 1, 1i64)
        point(0, 1, 1i64)
        punctuation(0, 10)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_outputs_share_a_stream() {
    let mut container = QueryContainer::new(Default::default());
    let input = container
        .register_input(crate::int64(true), Default::default())
        .unwrap();
    let other = container
        .register_input(crate::int64(true), Default::default())
        .unwrap();
    let joined = container
        .join(input.stream(), other.stream(), OperatorOptions::default())
        .unwrap();
    let first = container
        .register_output(input.stream(), ReshapingPolicy::None)
        .unwrap();
    let second = container
        .register_output(input.stream(), ReshapingPolicy::None)
        .unwrap();
    let _unused = container
        .register_output(&joined, ReshapingPolicy::None)
        .unwrap();

    let process = container.restore(None).unwrap();
    let recorders = [Recorder::new(), Recorder::new()];
    let _subscriptions: Vec<_> = [first, second]
        .iter()
        .zip(&recorders)
        .map(|(output, recorder)| {
            process
                .egress(output)
                .unwrap()
                .subscribe(recorder.callback())
                .unwrap()
        })
        .collect();

    let ingress = process.ingress(&input).unwrap();
    ingress.on_next(StreamEvent::point(7, 1, 1i64)).unwrap();
    ingress.on_next(StreamEvent::low_watermark(5)).unwrap();

    insta::allow_duplicates! {
    for recorder in &recorders {
        insta::assert_snapshot!(render(recorder.to_strings()), @r###"
        point(7, 1, 1i64)
        low_watermark(5)
        "###);
    }
    }
}
