use ripple_batch::StreamEvent;
use ripple_operators::{OperatorOptions, Side};
use ripple_session::{Config, Error, ReshapingPolicy};

use crate::{configs, render, QueryFixture, RunningQuery};

fn join_fixture(config: Config) -> QueryFixture {
    QueryFixture::new(config, true, |container, left, right| {
        container.left_outer_join(left, right, OperatorOptions::default())
    })
}

fn inputs() -> Vec<(Side, StreamEvent)> {
    vec![
        (Side::Left, StreamEvent::interval(1, 0, 10, 1i64)),
        (Side::Right, StreamEvent::interval(1, 5, 20, 2i64)),
        (Side::Left, StreamEvent::start(2, 3, 3i64)),
        (Side::Left, StreamEvent::low_watermark(8)),
        (Side::Right, StreamEvent::low_watermark(8)),
        (Side::Right, StreamEvent::start(2, 9, 4i64)),
        (Side::Left, StreamEvent::end(2, 12, 3, 3i64)),
        (Side::Left, StreamEvent::interval(3, 12, 40, 5i64)),
        (Side::Left, StreamEvent::low_watermark(15)),
        (Side::Right, StreamEvent::end(2, 16, 9, 4i64)),
        (Side::Right, StreamEvent::low_watermark(15)),
        (Side::Left, StreamEvent::interval(1, 15, 30, 6i64)),
        (Side::Right, StreamEvent::point(1, 20, 7i64)),
        (Side::Right, StreamEvent::low_watermark(25)),
        (Side::Left, StreamEvent::low_watermark(25)),
    ]
}

fn push(query: &RunningQuery, inputs: &[(Side, StreamEvent)]) {
    for (side, event) in inputs {
        match side {
            Side::Left => query.push_left([event.clone()]),
            Side::Right => query.push_right([event.clone()]),
        }
    }
}

fn uninterrupted() -> String {
    let fixture = join_fixture(Config::default());
    let query = fixture.run();
    push(&query, &inputs());
    query.complete();
    query.take_output()
}

#[test]
fn test_restore_in_either_mode() {
    let expected = uninterrupted();
    assert!(expected.ends_with("low_watermark(inf)"));

    let inputs = inputs();
    for split in [1, 4, 7, 11, inputs.len()] {
        for before in configs() {
            for after in configs() {
                let fixture = join_fixture(before.clone());
                let query = fixture.run();
                push(&query, &inputs[..split]);
                let checkpoint = query.checkpoint();
                let mut output = query.take_events();
                drop(query);

                let fixture = join_fixture(after);
                let query = fixture.restore(&checkpoint);
                push(&query, &inputs[split..]);
                query.complete();
                output.extend(query.take_events());
                assert_eq!(render(output), expected, "split at {split}");
                query.assert_no_leaks();
            }
        }
    }
}

#[test]
fn test_checkpoint_requires_sealed_ingress() {
    let fixture = join_fixture(Config::default());
    let query = fixture.run();
    query.push_left([StreamEvent::interval(1, 0, 10, 1i64)]);

    let error = query.process.checkpoint(&mut Vec::new()).unwrap_err();
    assert!(matches!(error.current_context(), Error::Checkpoint));
    assert!(!query.process.is_failed());

    query.process.flush().unwrap();
    query.process.checkpoint(&mut Vec::new()).unwrap();
}

#[test]
fn test_restore_rejects_other_topology() {
    let fixture = join_fixture(Config::default());
    let query = fixture.run();
    push(&query, &inputs()[..4]);
    let checkpoint = query.checkpoint();

    let other = QueryFixture::new(Config::default(), true, |container, left, right| {
        container.union(left, right)
    });
    let mut reader = checkpoint.as_slice();
    let error = other
        .container
        .restore(Some(&mut reader as &mut dyn std::io::Read))
        .unwrap_err();
    assert!(matches!(error.current_context(), Error::Restore));
}

#[test]
fn test_restore_keeps_coalescing_edges() {
    let fixture = |config: Config| {
        QueryFixture::try_new(
            config,
            [crate::int64(false), crate::int64(false)],
            Default::default(),
            ReshapingPolicy::CoalesceEndEdges,
            |container, left, right| container.union(left, right),
        )
        .unwrap()
    };

    let before = fixture(Config::default());
    let query = before.run();
    query.right.on_completed().unwrap();
    query.push_left([StreamEvent::start(1, 0, 1i64)]);
    let checkpoint = query.checkpoint();
    insta::assert_snapshot!(query.take_output(), @"");
    drop(query);

    let after = fixture(Config::default().with_force_row_based_execution(true));
    let query = after.restore(&checkpoint);
    query.push_left([StreamEvent::end(1, 5, 0, 1i64)]);
    query.left.on_completed().unwrap();
    insta::assert_snapshot!(query.take_output(), @r###"
    interval(1, [0, 5), 1i64)
    punctuation(0, inf)
    "###);
}
