use arrow_schema::DataType;
use ripple_batch::{StreamEvent, StreamProperties};
use ripple_ingress::IngressOptions;
use ripple_operators::OperatorOptions;
use ripple_session::{Error, QueryContainer, ReshapingPolicy};

use crate::{configs, int64, QueryFixture};

#[test]
fn test_join_overlapping_intervals() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, true, |container, left, right| {
            container.join(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([StreamEvent::interval(1, 0, 10, 1i64)]);
        query.push_right([StreamEvent::interval(1, 5, 20, 2i64)]);
        query.push_left([StreamEvent::low_watermark(15)]);
        insta::assert_snapshot!(query.take_output(), @"");

        query.push_right([StreamEvent::low_watermark(15)]);
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [5, 10), {left: 1i64, right: 2i64})
        low_watermark(15)
        "###);

        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        low_watermark(inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_join_does_not_match_other_keys() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, true, |container, left, right| {
            container.join(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([
            StreamEvent::interval(1, 0, 10, 1i64),
            StreamEvent::interval(2, 0, 10, 2i64),
        ]);
        query.push_right([StreamEvent::interval(3, 0, 10, 3i64)]);
        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        low_watermark(inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_left_outer_join_pads_unmatched() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::try_new(
            config,
            [
                StreamProperties::new(true, DataType::Int64),
                StreamProperties::new(true, DataType::Utf8),
            ],
            IngressOptions::default(),
            ReshapingPolicy::None,
            |container, left, right| {
                container.left_outer_join(left, right, OperatorOptions::default())
            },
        )
        .unwrap();
        assert_eq!(
            fixture.stream.properties().payload_type,
            DataType::Struct(
                vec![
                    arrow_schema::Field::new("left", DataType::Int64, true),
                    arrow_schema::Field::new("right", DataType::Utf8, true),
                ]
                .into()
            )
        );

        let query = fixture.run();
        query.push_left([
            StreamEvent::interval(1, 0, 10, 1i64),
            StreamEvent::interval(2, 0, 10, 2i64),
        ]);
        query.push_right([StreamEvent::interval(1, 5, 8, "r")]);
        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [5, 8), {left: 1i64, right: "r"})
        interval(2, [0, 10), {left: 2i64, right: null})
        low_watermark(inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

#[test]
fn test_join_of_mixed_partitioning_rejected() {
    let error = QueryFixture::try_new(
        Default::default(),
        [int64(true), int64(false)],
        IngressOptions::default(),
        ReshapingPolicy::None,
        |container, left, right| container.join(left, right, OperatorOptions::default()),
    )
    .unwrap_err();
    assert!(matches!(error.current_context(), Error::InvalidOperator(_)));
    assert!(matches!(
        error.downcast_ref::<ripple_operators::Error>(),
        Some(ripple_operators::Error::IncompatibleInputs(_))
    ));
}

#[test]
fn test_streams_of_other_containers_rejected() {
    let mut other = QueryContainer::new(Default::default());
    let foreign = other
        .register_input(int64(true), IngressOptions::default())
        .unwrap();

    let error = QueryFixture::try_new(
        Default::default(),
        [int64(true), int64(true)],
        IngressOptions::default(),
        ReshapingPolicy::None,
        |container, left, _| container.join(left, foreign.stream(), OperatorOptions::default()),
    )
    .unwrap_err();
    assert!(matches!(error.current_context(), Error::ForeignStream));
}
