use arrow_schema::DataType;
use ripple_arrow::scalar_value::ScalarValue;
use ripple_batch::{StreamEvent, StreamProperties};
use ripple_ingress::IngressOptions;
use ripple_operators::{OperatorOptions, PayloadEquality};
use ripple_session::{Config, Error, ReshapingPolicy};

use crate::{configs, QueryFixture};

#[test]
fn test_clip_at_first_right_event() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = QueryFixture::new(config, false, |container, left, right| {
            container.clip(left, right, OperatorOptions::default())
        });
        let query = fixture.run();

        query.push_left([
            StreamEvent::interval(1, 0, 100, 1i64),
            StreamEvent::start(2, 5, 2i64),
        ]);
        query.push_right([
            StreamEvent::point(1, 50, 0i64),
            StreamEvent::point(2, 60, 0i64),
            StreamEvent::point(2, 70, 0i64),
        ]);
        query.complete();
        insta::assert_snapshot!(query.take_output(), @r###"
        interval(1, [0, 50), 1i64)
        start(2, 5, 2i64)
        end(2, 60, 5, 2i64)
        punctuation(0, inf)
        "###);
        query.assert_no_leaks();
    }
    }
}

fn record(id: i64, value: &str) -> ScalarValue {
    ScalarValue::record(vec![("id", id.into()), ("value", value.into())])
}

fn clip_records(config: Config, equality: PayloadEquality) -> error_stack::Result<QueryFixture, Error> {
    QueryFixture::try_new(
        config,
        [
            StreamProperties::new(false, record(0, "").data_type()),
            StreamProperties::new(false, DataType::Int64),
        ],
        IngressOptions::default(),
        ReshapingPolicy::None,
        |container, left, right| {
            container.clip(
                left,
                right,
                OperatorOptions::default().with_left_equality(equality),
            )
        },
    )
}

#[test]
fn test_custom_comparer_rejected_by_columnar_execution() {
    let error = clip_records(
        Config::default(),
        PayloadEquality::custom(|a, b| a == b),
    )
    .unwrap_err();
    assert!(matches!(error.current_context(), Error::StreamProcessing));
    assert!(error.contains::<ripple_operators::Error>());
    assert!(matches!(
        error.downcast_ref::<ripple_operators::Error>(),
        Some(ripple_operators::Error::InvalidComparer)
    ));
}

/// Run a start edge closed by an end edge whose payload differs outside of
/// the `id` field.
fn run_edges(fixture: &QueryFixture) -> String {
    let query = fixture.run();
    query.push_left([
        StreamEvent::start(1, 0, record(1, "a")),
        StreamEvent::end(1, 5, 0, record(1, "b")),
    ]);
    query.complete();
    query.assert_no_leaks();
    query.take_output()
}

#[test]
fn test_custom_comparer_matches_declared_fields() {
    let id = |payload: &ScalarValue| {
        payload
            .as_record()
            .and_then(|record| record.field("id"))
            .cloned()
    };
    let custom = clip_records(
        Config::default().with_force_row_based_execution(true),
        PayloadEquality::custom(move |a, b| id(a) == id(b)),
    )
    .unwrap();
    let fields = clip_records(Config::default(), PayloadEquality::fields(["id"])).unwrap();

    insta::assert_snapshot!(run_edges(&custom), @r###"
    start(1, 0, {id: 1i64, value: "a"})
    end(1, 5, 0, {id: 1i64, value: "a"})
    punctuation(0, inf)
    "###);
    assert_eq!(run_edges(&fields), run_edges(&custom));
}

#[test]
fn test_unmatched_end_edge_is_dropped() {
    insta::allow_duplicates! {
    for config in configs() {
        let fixture = clip_records(config, PayloadEquality::AllFields).unwrap();
        insta::assert_snapshot!(run_edges(&fixture), @r###"
        start(1, 0, {id: 1i64, value: "a"})
        punctuation(0, inf)
        "###);
    }
    }
}
