use super::*;
use crate::{
    aggregate::{AggregateOperator, AggregateShape},
    error::{ErrorClass, ErrorOrigin, UpstreamFailure},
    pipeline::{AggregateStage, ExecutionEnvironment, RequestCharge},
    test_support::ScriptedStage,
};
use serde_json::json;

fn sum_shape() -> AggregateShape {
    AggregateShape::select_list([("sum", Some(AggregateOperator::Sum))])
}

fn sum_pages(values: &[i64]) -> Vec<Vec<Value>> {
    values
        .iter()
        .map(|value| vec![json!({ "payload": { "sum": { "item": value } } })])
        .collect()
}

fn stage(
    environment: ExecutionEnvironment,
    pages: &[Vec<Value>],
    continuation: Option<&Value>,
) -> Result<AggregateStage, QueryError> {
    AggregateStage::try_create(environment, &sum_shape(), continuation, |source| {
        let stage = ScriptedStage::resume(pages.to_vec(), source)?;
        Ok(Box::new(stage) as Box<dyn PipelineStage>)
    })
}

fn aggregation_state(page: &QueryPage) -> Value {
    page.state.as_ref().expect("checkpoint page")["AggregationToken"].clone()
}

#[test]
fn compute_emits_one_empty_page_per_child_page_then_the_result() {
    let pages = sum_pages(&[10, 20, 5]);
    let mut stage = stage(ExecutionEnvironment::Compute, &pages, None).expect("stage");

    let emitted = drain_pages(&mut stage).expect("drain succeeds");

    assert_eq!(emitted.len(), 4);
    for page in &emitted[..3] {
        assert!(page.documents.is_empty());
        assert!(page.has_continuation());
    }
    assert_eq!(emitted[3].documents, vec![json!({ "sum": 35 })]);
    assert!(!emitted[3].has_continuation());
}

#[test]
fn compute_checkpoints_mark_the_exhausted_child_as_done() {
    let pages = sum_pages(&[10, 20, 5]);
    let mut stage = stage(ExecutionEnvironment::Compute, &pages, None).expect("stage");

    let emitted = drain_pages(&mut stage).expect("drain succeeds");
    let last_checkpoint = emitted[2].state.as_ref().expect("checkpoint");

    assert_eq!(last_checkpoint["SourceToken"], json!("DONE"));
    assert_eq!(emitted[0].state.as_ref().expect("checkpoint")["SourceToken"], json!(1));
}

#[test]
fn client_drains_everything_into_one_page() {
    let pages = sum_pages(&[10, 20, 5]);
    let mut stage = stage(ExecutionEnvironment::Client, &pages, None).expect("stage");

    let emitted = drain_pages(&mut stage).expect("drain succeeds");

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].documents, vec![json!({ "sum": 35 })]);
    assert_eq!(emitted[0].request_charge, RequestCharge::new(3.0));
    assert_eq!(emitted[0].activity_id.as_deref(), Some("scripted-3"));
    assert!(!emitted[0].has_continuation());
}

#[test]
fn client_rejects_a_continuation() {
    let err = stage(ExecutionEnvironment::Client, &[], Some(&json!({})))
        .err()
        .expect("client continuation must fail");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn resuming_from_every_checkpoint_yields_the_same_result() {
    let pages = sum_pages(&[10, 20, 5]);

    for stop_after in 1..=3 {
        let mut first = stage(ExecutionEnvironment::Compute, &pages, None).expect("stage");
        let mut checkpoint = None;
        for _ in 0..stop_after {
            checkpoint = Some(round_trip(&next_page(&mut first)));
        }

        let mut resumed = stage(ExecutionEnvironment::Compute, &pages, checkpoint.as_ref())
            .expect("checkpoint should resume");
        let rest = drain_pages(&mut resumed).expect("drain succeeds");

        assert_eq!(rest.len(), 4 - stop_after, "stopped after {stop_after}");
        assert_eq!(documents(&rest), vec![json!({ "sum": 35 })]);
    }
}

#[test]
fn child_failure_is_passed_through_and_the_fold_survives_it() {
    let pages = sum_pages(&[10, 20, 5]);
    let mut stage = AggregateStage::try_create(
        ExecutionEnvironment::Compute,
        &sum_shape(),
        None,
        move |_| {
            let stage = ScriptedStage::new(pages)
                .fail_once_at(1, UpstreamFailure::Transient { status: 503 });
            Ok(Box::new(stage) as Box<dyn PipelineStage>)
        },
    )
    .expect("stage");
    let cancellation = CancellationToken::new();

    next_page(&mut stage);
    let err = stage
        .next_page(&cancellation)
        .expect("failure is a result")
        .expect_err("injected failure");
    assert_eq!(err.class, ErrorClass::UpstreamPageFailure);
    assert_eq!(err.origin, ErrorOrigin::DataSource);

    let rest = drain_pages(&mut stage).expect("retry succeeds");
    assert_eq!(documents(&rest), vec![json!({ "sum": 35 })]);
}

#[test]
fn a_malformed_document_leaves_the_fold_untouched() {
    let pages = vec![
        vec![json!({ "payload": { "sum": { "item": 10 } } })],
        vec![
            json!({ "payload": { "sum": { "item": 20 } } }),
            json!({ "unexpected": true }),
        ],
        vec![json!({ "payload": { "sum": { "item": 5 } } })],
    ];
    let mut stage = stage(ExecutionEnvironment::Compute, &pages, None).expect("stage");
    let cancellation = CancellationToken::new();

    next_page(&mut stage);
    let err = stage
        .next_page(&cancellation)
        .expect("failure is a result")
        .expect_err("malformed page");
    assert_eq!(err.origin, ErrorOrigin::Projection);

    let after = next_page(&mut stage);
    assert_eq!(
        aggregation_state(&after)["sum"].as_f64(),
        Some(15.0),
        "the failed page must not be partly folded"
    );
}

#[test]
fn cancellation_surfaces_in_both_environments() {
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    for environment in [ExecutionEnvironment::Client, ExecutionEnvironment::Compute] {
        let mut stage = stage(environment, &sum_pages(&[1]), None).expect("stage");
        let err = stage
            .next_page(&cancellation)
            .expect("cancellation is a result")
            .expect_err("cancelled");

        assert!(err.is_cancelled(), "{environment:?}");
    }
}

#[test]
fn select_value_reads_the_first_array_element() {
    let pages = vec![vec![json!([{ "item": 2 }])], vec![json!([{ "item": 3 }])]];
    let mut stage = AggregateStage::try_create(
        ExecutionEnvironment::Compute,
        &AggregateShape::select_value(AggregateOperator::Count),
        None,
        move |_| Ok(Box::new(ScriptedStage::new(pages)) as Box<dyn PipelineStage>),
    )
    .expect("stage");

    let emitted = drain_pages(&mut stage).expect("drain succeeds");

    assert_eq!(documents(&emitted), vec![json!(5)]);
}

#[test]
fn undefined_select_value_produces_no_document() {
    let pages = vec![vec![json!([{}])]];
    let mut stage = AggregateStage::try_create(
        ExecutionEnvironment::Client,
        &AggregateShape::select_value(AggregateOperator::Sum),
        None,
        move |_| Ok(Box::new(ScriptedStage::new(pages)) as Box<dyn PipelineStage>),
    )
    .expect("stage");

    let emitted = drain_pages(&mut stage).expect("drain succeeds");

    assert_eq!(emitted.len(), 1);
    assert!(emitted[0].documents.is_empty());
}

#[test]
fn malformed_continuation_is_rejected() {
    for bad in [json!([]), json!({ "SourceToken": null }), json!({ "x": 1 })] {
        let err = stage(ExecutionEnvironment::Compute, &[], Some(&bad))
            .err()
            .expect("malformed continuation must fail");

        assert!(err.is_malformed_continuation(), "{bad}");
    }
}
