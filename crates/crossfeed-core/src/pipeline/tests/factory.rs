use super::*;
use crate::{
    aggregate::AggregateOperator,
    config::PipelineConfig,
    error::{ErrorClass, ErrorOrigin},
    pipeline::{
        DistinctType, ExecutionEnvironment, QueryInfo, QueryStage, build_pipeline,
        create_query_pipeline,
    },
    test_support::{InMemoryCollection, ScriptedStage},
};
use serde_json::json;
use std::sync::Arc;

fn group_by_info() -> QueryInfo {
    serde_json::from_value(json!({
        "groupByExpressions": ["c.k"],
        "groupByAliases": ["k", "n"],
        "groupByAliasToAggregateType": { "k": null, "n": "Count" },
        "aggregates": ["Count"],
        "hasSelectValue": false,
    }))
    .expect("query info should deserialize")
}

fn scripted(pages: Vec<Vec<Value>>) -> impl FnOnce(Option<&Value>) -> Result<Box<dyn PipelineStage>, QueryError> {
    move |continuation| {
        let stage = ScriptedStage::resume(pages, continuation)?;
        Ok(Box::new(stage) as Box<dyn PipelineStage>)
    }
}

#[test]
fn query_info_reads_camel_case_fields() {
    let info = group_by_info();

    assert!(info.has_group_by());
    assert!(info.has_aggregates());
    let shape = info.aggregate_shape();
    assert_eq!(shape.ordered_aliases, vec!["k".to_string(), "n".to_string()]);
    assert_eq!(
        shape.alias_to_aggregate.get("n"),
        Some(&Some(AggregateOperator::Count))
    );
    assert_eq!(shape.alias_to_aggregate.get("k"), Some(&None));
}

#[test]
fn stage_kind_follows_the_query_info() {
    let config = PipelineConfig::default();

    let group_by =
        build_pipeline(&group_by_info(), &config, None, scripted(vec![])).expect("group by");
    assert!(matches!(group_by, QueryStage::GroupBy(_)));

    let aggregate_info = QueryInfo {
        aggregates: vec![AggregateOperator::Sum],
        has_select_value: true,
        ..QueryInfo::default()
    };
    let aggregate =
        build_pipeline(&aggregate_info, &config, None, scripted(vec![])).expect("aggregate");
    assert!(matches!(aggregate, QueryStage::Aggregate(_)));

    let plain = build_pipeline(&QueryInfo::default(), &config, None, scripted(vec![]))
        .expect("plain read");
    assert!(matches!(plain, QueryStage::Source(_)));
}

#[test]
fn distinct_type_reads_from_query_info() {
    let info: QueryInfo = serde_json::from_value(json!({ "distinctType": "Unordered" }))
        .expect("query info should deserialize");

    assert_eq!(info.distinct_type, DistinctType::Unordered);
    assert!(info.has_distinct());
    assert!(!QueryInfo::default().has_distinct());
}

#[test]
fn distinct_sits_above_aggregate_and_below_group_by() {
    let config = PipelineConfig::default();

    let distinct_info = QueryInfo {
        aggregates: vec![AggregateOperator::Count],
        has_select_value: true,
        distinct_type: DistinctType::Ordered,
        ..QueryInfo::default()
    };
    let stage =
        build_pipeline(&distinct_info, &config, None, scripted(vec![])).expect("distinct");
    assert!(matches!(stage, QueryStage::Distinct(_)));

    let grouped = QueryInfo {
        distinct_type: DistinctType::Unordered,
        ..group_by_info()
    };
    let stage = build_pipeline(&grouped, &config, None, scripted(vec![])).expect("group by");
    assert!(matches!(stage, QueryStage::GroupBy(_)));
}

#[test]
fn distinct_plain_read_resumes_without_repeats() {
    let pages = vec![
        vec![json!(1), json!(2)],
        vec![json!(2), json!(3)],
        vec![json!(1), json!(4)],
    ];
    let info = QueryInfo {
        distinct_type: DistinctType::Unordered,
        ..QueryInfo::default()
    };
    let config = PipelineConfig::default();

    let mut first =
        build_pipeline(&info, &config, None, scripted(pages.clone())).expect("distinct");
    let page = next_page(&mut first);
    let mut results = page.documents.clone();
    let checkpoint = round_trip(&page);

    let mut resumed =
        build_pipeline(&info, &config, Some(&checkpoint), scripted(pages)).expect("resumes");
    results.extend(documents(&drain_pages(&mut resumed).expect("drain succeeds")));

    assert_eq!(results, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[test]
fn distinct_aggregate_checkpoint_nests_the_aggregate_token() {
    let pages = vec![
        vec![json!([{ "item": 2 }])],
        vec![json!([{ "item": 3 }])],
    ];
    let info = QueryInfo {
        aggregates: vec![AggregateOperator::Sum],
        has_select_value: true,
        distinct_type: DistinctType::Unordered,
        ..QueryInfo::default()
    };
    let config = PipelineConfig::default();

    let mut first = build_pipeline(&info, &config, None, scripted(pages.clone())).expect("stage");
    let page = next_page(&mut first);
    let checkpoint = round_trip(&page);
    assert!(checkpoint["SourceToken"].get("AggregationToken").is_some());

    let mut resumed =
        build_pipeline(&info, &config, Some(&checkpoint), scripted(pages)).expect("resumes");
    let rest = drain_pages(&mut resumed).expect("drain succeeds");

    assert_eq!(documents(&rest), vec![json!(5)]);
}

#[test]
fn plain_read_passes_the_continuation_to_the_source() {
    let pages = vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]];

    let mut stage = build_pipeline(
        &QueryInfo::default(),
        &PipelineConfig::default(),
        Some(&json!(2)),
        scripted(pages),
    )
    .expect("plain read");

    assert_eq!(
        documents(&drain_pages(&mut stage).expect("drain succeeds")),
        vec![json!(3)]
    );
}

#[test]
fn invalid_config_is_rejected() {
    let config = PipelineConfig {
        page_size: 0,
        ..PipelineConfig::default()
    };

    let err = build_pipeline(&group_by_info(), &config, None, scripted(vec![]))
        .expect_err("zero page size must fail");

    assert_eq!(err.origin, ErrorOrigin::Config);
}

#[test]
fn client_group_by_refuses_a_continuation() {
    let config = PipelineConfig {
        environment: ExecutionEnvironment::Client,
        ..PipelineConfig::default()
    };

    let err = build_pipeline(&group_by_info(), &config, Some(&json!({})), scripted(vec![]))
        .expect_err("client continuation must fail");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn group_by_over_a_splitting_collection_resumes_after_every_page() {
    let collection = Arc::new(InMemoryCollection::new(&["80"]));
    for (epk, key) in [
        ("10", "a"),
        ("20", "b"),
        ("30", "a"),
        ("50", "c"),
        ("60", "a"),
        ("90", "b"),
    ] {
        collection.insert(
            epk,
            json!({ "groupByItems": [key], "payload": { "k": key, "n": { "item": 1 } } }),
        );
    }
    let config = PipelineConfig {
        page_size: 2,
        ..PipelineConfig::default()
    };
    let info = group_by_info();
    let cancellation = CancellationToken::new();

    let mut continuation: Option<Value> = None;
    let mut results = Vec::new();
    let mut pulls = 0;
    loop {
        let mut stage = create_query_pipeline(
            &info,
            &config,
            continuation.as_ref(),
            collection.clone(),
            collection.clone(),
            &cancellation,
        )
        .expect("pipeline builds");
        let Some(page) = stage.next_page(&cancellation) else {
            break;
        };
        let page = page.expect("page succeeds");
        pulls += 1;
        if pulls == 1 {
            collection.split_at("40");
        }

        results.extend(page.documents.iter().cloned());
        if !page.has_continuation() {
            break;
        }
        continuation = Some(round_trip(&page));
    }

    assert_eq!(
        sorted(results),
        sorted(vec![
            json!({ "k": "a", "n": 3 }),
            json!({ "k": "b", "n": 2 }),
            json!({ "k": "c", "n": 1 }),
        ])
    );
}
