//! Completeness classification over real job histories.

mod common;

use common::TestHarness;
use moverflow::{
    CategoryKey, Classification, CompletenessService, EntityId, EntityKind, GenerationRequest,
};

#[tokio::test]
async fn test_missing_partial_and_complete_movers() {
    let harness = TestHarness::new();
    let dispatcher = harness.dispatcher();
    let kind = EntityKind::DailyMover;

    let untouched = EntityId::new("NASDAQ:INTC:2026-03-13");
    let partial = EntityId::new("NASDAQ:AMZN:2026-03-13");
    let complete = EntityId::new("NASDAQ:META:2026-03-13");

    harness
        .store
        .ensure_records(&untouched, kind.expected_categories())
        .unwrap();

    let three = GenerationRequest::new(
        partial.clone(),
        kind,
        vec![
            CategoryKey::BusinessAndMoat,
            CategoryKey::FinancialAnalysis,
            CategoryKey::Competition,
        ],
        serde_json::json!({}),
    );
    assert!(dispatcher.dispatch(&three).await.is_clean());
    assert!(dispatcher
        .dispatch(&GenerationRequest::all(complete.clone(), kind, serde_json::json!({})))
        .await
        .is_clean());

    let service = CompletenessService::new(harness.store.clone());

    let summary = service.summary(&untouched, kind).unwrap();
    assert_eq!(summary.completed_count, 0);
    assert_eq!(summary.missing_count, 5);
    assert_eq!(summary.classification, Some(Classification::Missing));

    let summary = service.summary(&partial, kind).unwrap();
    assert_eq!(summary.completed_count, 3);
    assert_eq!(summary.missing_count, 2);
    assert_eq!(summary.classification, Some(Classification::Partial));
    assert_eq!(summary.categories.get(&CategoryKey::FinalSummary), Some(&false));

    let summary = service.summary(&complete, kind).unwrap();
    assert_eq!(summary.completed_count, 5);
    assert_eq!(summary.classification, Some(Classification::Complete));

    let report = service
        .report(&[(untouched, kind), (partial, kind), (complete, kind)])
        .unwrap();
    assert_eq!(report.missing_count, 1);
    assert_eq!(report.partial_count, 1);
    assert_eq!(report.complete_count, 1);
    assert_eq!(report.undefined_count, 0);
}

#[tokio::test]
async fn test_failed_category_counts_as_missing() {
    let harness = TestHarness::new();
    harness
        .generator
        .fail_on(CategoryKey::FinalSummary, "model refused");
    let entity = EntityId::new("NYSE:PFE:2026-03-13");
    let kind = EntityKind::DailyMover;

    harness
        .dispatcher()
        .dispatch(&GenerationRequest::all(entity.clone(), kind, serde_json::json!({})))
        .await;

    let summary = CompletenessService::new(harness.store.clone())
        .summary(&entity, kind)
        .unwrap();
    assert_eq!(summary.completed_count, 4);
    assert_eq!(summary.classification, Some(Classification::Partial));
}
