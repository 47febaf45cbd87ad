//! Conditional transitions under contention.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;

use common::TestHarness;
use moverflow::{CategoryKey, EntityId, JobRecordStore, JobStatus, TransitionFields};

const RACERS: usize = 8;

fn race_to_start(stores: Vec<JobRecordStore>, entity: &EntityId) -> usize {
    let barrier = Arc::new(Barrier::new(stores.len()));
    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let barrier = Arc::clone(&barrier);
            let entity = entity.clone();
            thread::spawn(move || {
                barrier.wait();
                store
                    .transition(
                        &entity,
                        CategoryKey::FinalSummary,
                        &JobStatus::STARTABLE,
                        JobStatus::InProgress,
                        TransitionFields::started(Utc::now()),
                    )
                    .unwrap()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count()
}

#[test]
fn test_concurrent_start_has_single_winner() {
    let harness = TestHarness::new();
    let entity = EntityId::new("NASDAQ:AAPL:2026-03-13");

    let stores = (0..RACERS).map(|_| harness.store.clone()).collect();
    assert_eq!(race_to_start(stores, &entity), 1);

    let record = harness
        .store
        .get(&entity, CategoryKey::FinalSummary)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::InProgress);
    assert_eq!(record.attempts, 1);
}

#[test]
fn test_concurrent_start_across_connections_has_single_winner() {
    let harness = TestHarness::new();
    let entity = EntityId::new("NYSE:JPM:2026-03-13");

    let stores: Vec<JobRecordStore> = (0..RACERS)
        .map(|i| {
            if i % 2 == 0 {
                harness.store.clone()
            } else {
                harness.second_store()
            }
        })
        .collect();
    assert_eq!(race_to_start(stores, &entity), 1);

    let other = harness.second_store();
    let record = other
        .get(&entity, CategoryKey::FinalSummary)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::InProgress);
    assert_eq!(record.attempts, 1);
}

#[test]
fn test_stale_owner_cannot_overwrite_reaped_record() {
    let harness = TestHarness::new();
    let entity = EntityId::new("NASDAQ:NFLX:2026-03-13");
    let reaper_side = harness.second_store();

    assert!(harness
        .store
        .transition(
            &entity,
            CategoryKey::Competition,
            &[JobStatus::NotStarted],
            JobStatus::InProgress,
            TransitionFields::started(Utc::now() - chrono::Duration::hours(1)),
        )
        .unwrap());

    assert!(reaper_side
        .fail_if_stale(
            &entity,
            CategoryKey::Competition,
            Utc::now() - chrono::Duration::minutes(15),
            moverflow::STALE_MESSAGE,
        )
        .unwrap());

    assert!(!harness
        .store
        .transition(
            &entity,
            CategoryKey::Competition,
            &[JobStatus::InProgress],
            JobStatus::Completed,
            TransitionFields::completed(Utc::now(), moverflow::OutputRef("late".to_string())),
        )
        .unwrap());
    let reaped = harness
        .store
        .get(&entity, CategoryKey::Competition)
        .unwrap()
        .unwrap();
    assert_eq!(reaped.status, JobStatus::Failed);
    assert!(reaped.output_ref.is_none());

    assert!(reaper_side
        .transition(
            &entity,
            CategoryKey::Competition,
            &JobStatus::STARTABLE,
            JobStatus::InProgress,
            TransitionFields::started(Utc::now()),
        )
        .unwrap());

    let record = harness
        .store
        .get(&entity, CategoryKey::Competition)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, JobStatus::InProgress);
    assert_eq!(record.attempts, 2);
}
