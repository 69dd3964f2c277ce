mod support;

use std::collections::HashSet;
use std::sync::Arc;

use dispatch_core::hails::{HailStore, NewHail};
use dispatch_core::model::{HailId, HailState};
use dispatch_core::requests::AssignCommand;
use dispatch_core::test_helpers::{fixed_start, AIRPORT, BUS_FAR, BUS_MID, BUS_NEAR, BUS_OTHER, CENTRAL};
use dispatch_core::DispatchError;
use support::engine::{passenger, route, seed_hails, EngineBuilder};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_group_assignments_never_share_a_hail() {
    for round in 0..20u128 {
        let engine = Arc::new(EngineBuilder::new().build());
        let key = route(CENTRAL, AIRPORT);
        let seeded = seed_hails(&engine, key, round * 100, 25).await;

        let mut tasks = Vec::new();
        for vehicle_id in [BUS_NEAR, BUS_MID, BUS_FAR, BUS_OTHER] {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .service
                    .assign_group(AssignCommand {
                        route: key,
                        vehicle_id,
                    })
                    .await
            }));
        }

        let mut claimed: Vec<HailId> = Vec::new();
        let mut winners = 0;
        for task in tasks {
            match task.await.expect("task") {
                Ok(result) => {
                    assert_eq!(result.transitioned, result.hail_ids.len());
                    assert!(result.transitioned <= result.observed);
                    claimed.extend(result.hail_ids);
                    winners += 1;
                }
                Err(DispatchError::NoPendingDemand(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert!(winners >= 1);
        let unique: HashSet<HailId> = claimed.iter().copied().collect();
        assert_eq!(unique.len(), claimed.len(), "a hail was claimed twice");
        assert_eq!(unique, seeded.iter().copied().collect::<HashSet<_>>());

        for id in seeded {
            let hail = engine.hails.get(id).await.expect("get").expect("hail");
            assert_eq!(hail.state, HailState::Assigned);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_single_and_group_assignments_split_cleanly() {
    let engine = Arc::new(EngineBuilder::new().build());
    let key = route(CENTRAL, AIRPORT);
    let seeded = seed_hails(&engine, key, 1, 10).await;

    let mut tasks = Vec::new();
    for (i, id) in seeded.iter().copied().enumerate() {
        let engine = engine.clone();
        let vehicle = if i % 2 == 0 { BUS_MID } else { BUS_FAR };
        tasks.push(tokio::spawn(async move {
            engine.service.assign_hail(id, vehicle).await
        }));
    }
    let group = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .service
                .assign_group(AssignCommand {
                    route: key,
                    vehicle_id: BUS_NEAR,
                })
                .await
        })
    };

    let mut total = 0;
    let mut claimed = HashSet::new();
    for task in tasks {
        if let Ok(result) = task.await.expect("task") {
            total += result.transitioned;
            claimed.extend(result.hail_ids);
        }
    }
    if let Ok(result) = group.await.expect("task") {
        total += result.transitioned;
        claimed.extend(result.hail_ids);
    }

    assert_eq!(total, seeded.len());
    assert_eq!(claimed.len(), seeded.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_creates_admit_exactly_one() {
    let engine = Arc::new(EngineBuilder::new().build());
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .hails
                .create(
                    NewHail {
                        requester_id: passenger(7),
                        origin_id: CENTRAL,
                        destination_id: AIRPORT,
                    },
                    fixed_start(),
                )
                .await
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.expect("task") {
            Ok(_) => created += 1,
            Err(DispatchError::DuplicateRequest { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(duplicates, 15);
}
