//! Concurrent-claim stress: `claim_next` must never hand the same job to two
//! callers before a report or lease expiry.

use std::collections::HashSet;
use std::sync::Arc;

use totem_core::{AttemptOutcome, TenantId, TerminalId};
use totem_queue::{InMemoryJobStore, JobState, JobStore, NewPrintJob};

fn terminal() -> TerminalId {
    TerminalId::new("kiosk-01").unwrap()
}

fn lease() -> chrono::Duration {
    chrono::Duration::seconds(90)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_claims_never_double_claim() {
    const JOBS: usize = 200;
    const CLAIMERS: usize = 16;

    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();

    for i in 0..JOBS {
        store
            .enqueue(NewPrintJob {
                tenant_id: tenant,
                terminal_id: terminal(),
                payload: serde_json::json!({ "seq": i }),
                max_retries: 0,
            })
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..CLAIMERS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match store.claim_next(tenant, &terminal(), lease()).await.unwrap() {
                    Some(job) => claimed.push(job.id),
                    None => break,
                }
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), JOBS, "every job claimed");
    assert_eq!(unique.len(), JOBS, "no job claimed twice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_reports_apply_exactly_once() {
    const ROUNDS: usize = 50;

    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();

    for _ in 0..ROUNDS {
        let id = store
            .enqueue(NewPrintJob {
                tenant_id: tenant,
                terminal_id: terminal(),
                payload: serde_json::json!({}),
                max_retries: 3,
            })
            .await
            .unwrap();

        let claimed = store
            .claim_next(tenant, &terminal(), lease())
            .await
            .unwrap()
            .unwrap();

        // Two racing reporters with the same token: exactly one is applied.
        let a = {
            let store = Arc::clone(&store);
            let token = claimed.token;
            tokio::spawn(async move {
                store
                    .report_result(tenant, id, token, AttemptOutcome::Completed)
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = Arc::clone(&store);
            let token = claimed.token;
            tokio::spawn(async move {
                store
                    .report_result(tenant, id, token, AttemptOutcome::Completed)
                    .await
                    .unwrap()
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(
            [a.is_applied(), b.is_applied()].iter().filter(|x| **x).count(),
            1,
            "exactly one report wins"
        );

        let job = store.get(tenant, id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Succeeded);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn sweep_racing_claims_keeps_single_owner() {
    const JOBS: usize = 100;

    let store = InMemoryJobStore::arc();
    let tenant = TenantId::new();

    for _ in 0..JOBS {
        store
            .enqueue(NewPrintJob {
                tenant_id: tenant,
                terminal_id: terminal(),
                payload: serde_json::json!({}),
                max_retries: 5,
            })
            .await
            .unwrap();
    }

    // Claim everything with an already-expired lease, then let a sweeper race
    // against claimers picking the jobs back up.
    for _ in 0..JOBS {
        store
            .claim_next(tenant, &terminal(), chrono::Duration::zero())
            .await
            .unwrap()
            .unwrap();
    }

    let sweeper = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..10 {
                store.reclaim_expired(chrono::Utc::now()).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut claimers = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        claimers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            for _ in 0..50 {
                if let Some(job) = store.claim_next(tenant, &terminal(), lease()).await.unwrap() {
                    got.push(job.id);
                }
                tokio::task::yield_now().await;
            }
            got
        }));
    }

    sweeper.await.unwrap();
    let mut reclaimed = Vec::new();
    for c in claimers {
        reclaimed.extend(c.await.unwrap());
    }

    let unique: HashSet<_> = reclaimed.iter().copied().collect();
    assert_eq!(unique.len(), reclaimed.len(), "no reclaimed job handed out twice");
}
