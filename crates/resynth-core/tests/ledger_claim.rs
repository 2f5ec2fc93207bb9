//! Integration tests against a real Postgres instance.
//!
//! These exercise the property the unit tests in `src/` can't: that
//! `SELECT ... FOR UPDATE SKIP LOCKED` actually gives at most one
//! concurrent caller the row. Gated on `DATABASE_URL` and `#[ignore]`d
//! so a plain `cargo test` run without a database configured still
//! passes.

use resynth_core::{run_pending_migrations, Ledger, LedgerPool};

async fn test_ledger() -> Ledger {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for ledger integration tests");
    run_pending_migrations(&database_url).await.expect("failed to run migrations");
    let pool = LedgerPool::new(&database_url, 5).expect("failed to build pool");
    Ledger::new(pool)
}

#[tokio::test]
#[ignore]
async fn duplicate_delivery_produces_exactly_one_winner() {
    let ledger = test_ledger().await;
    let request = ledger.create_request("distributed consensus").await.unwrap();
    ledger.mark_searching(request.id).await.unwrap();

    let mut winners = 0;
    for _ in 0..5 {
        if let Some(handle) = ledger.claim_for_search(request.id).await.unwrap() {
            winners += 1;
            // Drop without consuming on purpose in this loop except the
            // last iteration, to simulate the other replicas racing and
            // losing; the real winner drives the row forward below.
            std::mem::forget(handle);
        }
    }

    assert_eq!(winners, 1, "exactly one of the concurrent claimants should win");
}

#[tokio::test]
#[ignore]
async fn completed_requests_are_never_reclaimed_for_analysis() {
    let ledger = test_ledger().await;
    let request = ledger.create_request("re-delivery after completion").await.unwrap();
    ledger.mark_searching(request.id).await.unwrap();

    let search_handle = ledger.claim_for_search(request.id).await.unwrap().unwrap();
    ledger
        .advance_after_search(
            search_handle,
            vec![resynth_core::NewSearchResult {
                request_id: request.id,
                url: "https://example.com".into(),
                title: "Example".into(),
                content: "enough content to pass the viability threshold ".repeat(5),
            }],
        )
        .await
        .unwrap();

    let analysis_handle = ledger.claim_for_analysis(request.id).await.unwrap().unwrap();
    ledger
        .complete_with_summary(
            analysis_handle,
            resynth_core::models::NewAnalysisResult {
                request_id: request.id,
                summary: "a summary".into(),
                tokens_used: None,
                inference_time_ms: Some(42),
            },
        )
        .await
        .unwrap();

    // A second, re-delivered analyze task must observe LOST, not claim
    // the already-completed request again.
    let second_claim = ledger.claim_for_analysis(request.id).await.unwrap();
    assert!(second_claim.is_none());

    let analysis = ledger.get_analysis_result(request.id).await.unwrap();
    assert!(analysis.is_some());
}

#[tokio::test]
#[ignore]
async fn empty_search_results_fail_the_request_rather_than_completing_silently() {
    let ledger = test_ledger().await;
    let request = ledger.create_request("zzzzz_no_such_topic").await.unwrap();
    ledger.mark_searching(request.id).await.unwrap();

    let handle = ledger.claim_for_search(request.id).await.unwrap().unwrap();
    ledger.fail_request(handle, "No search results found").await.unwrap();

    let row = ledger.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.error_message.as_deref(), Some("No search results found"));
}
