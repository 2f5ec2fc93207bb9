//! The Ledger: the relational store of record and the claim primitive.
//!
//! The claim primitive is the coordination core of the whole pipeline. It
//! converts the bus's at-least-once delivery into an at-most-one effect by
//! using a non-blocking, skip-locked row lock: of any number of concurrent
//! callers racing to claim the same request, at most one observes the row
//! and advances it to the matching `processing_*` state; the rest see
//! nothing to claim and move on, via a `SELECT ... FOR UPDATE SKIP LOCKED`
//! over a single mutable status column.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    AnalysisResult, NewAnalysisResult, NewRequest, NewSearchResult, Request, RequestStatus,
    SearchResult, Stage,
};
use crate::pool::LedgerPool;
use crate::schema::{analysis_results, requests, search_results};

/// Opaque claim identifier. A single Postgres backend only ever needs the
/// claimed request's own id to re-locate and mutate the row on
/// completion.
pub type ClaimId = Uuid;

/// A claimed request, held by the winning worker until it calls
/// [`Ledger::advance_after_search`], [`Ledger::complete_with_summary`], or
/// [`Ledger::fail_request`]. Move semantics: if dropped without being
/// consumed, this logs a warning — the request is left in its
/// `processing_*` state for out-of-band recovery (see the orphan-recovery
/// open question), not silently unclaimed.
pub struct WorkHandle<T: Send + Sync> {
    pub item: T,
    claim_id: ClaimId,
    consumed: bool,
}

impl<T: Send + Sync> WorkHandle<T> {
    fn new(item: T, claim_id: ClaimId) -> Self {
        Self { item, claim_id, consumed: false }
    }

    fn consume(mut self) -> (T, ClaimId) {
        self.consumed = true;
        let item = unsafe { std::ptr::read(&self.item) };
        let claim_id = self.claim_id;
        std::mem::forget(self);
        (item, claim_id)
    }
}

impl<T: Send + Sync> Drop for WorkHandle<T> {
    fn drop(&mut self) {
        if !self.consumed {
            tracing::warn!(
                claim_id = %self.claim_id,
                "WorkHandle dropped without being completed or failed — \
                 request is left in a processing_* state for out-of-band recovery"
            );
        }
    }
}

pub struct Metrics {
    pub total_requests: i64,
    pub success_rate: f64,
    pub avg_inference_time_ms: f64,
    pub requests_by_status: Vec<(String, i64)>,
    pub requests_by_hour: Vec<(chrono::DateTime<Utc>, i64)>,
}

#[derive(Clone)]
pub struct Ledger {
    pool: LedgerPool,
}

impl Ledger {
    pub fn new(pool: LedgerPool) -> Self {
        Self { pool }
    }

    /// Step 1 of Intake: insert a `pending` request.
    pub async fn create_request(&self, topic: &str) -> Result<Request, LedgerError> {
        let mut conn = self.pool.get().await?;
        let new_request = NewRequest {
            id: Uuid::new_v4(),
            topic,
            status: RequestStatus::Pending.as_str(),
        };
        let row = diesel::insert_into(requests::table)
            .values(&new_request)
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    /// Step 3 of Intake: `pending -> searching`, only after the search
    /// task has been published. If this is never called the request is
    /// left in `pending` and simply never picked up (§4.3).
    pub async fn mark_searching(&self, request_id: Uuid) -> Result<(), LedgerError> {
        self.transition(request_id, RequestStatus::Pending, RequestStatus::Searching).await
    }

    async fn transition(
        &self,
        request_id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<(), LedgerError> {
        if !from.permits_transition_to(to) {
            return Err(LedgerError::IllegalTransition { from, to });
        }
        let mut conn = self.pool.get().await?;
        diesel::update(
            requests::table
                .filter(requests::id.eq(request_id))
                .filter(requests::status.eq(from.as_str())),
        )
        .set((requests::status.eq(to.as_str()), requests::updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// The claim primitive, specialized to the Search Stage Worker:
    /// `searching -> processing_search`. Returns `Ok(None)` on `LOST`
    /// (another worker already claimed it, or the row doesn't exist in
    /// the expected state) — the caller commits the bus offset and moves
    /// on, per §4.2; this is not an error.
    pub async fn claim_for_search(
        &self,
        request_id: Uuid,
    ) -> Result<Option<WorkHandle<Request>>, LedgerError> {
        self.claim(request_id, Stage::Search).await
    }

    /// The claim primitive, specialized to the Analysis Stage Worker:
    /// `analyzing -> processing_analysis`.
    pub async fn claim_for_analysis(
        &self,
        request_id: Uuid,
    ) -> Result<Option<WorkHandle<Request>>, LedgerError> {
        self.claim(request_id, Stage::Analysis).await
    }

    async fn claim(
        &self,
        request_id: Uuid,
        stage: Stage,
    ) -> Result<Option<WorkHandle<Request>>, LedgerError> {
        let (expected, claimed) = match stage {
            Stage::Search => (RequestStatus::Searching, RequestStatus::ProcessingSearch),
            Stage::Analysis => (RequestStatus::Analyzing, RequestStatus::ProcessingAnalysis),
        };
        let mut conn = self.pool.get().await?;
        let row: Option<Request> = conn
            .transaction(|conn| {
                Box::pin(async move {
                    let row = requests::table
                        .filter(requests::id.eq(request_id))
                        .filter(requests::status.eq(expected.as_str()))
                        .for_update()
                        .skip_locked()
                        .first::<Request>(conn)
                        .await
                        .optional()?;

                    let Some(row) = row else {
                        return Ok(None);
                    };

                    diesel::update(requests::table.filter(requests::id.eq(request_id)))
                        .set((
                            requests::status.eq(claimed.as_str()),
                            requests::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;

                    Ok(Some(row))
                })
            })
            .await?;

        Ok(row.map(|row| WorkHandle::new(row, request_id)))
    }

    /// §4.4 steps 5-6: insert all SearchResults and advance
    /// `processing_search -> analyzing` in a single transaction, so a
    /// crash between them is impossible. The caller publishes the
    /// `analyze` task and commits the bus offset only after this returns.
    pub async fn advance_after_search(
        &self,
        handle: WorkHandle<Request>,
        results: Vec<NewSearchResult>,
    ) -> Result<(), LedgerError> {
        let (request, _claim_id) = handle.consume();
        let mut conn = self.pool.get().await?;
        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(search_results::table)
                    .values(&results)
                    .execute(conn)
                    .await?;

                diesel::update(
                    requests::table
                        .filter(requests::id.eq(request.id))
                        .filter(requests::status.eq(RequestStatus::ProcessingSearch.as_str())),
                )
                .set((
                    requests::status.eq(RequestStatus::Analyzing.as_str()),
                    requests::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .await?;

                Ok::<_, LedgerError>(())
            })
        })
        .await
    }

    /// §4.5 step 6: insert the AnalysisResult and advance
    /// `processing_analysis -> completed`, setting `completed_at`.
    pub async fn complete_with_summary(
        &self,
        handle: WorkHandle<Request>,
        summary: NewAnalysisResult,
    ) -> Result<(), LedgerError> {
        let (request, _claim_id) = handle.consume();
        let mut conn = self.pool.get().await?;
        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::insert_into(analysis_results::table)
                    .values(&summary)
                    .execute(conn)
                    .await?;

                let now = Utc::now();
                diesel::update(
                    requests::table
                        .filter(requests::id.eq(request.id))
                        .filter(requests::status.eq(RequestStatus::ProcessingAnalysis.as_str())),
                )
                .set((
                    requests::status.eq(RequestStatus::Completed.as_str()),
                    requests::updated_at.eq(now),
                    requests::completed_at.eq(now),
                ))
                .execute(conn)
                .await?;

                Ok::<_, LedgerError>(())
            })
        })
        .await
    }

    /// Terminal failure from either stage: `processing_search -> failed`
    /// or `processing_analysis -> failed`, recording `error_message`.
    pub async fn fail_request(
        &self,
        handle: WorkHandle<Request>,
        error_message: &str,
    ) -> Result<(), LedgerError> {
        let (request, _claim_id) = handle.consume();
        let mut conn = self.pool.get().await?;
        diesel::update(requests::table.filter(requests::id.eq(request.id)))
            .set((
                requests::status.eq(RequestStatus::Failed.as_str()),
                requests::updated_at.eq(Utc::now()),
                requests::error_message.eq(error_message),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Same terminal transition, for failures discovered before a claim
    /// is won (e.g. processing a message whose request row vanished).
    pub async fn fail_request_by_id(
        &self,
        request_id: Uuid,
        error_message: &str,
    ) -> Result<(), LedgerError> {
        let mut conn = self.pool.get().await?;
        diesel::update(requests::table.filter(requests::id.eq(request_id)))
            .set((
                requests::status.eq(RequestStatus::Failed.as_str()),
                requests::updated_at.eq(Utc::now()),
                requests::error_message.eq(error_message),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<Option<Request>, LedgerError> {
        let mut conn = self.pool.get().await?;
        requests::table
            .filter(requests::id.eq(request_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(LedgerError::from)
    }

    /// §9: relationship traversal is always an explicit SELECT keyed by
    /// `request_id`, never an in-memory owning field on `Request`.
    pub async fn list_search_results(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<SearchResult>, LedgerError> {
        let mut conn = self.pool.get().await?;
        search_results::table
            .filter(search_results::request_id.eq(request_id))
            .order(search_results::id.asc())
            .load(&mut conn)
            .await
            .map_err(LedgerError::from)
    }

    pub async fn get_analysis_result(
        &self,
        request_id: Uuid,
    ) -> Result<Option<AnalysisResult>, LedgerError> {
        let mut conn = self.pool.get().await?;
        analysis_results::table
            .filter(analysis_results::request_id.eq(request_id))
            .first(&mut conn)
            .await
            .optional()
            .map_err(LedgerError::from)
    }

    /// `GET /api/requests` — paged listing with an optional status
    /// filter. `limit` is clamped to the cap by the caller (the HTTP
    /// handler), not here.
    pub async fn list_requests(
        &self,
        status: Option<RequestStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Request>, i64), LedgerError> {
        let mut conn = self.pool.get().await?;
        let (rows, total) = match status {
            Some(status) => {
                let rows = requests::table
                    .filter(requests::status.eq(status.as_str()))
                    .order(requests::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load(&mut conn)
                    .await?;
                let total = requests::table
                    .filter(requests::status.eq(status.as_str()))
                    .count()
                    .get_result(&mut conn)
                    .await?;
                (rows, total)
            }
            None => {
                let rows = requests::table
                    .order(requests::created_at.desc())
                    .limit(limit)
                    .offset(offset)
                    .load(&mut conn)
                    .await?;
                let total = requests::table.count().get_result(&mut conn).await?;
                (rows, total)
            }
        };
        Ok((rows, total))
    }

    /// `GET /api/metrics`. Implemented as a handful of small aggregate
    /// queries composed together rather than one monolithic query.
    pub async fn metrics(&self) -> Result<Metrics, LedgerError> {
        use diesel::dsl::sql;
        use diesel::sql_types::{BigInt, Timestamptz};

        let mut conn = self.pool.get().await?;

        let total_requests: i64 = requests::table.count().get_result(&mut conn).await?;

        let completed: i64 = requests::table
            .filter(requests::status.eq(RequestStatus::Completed.as_str()))
            .count()
            .get_result(&mut conn)
            .await?;

        let success_rate = if total_requests > 0 {
            completed as f64 / total_requests as f64
        } else {
            0.0
        };

        let avg_inference_time_ms: Option<f64> = analysis_results::table
            .select(diesel::dsl::avg(analysis_results::inference_time_ms))
            .first::<Option<f64>>(&mut conn)
            .await?;

        let by_status: Vec<(String, i64)> = requests::table
            .group_by(requests::status)
            .select((requests::status, diesel::dsl::count(requests::id)))
            .load(&mut conn)
            .await?;

        let by_hour: Vec<(chrono::DateTime<Utc>, i64)> = requests::table
            .filter(requests::created_at.gt(Utc::now() - chrono::Duration::hours(24)))
            .select((
                sql::<Timestamptz>("date_trunc('hour', created_at)"),
                sql::<BigInt>("count(*)"),
            ))
            .group_by(sql::<Timestamptz>("date_trunc('hour', created_at)"))
            .order(sql::<Timestamptz>("date_trunc('hour', created_at)").asc())
            .load(&mut conn)
            .await
            .unwrap_or_default();

        Ok(Metrics {
            total_requests,
            success_rate,
            avg_inference_time_ms: avg_inference_time_ms.unwrap_or(0.0),
            requests_by_status: by_status,
            requests_by_hour: by_hour,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_handle_exposes_the_claimed_item() {
        let handle = WorkHandle::new(42u32, Uuid::nil());
        assert_eq!(handle.item, 42);
    }
}
