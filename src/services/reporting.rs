//! Aggregated read-side queries for the admin surface.
//!
//! Every predicate is bound as a parameter; no caller input is ever
//! interpolated into SQL text.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamptz, Varchar};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::job::TestJob;
use crate::schema::test_jobs;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Filters shared by the job listing and count queries.
#[derive(Debug, Default, Clone)]
pub struct JobsFilter {
    pub lob_id: Option<String>,
    pub team_id: Option<String>,
    pub job_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct ExecutionSummary {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub running: i64,
    #[diesel(sql_type = BigInt)]
    pub succeeded: i64,
    #[diesel(sql_type = BigInt)]
    pub failed: i64,
    #[diesel(sql_type = Nullable<diesel::sql_types::Double>)]
    pub avg_duration_seconds: Option<f64>,
}

/// Counts by status plus average wall-clock duration, optionally scoped
/// to one LOB and a time window.
pub async fn get_execution_summary(
    conn: &mut AsyncPgConnection,
    lob_id: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<ExecutionSummary> {
    let summary = diesel::sql_query(
        "SELECT \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'Running') AS running, \
            COUNT(*) FILTER (WHERE status = 'Succeeded') AS succeeded, \
            COUNT(*) FILTER (WHERE status = 'Failed') AS failed, \
            AVG(EXTRACT(EPOCH FROM (end_time - start_time)))::float8 AS avg_duration_seconds \
         FROM test_jobs \
         WHERE ($1 IS NULL OR lob_id = $1) \
           AND ($2 IS NULL OR start_time >= $2) \
           AND ($3 IS NULL OR start_time <= $3)",
    )
    .bind::<Nullable<Varchar>, _>(lob_id)
    .bind::<Nullable<Timestamptz>, _>(start)
    .bind::<Nullable<Timestamptz>, _>(end)
    .get_result(conn)
    .await?;
    Ok(summary)
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct LobExecutionSummary {
    #[diesel(sql_type = Varchar)]
    pub lob_id: String,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub succeeded: i64,
    #[diesel(sql_type = BigInt)]
    pub failed: i64,
    #[diesel(sql_type = Nullable<diesel::sql_types::Double>)]
    pub avg_duration_seconds: Option<f64>,
}

/// Per-LOB execution summary, busiest LOBs first.
pub async fn get_lob_execution_summary(
    conn: &mut AsyncPgConnection,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<LobExecutionSummary>> {
    let rows = diesel::sql_query(
        "SELECT \
            lob_id, \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'Succeeded') AS succeeded, \
            COUNT(*) FILTER (WHERE status = 'Failed') AS failed, \
            AVG(EXTRACT(EPOCH FROM (end_time - start_time)))::float8 AS avg_duration_seconds \
         FROM test_jobs \
         WHERE ($1 IS NULL OR start_time >= $1) \
           AND ($2 IS NULL OR start_time <= $2) \
         GROUP BY lob_id \
         ORDER BY total DESC",
    )
    .bind::<Nullable<Timestamptz>, _>(start)
    .bind::<Nullable<Timestamptz>, _>(end)
    .load(conn)
    .await?;
    Ok(rows)
}

fn boxed_jobs_query(
    filter: &JobsFilter,
) -> test_jobs::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = test_jobs::table.into_boxed();
    if let Some(lob) = &filter.lob_id {
        query = query.filter(test_jobs::lob_id.eq(lob.clone()));
    }
    if let Some(team) = &filter.team_id {
        query = query.filter(test_jobs::team_id.eq(team.clone()));
    }
    if let Some(job_id) = filter.job_id {
        query = query.filter(test_jobs::id.eq(job_id));
    }
    if let Some(start) = filter.start {
        query = query.filter(test_jobs::start_time.ge(start));
    }
    if let Some(end) = filter.end {
        query = query.filter(test_jobs::start_time.le(end));
    }
    if let Some(status) = &filter.status {
        query = query.filter(test_jobs::status.eq(status.clone()));
    }
    query
}

/// Clamp pagination inputs to sane bounds.
pub fn page_bounds(page_size: Option<i64>, page: Option<i64>) -> (i64, i64) {
    let size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).max(1);
    (size, (page - 1) * size)
}

/// Paginated job listing, newest first.
pub async fn get_jobs(
    conn: &mut AsyncPgConnection,
    filter: &JobsFilter,
    page_size: Option<i64>,
    page: Option<i64>,
) -> Result<Vec<TestJob>> {
    let (limit, offset) = page_bounds(page_size, page);
    let rows = boxed_jobs_query(filter)
        .order(test_jobs::start_time.desc())
        .limit(limit)
        .offset(offset)
        .load(conn)
        .await?;
    Ok(rows)
}

pub async fn get_jobs_count(conn: &mut AsyncPgConnection, filter: &JobsFilter) -> Result<i64> {
    let count = boxed_jobs_query(filter).count().get_result(conn).await?;
    Ok(count)
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct FailingTest {
    #[diesel(sql_type = Text)]
    pub test_name: String,
    #[diesel(sql_type = BigInt)]
    pub failure_count: i64,
}

/// Most frequently failing tests across the selected jobs.
pub async fn get_top_failing_tests(
    conn: &mut AsyncPgConnection,
    lob_id: Option<&str>,
    team_id: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<FailingTest>> {
    let rows = diesel::sql_query(
        "SELECT r.test_name, COUNT(*) AS failure_count \
         FROM test_results r \
         JOIN test_jobs j ON j.id = r.job_id \
         WHERE r.status = 'Failed' \
           AND ($1 IS NULL OR j.lob_id = $1) \
           AND ($2 IS NULL OR j.team_id = $2) \
           AND ($3 IS NULL OR j.start_time >= $3) \
           AND ($4 IS NULL OR j.start_time <= $4) \
         GROUP BY r.test_name \
         ORDER BY failure_count DESC \
         LIMIT $5",
    )
    .bind::<Nullable<Varchar>, _>(lob_id)
    .bind::<Nullable<Varchar>, _>(team_id)
    .bind::<Nullable<Timestamptz>, _>(start)
    .bind::<Nullable<Timestamptz>, _>(end)
    .bind::<BigInt, _>(limit.clamp(1, MAX_PAGE_SIZE))
    .load(conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_clamp_and_offset() {
        assert_eq!(page_bounds(None, None), (50, 0));
        assert_eq!(page_bounds(Some(10), Some(3)), (10, 20));
        assert_eq!(page_bounds(Some(0), Some(0)), (1, 0));
        assert_eq!(page_bounds(Some(9999), Some(2)), (200, 200));
        assert_eq!(page_bounds(Some(-5), Some(-1)), (1, 0));
    }
}
