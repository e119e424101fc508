//! Schedule evaluation, enqueue, and bookkeeping, plus schedule CRUD.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::models::job::JobRequest;
use crate::models::schedule::{
    encode_day_set, ScheduleSpec, ScheduleType, TestJobSchedule,
};
use crate::schema::test_job_schedules;
use crate::services::orchestrator::JobOrchestrator;
use crate::services::tracker::JobTracker;

/// Identity recorded on rows created by the scheduler.
const SCHEDULER_PRINCIPAL: &str = "scheduler";

/// Decide whether a schedule fires at `now`.
///
/// Monotone within a tick: once due, a schedule stays due until its
/// bookkeeping is updated. Missed ticks collapse to a single fire.
pub fn is_due(schedule: &TestJobSchedule, now: DateTime<Utc>) -> bool {
    if !schedule.is_active {
        return false;
    }
    if let Some(max) = schedule.max_runs {
        if schedule.run_count >= max {
            return false;
        }
    }

    match schedule.schedule_type() {
        Some(ScheduleType::RunOnce) => {
            schedule.last_run_time.is_none()
                && schedule.scheduled_time.map_or(false, |t| now >= t)
        }
        Some(ScheduleType::Interval) => {
            let Some(minutes) = schedule.interval_minutes.filter(|m| *m > 0) else {
                return false;
            };
            let base = schedule.last_run_time.unwrap_or(schedule.created_at);
            now >= base + Duration::minutes(minutes as i64)
        }
        Some(ScheduleType::Weekly) => {
            let days = schedule.days_of_week_set();
            if !days.contains(&now.weekday().num_days_from_sunday()) {
                return false;
            }
            time_of_day_due(schedule, now)
        }
        Some(ScheduleType::Monthly) => {
            let days = schedule.days_of_month_set();
            if !days.contains(&now.day()) {
                return false;
            }
            time_of_day_due(schedule, now)
        }
        None => {
            tracing::warn!(schedule_id = %schedule.id, "Unknown schedule type {:?}", schedule.schedule_type);
            false
        }
    }
}

/// Shared weekly/monthly predicate: the configured time of day has elapsed
/// today, and the last run does not already cover today's firing.
fn time_of_day_due(schedule: &TestJobSchedule, now: DateTime<Utc>) -> bool {
    let Some(time_of_day) = schedule.time_of_day_parsed() else {
        return false;
    };
    if now.time() < time_of_day {
        return false;
    }
    match schedule.last_run_time {
        None => true,
        Some(last) => last.date_naive() < now.date_naive() || last.time() < time_of_day,
    }
}

/// Bookkeeping after a fire: the incremented run count, and whether the
/// schedule stays active under its run budget.
pub fn next_run_state(run_count: i32, max_runs: Option<i32>, is_active: bool) -> (i32, bool) {
    let new_count = run_count + 1;
    let still_active = is_active && max_runs.map_or(true, |max| new_count < max);
    (new_count, still_active)
}

/// Increment run bookkeeping after an enqueue; deactivates the schedule
/// when its run budget is exhausted.
pub async fn update_schedule_last_run(
    conn: &mut AsyncPgConnection,
    schedule_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let schedule: Option<TestJobSchedule> = test_job_schedules::table
        .find(schedule_id)
        .first(conn)
        .await
        .optional()?;
    let schedule = schedule.ok_or(Error::ScheduleNotFound(schedule_id))?;

    let (new_count, still_active) =
        next_run_state(schedule.run_count, schedule.max_runs, schedule.is_active);

    diesel::update(test_job_schedules::table.find(schedule_id))
        .set((
            test_job_schedules::run_count.eq(new_count),
            test_job_schedules::last_run_time.eq(now),
            test_job_schedules::is_active.eq(still_active),
        ))
        .execute(conn)
        .await?;

    if !still_active {
        tracing::info!(schedule_id = %schedule_id, run_count = new_count, "Schedule exhausted");
    }
    Ok(())
}

/// Ticker-driven evaluator: finds due schedules and pushes them through
/// the same submission pipeline as user requests.
pub struct ScheduleEngine {
    pool: PgPool,
    tracker: Arc<JobTracker>,
    orchestrator: Arc<JobOrchestrator>,
}

impl ScheduleEngine {
    pub fn new(pool: PgPool, tracker: Arc<JobTracker>, orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            pool,
            tracker,
            orchestrator,
        }
    }

    /// One tick: returns the number of schedules fired.
    pub async fn process_due_schedules(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut conn = self.pool.get().await?;
        let schedules: Vec<TestJobSchedule> = test_job_schedules::table
            .filter(test_job_schedules::is_active.eq(true))
            .load(&mut conn)
            .await?;

        let mut fired = 0u32;
        for schedule in schedules {
            if !is_due(&schedule, now) {
                continue;
            }

            match self.fire(&mut conn, &schedule, now).await {
                Ok(()) => {
                    fired += 1;
                    crate::metrics::schedule_fired(&schedule.schedule_type);
                }
                Err(e) => {
                    tracing::error!(
                        schedule_id = %schedule.id,
                        name = %schedule.name,
                        "Scheduled job failed to enqueue: {e}"
                    );
                }
            }
        }

        if fired > 0 {
            tracing::info!(fired, "Schedule tick processed");
        }
        Ok(fired)
    }

    async fn fire(
        &self,
        conn: &mut AsyncPgConnection,
        schedule: &TestJobSchedule,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let request = JobRequest {
            repo_url: schedule.repo_url.clone(),
            test_image_type: schedule.test_image_type.clone(),
            lob_id: schedule.lob_id.clone(),
            team_id: schedule.team_id.clone(),
            user_id: SCHEDULER_PRINCIPAL.to_string(),
            schedule_id: Some(schedule.id),
            timeout_minutes: None,
            branch: "main".to_string(),
            test_filter: None,
        };

        let job_id = self.tracker.create_job(&request).await?;
        let cluster_job_name = self.orchestrator.create_test_job(&request).await?;
        self.tracker
            .set_cluster_job_name(job_id, &cluster_job_name)
            .await?;

        update_schedule_last_run(conn, schedule.id, now).await?;

        tracing::info!(
            schedule_id = %schedule.id,
            job_id = %job_id,
            cluster_job = %cluster_job_name,
            "Scheduled job enqueued"
        );
        Ok(())
    }
}

// ── CRUD ──

pub async fn create_schedule(
    pool: &PgPool,
    lob_id: &str,
    team_id: &str,
    spec: ScheduleSpec,
) -> Result<TestJobSchedule> {
    spec.validate().map_err(Error::InvalidRequest)?;

    let row = spec.into_new_row(lob_id.to_string(), team_id.to_string(), Utc::now());
    let mut conn = pool.get().await?;
    let saved: TestJobSchedule = diesel::insert_into(test_job_schedules::table)
        .values(&row)
        .get_result(&mut conn)
        .await?;

    tracing::info!(schedule_id = %saved.id, name = %saved.name, "Schedule created");
    Ok(saved)
}

pub async fn list_schedules(
    pool: &PgPool,
    lob_id: &str,
    team_id: &str,
) -> Result<Vec<TestJobSchedule>> {
    let mut conn = pool.get().await?;
    let rows = test_job_schedules::table
        .filter(test_job_schedules::lob_id.eq(lob_id))
        .filter(test_job_schedules::team_id.eq(team_id))
        .order(test_job_schedules::created_at.desc())
        .load(&mut conn)
        .await?;
    Ok(rows)
}

pub async fn get_schedule(
    pool: &PgPool,
    id: Uuid,
    lob_id: &str,
    team_id: &str,
) -> Result<TestJobSchedule> {
    let mut conn = pool.get().await?;
    let row: Option<TestJobSchedule> = test_job_schedules::table
        .find(id)
        .first(&mut conn)
        .await
        .optional()?;

    match row {
        None => Err(Error::ScheduleNotFound(id)),
        Some(row) if row.lob_id != lob_id || row.team_id != team_id => Err(Error::Forbidden),
        Some(row) => Ok(row),
    }
}

/// Replace the schedule's shape. Run bookkeeping is preserved.
pub async fn update_schedule(
    pool: &PgPool,
    id: Uuid,
    lob_id: &str,
    team_id: &str,
    spec: ScheduleSpec,
) -> Result<TestJobSchedule> {
    spec.validate().map_err(Error::InvalidRequest)?;

    let mut conn = pool.get().await?;
    let existing: Option<TestJobSchedule> = test_job_schedules::table
        .find(id)
        .first(&mut conn)
        .await
        .optional()?;
    let existing = match existing {
        None => return Err(Error::ScheduleNotFound(id)),
        Some(row) if row.lob_id != lob_id || row.team_id != team_id => {
            return Err(Error::Forbidden)
        }
        Some(row) => row,
    };

    let updated: TestJobSchedule = diesel::update(test_job_schedules::table.find(existing.id))
        .set((
            test_job_schedules::name.eq(&spec.name),
            test_job_schedules::repo_url.eq(&spec.repo_url),
            test_job_schedules::test_image_type.eq(&spec.test_image_type),
            test_job_schedules::schedule_type.eq(spec.schedule_type.as_str()),
            test_job_schedules::interval_minutes.eq(spec.interval_minutes),
            test_job_schedules::days_of_week.eq(encode_day_set(&spec.days_of_week)),
            test_job_schedules::days_of_month.eq(encode_day_set(&spec.days_of_month)),
            test_job_schedules::time_of_day.eq(&spec.time_of_day),
            test_job_schedules::scheduled_time.eq(spec.scheduled_time),
            test_job_schedules::max_runs.eq(spec.max_runs),
            test_job_schedules::is_active.eq(spec.is_active),
        ))
        .get_result(&mut conn)
        .await?;

    Ok(updated)
}

pub async fn delete_schedule(pool: &PgPool, id: Uuid, lob_id: &str, team_id: &str) -> Result<()> {
    let mut conn = pool.get().await?;
    let existing: Option<TestJobSchedule> = test_job_schedules::table
        .find(id)
        .first(&mut conn)
        .await
        .optional()?;

    match existing {
        None => Err(Error::ScheduleNotFound(id)),
        Some(row) if row.lob_id != lob_id || row.team_id != team_id => Err(Error::Forbidden),
        Some(row) => {
            diesel::delete(test_job_schedules::table.find(row.id))
                .execute(&mut conn)
                .await?;
            tracing::info!(schedule_id = %id, "Schedule deleted");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_schedule() -> TestJobSchedule {
        TestJobSchedule {
            id: Uuid::new_v4(),
            name: "s".to_string(),
            lob_id: "acme".to_string(),
            team_id: "pay".to_string(),
            repo_url: "https://example/r.git".to_string(),
            test_image_type: "DotNet".to_string(),
            schedule_type: "Interval".to_string(),
            interval_minutes: Some(30),
            days_of_week: String::new(),
            days_of_month: String::new(),
            time_of_day: None,
            scheduled_time: None,
            max_runs: None,
            run_count: 0,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            last_run_time: None,
        }
    }

    // 2026-03-02 is a Monday.
    fn monday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn inactive_and_exhausted_schedules_are_never_due() {
        let mut s = base_schedule();
        s.is_active = false;
        assert!(!is_due(&s, monday_noon()));

        let mut s = base_schedule();
        s.max_runs = Some(2);
        s.run_count = 2;
        assert!(!is_due(&s, monday_noon()));
    }

    #[test]
    fn interval_uses_last_run_or_creation() {
        let now = monday_noon();
        let mut s = base_schedule();

        // Never ran; created a day earlier.
        assert!(is_due(&s, now));

        s.last_run_time = Some(now - Duration::minutes(31));
        assert!(is_due(&s, now));

        s.last_run_time = Some(now - Duration::minutes(29));
        assert!(!is_due(&s, now));

        // Exactly on the boundary fires.
        s.last_run_time = Some(now - Duration::minutes(30));
        assert!(is_due(&s, now));
    }

    #[test]
    fn run_once_fires_only_before_first_run() {
        let now = monday_noon();
        let mut s = base_schedule();
        s.schedule_type = "RunOnce".to_string();
        s.interval_minutes = None;
        s.scheduled_time = Some(now - Duration::minutes(5));

        assert!(is_due(&s, now));

        s.last_run_time = Some(now - Duration::minutes(1));
        assert!(!is_due(&s, now));

        s.last_run_time = None;
        s.scheduled_time = Some(now + Duration::minutes(5));
        assert!(!is_due(&s, now));
    }

    #[test]
    fn weekly_requires_day_and_elapsed_time() {
        let now = monday_noon(); // Monday = day 1 from Sunday
        let mut s = base_schedule();
        s.schedule_type = "Weekly".to_string();
        s.interval_minutes = None;
        s.days_of_week = "1,3".to_string();
        s.time_of_day = Some("09:00".to_string());

        assert!(is_due(&s, now));

        // Wrong day.
        s.days_of_week = "2".to_string();
        assert!(!is_due(&s, now));

        // Right day, before the configured time.
        s.days_of_week = "1".to_string();
        s.time_of_day = Some("13:00".to_string());
        assert!(!is_due(&s, now));

        // Already ran today at the configured time.
        s.time_of_day = Some("09:00".to_string());
        s.last_run_time = Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 1, 0).unwrap());
        assert!(!is_due(&s, now));

        // Ran yesterday: due again.
        s.last_run_time = Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 1, 0).unwrap());
        assert!(is_due(&s, now));

        // Ran today but before the configured time: still due.
        s.last_run_time = Some(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap());
        assert!(is_due(&s, now));
    }

    #[test]
    fn monthly_matches_day_of_month() {
        let now = monday_noon(); // March 2nd
        let mut s = base_schedule();
        s.schedule_type = "Monthly".to_string();
        s.interval_minutes = None;
        s.days_of_month = "1,2,15".to_string();
        s.time_of_day = Some("06:00".to_string());

        assert!(is_due(&s, now));

        s.days_of_month = "15".to_string();
        assert!(!is_due(&s, now));
    }

    #[test]
    fn due_is_monotone_until_bookkeeping_updates() {
        let now = monday_noon();
        let mut s = base_schedule();
        s.last_run_time = Some(now - Duration::minutes(31));

        assert!(is_due(&s, now));
        assert!(is_due(&s, now + Duration::seconds(1)));
        assert!(is_due(&s, now + Duration::minutes(10)));

        // After bookkeeping the schedule rests until the next interval.
        s.last_run_time = Some(now);
        s.run_count = 1;
        assert!(!is_due(&s, now + Duration::seconds(1)));
    }

    #[test]
    fn exhaustion_deactivates_at_max_runs() {
        // One allowed run: firing once deactivates.
        assert_eq!(next_run_state(0, Some(1), true), (1, false));
        // Budget not yet reached.
        assert_eq!(next_run_state(0, Some(3), true), (1, true));
        assert_eq!(next_run_state(1, Some(3), true), (2, true));
        assert_eq!(next_run_state(2, Some(3), true), (3, false));
        // No budget: stays active forever.
        assert_eq!(next_run_state(41, None, true), (42, true));
        // Deactivated schedules stay deactivated.
        assert_eq!(next_run_state(0, Some(5), false), (1, false));
    }

    #[test]
    fn weekly_without_parseable_time_is_not_due() {
        let now = monday_noon();
        let mut s = base_schedule();
        s.schedule_type = "Weekly".to_string();
        s.days_of_week = "1".to_string();
        s.time_of_day = None;
        assert!(!is_due(&s, now));
    }
}
