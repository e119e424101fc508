//! Recurring-job schedules: one-shot, interval, weekly, monthly.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveTime, Utc};
use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::test_job_schedules;

static TIME_OF_DAY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    RunOnce,
    Interval,
    Weekly,
    Monthly,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::RunOnce => "RunOnce",
            ScheduleType::Interval => "Interval",
            ScheduleType::Weekly => "Weekly",
            ScheduleType::Monthly => "Monthly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RunOnce" => Some(ScheduleType::RunOnce),
            "Interval" => Some(ScheduleType::Interval),
            "Weekly" => Some(ScheduleType::Weekly),
            "Monthly" => Some(ScheduleType::Monthly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = test_job_schedules)]
pub struct TestJobSchedule {
    pub id: Uuid,
    pub name: String,
    pub lob_id: String,
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub schedule_type: String,
    pub interval_minutes: Option<i32>,
    pub days_of_week: String,
    pub days_of_month: String,
    pub time_of_day: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub max_runs: Option<i32>,
    pub run_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
}

impl TestJobSchedule {
    pub fn schedule_type(&self) -> Option<ScheduleType> {
        ScheduleType::parse(&self.schedule_type)
    }

    pub fn days_of_week_set(&self) -> BTreeSet<u32> {
        parse_day_set(&self.days_of_week)
    }

    pub fn days_of_month_set(&self) -> BTreeSet<u32> {
        parse_day_set(&self.days_of_month)
    }

    pub fn time_of_day_parsed(&self) -> Option<NaiveTime> {
        self.time_of_day.as_deref().and_then(parse_time_of_day)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = test_job_schedules)]
pub struct NewTestJobSchedule {
    pub id: Uuid,
    pub name: String,
    pub lob_id: String,
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub schedule_type: String,
    pub interval_minutes: Option<i32>,
    pub days_of_week: String,
    pub days_of_month: String,
    pub time_of_day: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub max_runs: Option<i32>,
    pub run_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_time: Option<DateTime<Utc>>,
}

/// Tenant-submitted schedule document (YAML body of POST/PUT /schedules).
///
/// Identity and tenancy are server-assigned; the body cannot forge them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    pub name: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub interval_minutes: Option<i32>,
    #[serde(default)]
    pub days_of_week: BTreeSet<u32>,
    #[serde(default)]
    pub days_of_month: BTreeSet<u32>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_runs: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ScheduleSpec {
    /// Enforce the per-type invariants on create/update.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.repo_url.trim().is_empty() {
            return Err("repoUrl must not be empty".to_string());
        }
        if self.test_image_type.trim().is_empty() {
            return Err("testImageType must not be empty".to_string());
        }
        if let Some(max) = self.max_runs {
            if max <= 0 {
                return Err("maxRuns must be positive".to_string());
            }
        }

        match self.schedule_type {
            ScheduleType::RunOnce => {
                if self.scheduled_time.is_none() {
                    return Err("RunOnce schedules require scheduledTime".to_string());
                }
            }
            ScheduleType::Interval => match self.interval_minutes {
                Some(m) if m > 0 => {}
                _ => return Err("Interval schedules require intervalMinutes > 0".to_string()),
            },
            ScheduleType::Weekly => {
                if self.days_of_week.is_empty() {
                    return Err("Weekly schedules require daysOfWeek".to_string());
                }
                if self.days_of_week.iter().any(|d| *d > 6) {
                    return Err("daysOfWeek entries must be in 0..=6".to_string());
                }
                self.require_time_of_day()?;
            }
            ScheduleType::Monthly => {
                if self.days_of_month.is_empty() {
                    return Err("Monthly schedules require daysOfMonth".to_string());
                }
                if self.days_of_month.iter().any(|d| *d < 1 || *d > 31) {
                    return Err("daysOfMonth entries must be in 1..=31".to_string());
                }
                self.require_time_of_day()?;
            }
        }
        Ok(())
    }

    fn require_time_of_day(&self) -> Result<(), String> {
        match self.time_of_day.as_deref() {
            Some(t) if TIME_OF_DAY_REGEX.is_match(t) => Ok(()),
            Some(t) => Err(format!("timeOfDay must be HH:MM (UTC), got {t:?}")),
            None => Err("timeOfDay is required for this schedule type".to_string()),
        }
    }

    /// Materialize an insertable row with server-assigned identity.
    pub fn into_new_row(
        self,
        lob_id: String,
        team_id: String,
        now: DateTime<Utc>,
    ) -> NewTestJobSchedule {
        NewTestJobSchedule {
            id: Uuid::new_v4(),
            name: self.name,
            lob_id,
            team_id,
            repo_url: self.repo_url,
            test_image_type: self.test_image_type,
            schedule_type: self.schedule_type.as_str().to_string(),
            interval_minutes: self.interval_minutes,
            days_of_week: encode_day_set(&self.days_of_week),
            days_of_month: encode_day_set(&self.days_of_month),
            time_of_day: self.time_of_day,
            scheduled_time: self.scheduled_time,
            max_runs: self.max_runs,
            run_count: 0,
            is_active: self.is_active,
            created_at: now,
            last_run_time: None,
        }
    }
}

/// Encode a day set to its comma-separated column form.
pub fn encode_day_set(days: &BTreeSet<u32>) -> String {
    days.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the comma-separated column form back into a set.
/// Blank and malformed entries are dropped.
pub fn parse_day_set(s: &str) -> BTreeSet<u32> {
    s.split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

/// Parse an `HH:MM` UTC time-of-day column value.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    if !TIME_OF_DAY_REGEX.is_match(s) {
        return None;
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_spec() -> ScheduleSpec {
        ScheduleSpec {
            name: "nightly".to_string(),
            repo_url: "https://example/r.git".to_string(),
            test_image_type: "DotNet".to_string(),
            schedule_type: ScheduleType::Weekly,
            interval_minutes: None,
            days_of_week: [1, 3, 5].into_iter().collect(),
            days_of_month: BTreeSet::new(),
            time_of_day: Some("02:30".to_string()),
            scheduled_time: None,
            max_runs: None,
            is_active: true,
        }
    }

    #[test]
    fn day_set_round_trips_through_column_text() {
        let days: BTreeSet<u32> = [0, 2, 6].into_iter().collect();
        assert_eq!(parse_day_set(&encode_day_set(&days)), days);
        assert_eq!(encode_day_set(&BTreeSet::new()), "");
        assert!(parse_day_set("").is_empty());
        assert_eq!(parse_day_set("3, 5 ,junk,1"), [1, 3, 5].into_iter().collect());
    }

    #[test]
    fn weekly_requires_days_and_time() {
        let mut spec = weekly_spec();
        assert!(spec.validate().is_ok());

        spec.days_of_week.clear();
        assert!(spec.validate().is_err());

        let mut spec = weekly_spec();
        spec.time_of_day = None;
        assert!(spec.validate().is_err());

        let mut spec = weekly_spec();
        spec.time_of_day = Some("25:00".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn interval_requires_positive_minutes() {
        let mut spec = weekly_spec();
        spec.schedule_type = ScheduleType::Interval;
        spec.interval_minutes = None;
        assert!(spec.validate().is_err());
        spec.interval_minutes = Some(0);
        assert!(spec.validate().is_err());
        spec.interval_minutes = Some(30);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn run_once_requires_scheduled_time() {
        let mut spec = weekly_spec();
        spec.schedule_type = ScheduleType::RunOnce;
        assert!(spec.validate().is_err());
        spec.scheduled_time = Some(Utc::now());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn yaml_round_trip_preserves_the_document() {
        let spec = weekly_spec();
        let yaml = serde_yaml::to_string(&spec).unwrap();
        let back: ScheduleSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.name, spec.name);
        assert_eq!(back.schedule_type, spec.schedule_type);
        assert_eq!(back.days_of_week, spec.days_of_week);
        assert_eq!(back.time_of_day, spec.time_of_day);
    }

    #[test]
    fn time_of_day_parses_to_naive_time() {
        assert_eq!(
            parse_time_of_day("02:30"),
            NaiveTime::from_hms_opt(2, 30, 0)
        );
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("2:30"), None);
    }
}
