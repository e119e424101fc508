//! Diesel table definitions for the test execution platform.
//!
//! Tables: test_jobs, test_results, test_job_schedules,
//! admin_configurations, user_configurations.
//! Tenant scoping is by (lob_id, team_id) columns on every tenant-owned row.

diesel::table! {
    test_jobs (id) {
        id -> Uuid,
        lob_id -> Varchar,
        team_id -> Varchar,
        repo_url -> Varchar,
        test_image_type -> Varchar,
        branch -> Varchar,
        status -> Varchar,
        cluster_job_name -> Nullable<Varchar>,
        start_time -> Timestamptz,
        end_time -> Nullable<Timestamptz>,
        tests_passed -> Int4,
        tests_failed -> Int4,
        tests_skipped -> Int4,
        created_by -> Varchar,
        schedule_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    test_results (id) {
        id -> Uuid,
        job_id -> Uuid,
        test_name -> Varchar,
        status -> Varchar,
        duration_seconds -> Float8,
        error_message -> Nullable<Text>,
        stack_trace -> Nullable<Text>,
    }
}

diesel::table! {
    test_job_schedules (id) {
        id -> Uuid,
        name -> Varchar,
        lob_id -> Varchar,
        team_id -> Varchar,
        repo_url -> Varchar,
        test_image_type -> Varchar,
        schedule_type -> Varchar,
        interval_minutes -> Nullable<Int4>,
        days_of_week -> Varchar,
        days_of_month -> Varchar,
        time_of_day -> Nullable<Varchar>,
        scheduled_time -> Nullable<Timestamptz>,
        max_runs -> Nullable<Int4>,
        run_count -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
        last_run_time -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    admin_configurations (id) {
        id -> Uuid,
        name -> Varchar,
        config_yaml -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_configurations (id) {
        id -> Uuid,
        name -> Varchar,
        lob_id -> Varchar,
        team_id -> Varchar,
        user_id -> Varchar,
        config_yaml -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(test_results -> test_jobs (job_id));
diesel::joinable!(test_jobs -> test_job_schedules (schedule_id));

diesel::allow_tables_to_appear_in_same_query!(
    test_jobs,
    test_results,
    test_job_schedules,
    admin_configurations,
    user_configurations,
);
