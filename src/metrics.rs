//! Prometheus metrics for platform observability.

use metrics::{counter, gauge, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a job state transition.
pub fn job_status_changed(status: &str) {
    counter!("testplane_jobs_total", "status" => status.to_string()).increment(1);
}

/// Record a cluster workload submission.
pub fn test_job_created(namespace: &str, image_type: &str, lob_id: &str) {
    counter!(
        "testplane_cluster_jobs_created_total",
        "namespace" => namespace.to_string(),
        "image_type" => image_type.to_string(),
        "lob" => lob_id.to_string()
    )
    .increment(1);
}

/// Record how long cluster submission took.
pub fn job_submit_duration(duration_ms: u64) {
    histogram!("testplane_job_submit_duration_ms").record(duration_ms as f64);
}

/// Record a completed test execution.
pub fn test_execution(duration_seconds: f64, passed: i32, failed: i32, skipped: i32) {
    histogram!("testplane_execution_duration_seconds").record(duration_seconds);
    counter!("testplane_tests_total", "result" => "passed").increment(passed.max(0) as u64);
    counter!("testplane_tests_total", "result" => "failed").increment(failed.max(0) as u64);
    counter!("testplane_tests_total", "result" => "skipped").increment(skipped.max(0) as u64);
}

/// Record a schedule firing.
pub fn schedule_fired(schedule_type: &str) {
    counter!("testplane_schedules_fired_total", "type" => schedule_type.to_string()).increment(1);
}

/// Set a cluster-wide gauge.
pub fn cluster_gauge(name: &'static str, value: f64) {
    gauge!(name).set(value);
}

/// Set a per-namespace gauge.
pub fn namespace_gauge(name: &'static str, namespace: &str, value: f64) {
    gauge!(name, "namespace" => namespace.to_string()).set(value);
}

/// Record an alert notification send.
pub fn alert_sent(severity: &str) {
    counter!("testplane_alerts_sent_total", "severity" => severity.to_string()).increment(1);
}

/// Record completed-job cleanup deletions.
pub fn jobs_cleaned(namespace: &str, count: u64) {
    counter!("testplane_jobs_cleaned_total", "namespace" => namespace.to_string()).increment(count);
}
