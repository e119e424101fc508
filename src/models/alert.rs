//! Alert rules and notification settings, part of the admin policy document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertOperator {
    GreaterThan,
    LessThan,
    Equals,
}

impl AlertOperator {
    /// Equality uses an epsilon to tolerate float noise in collected metrics.
    pub fn is_violated(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertOperator::GreaterThan => value > threshold,
            AlertOperator::LessThan => value < threshold,
            AlertOperator::Equals => (value - threshold).abs() < 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Information,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Information => "Information",
            AlertSeverity::Warning => "Warning",
            AlertSeverity::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Metric name the rule watches, e.g. `TestExecution.FailRate`.
    pub metric: String,
    pub threshold: f64,
    pub operator: AlertOperator,
    pub time_window_minutes: i64,
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Dimensions that must all be present and equal on the evaluated metric.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum severity that produces an email.
    #[serde(default = "default_email_severity")]
    pub min_severity: Option<AlertSeverity>,
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_email_severity() -> Option<AlertSeverity> {
    Some(AlertSeverity::Warning)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookNotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default)]
    pub email: EmailNotificationSettings,
    #[serde(default)]
    pub webhook: WebhookNotificationSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSettings {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_comparisons() {
        assert!(AlertOperator::GreaterThan.is_violated(1.1, 1.0));
        assert!(!AlertOperator::GreaterThan.is_violated(1.0, 1.0));
        assert!(AlertOperator::LessThan.is_violated(0.9, 1.0));
        assert!(AlertOperator::Equals.is_violated(1.00001, 1.0));
        assert!(!AlertOperator::Equals.is_violated(1.001, 1.0));
    }

    #[test]
    fn severity_ordering_supports_min_severity_gating() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Information);
    }
}
