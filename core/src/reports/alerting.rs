//! Azure Monitor alerts, metric alert rules and Resource Health.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{count_by, name_from_id};
use crate::azure::{AvailabilityStatus, MetricAlertRule, MonitorAlert};

// ── Fired alerts ───────────────────────────────────────────────

/// Alert states the overview asks Azure for.
pub const OPEN_ALERT_STATES: &str = "New,Acknowledged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorAlertEntry {
    pub id: String,
    pub name: String,
    pub severity: String,
    pub alert_state: String,
    pub monitor_condition: String,
    pub signal_type: String,
    pub monitor_service: String,
    pub alert_rule: String,
    pub target_resource: String,
    pub target_resource_name: String,
    pub target_resource_type: String,
    pub target_resource_group: String,
    pub started_at: String,
}

impl MonitorAlertEntry {
    pub fn from_wire(alert: MonitorAlert) -> Self {
        let essentials = alert.properties.essentials;
        let target_resource_name = if essentials.target_resource_name.is_empty() {
            name_from_id(&essentials.target_resource).to_string()
        } else {
            essentials.target_resource_name
        };
        Self {
            id: alert.id,
            name: alert.name,
            severity: essentials.severity,
            alert_state: essentials.alert_state,
            monitor_condition: essentials.monitor_condition,
            signal_type: essentials.signal_type,
            monitor_service: essentials.monitor_service,
            alert_rule: essentials.alert_rule,
            target_resource: essentials.target_resource,
            target_resource_name,
            target_resource_type: essentials.target_resource_type,
            target_resource_group: essentials.target_resource_group,
            started_at: essentials.start_date_time,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.monitor_condition.eq_ignore_ascii_case("fired")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsOverviewReport {
    pub total_alerts: usize,
    pub fired: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_state: BTreeMap<String, usize>,
    pub by_monitor_service: BTreeMap<String, usize>,
    pub by_target_resource_type: BTreeMap<String, usize>,
    pub alerts: Vec<MonitorAlertEntry>,
}

/// `Sev0` (most severe) first, then newest first.
pub fn summarize_alerts_overview(mut alerts: Vec<MonitorAlertEntry>) -> AlertsOverviewReport {
    alerts.sort_by(|a, b| {
        severity_rank(&a.severity)
            .cmp(&severity_rank(&b.severity))
            .then_with(|| b.started_at.cmp(&a.started_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    AlertsOverviewReport {
        total_alerts: alerts.len(),
        fired: alerts.iter().filter(|a| a.is_fired()).count(),
        by_severity: count_by(alerts.iter().map(|a| a.severity.as_str())),
        by_state: count_by(alerts.iter().map(|a| a.alert_state.as_str())),
        by_monitor_service: count_by(alerts.iter().map(|a| a.monitor_service.as_str())),
        by_target_resource_type: count_by(alerts.iter().map(|a| a.target_resource_type.as_str())),
        alerts,
    }
}

/// Unparseable severities sort last.
fn severity_rank(severity: &str) -> u8 {
    let severity = severity.trim();
    match severity.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sev") => {
            severity[3..].parse().unwrap_or(u8::MAX)
        }
        _ => u8::MAX,
    }
}

// ── Metric alert rules ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRuleEntry {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub severity: Option<u8>,
    pub enabled: bool,
    pub scopes: Vec<String>,
    pub evaluation_frequency: String,
    pub window_size: String,
    pub target_resource_type: Option<String>,
    pub action_groups: usize,
    pub auto_mitigate: Option<bool>,
}

impl AlertRuleEntry {
    pub fn from_wire(rule: MetricAlertRule) -> Self {
        let props = rule.properties;
        Self {
            id: rule.id,
            name: rule.name,
            description: props.description.filter(|d| !d.trim().is_empty()),
            severity: props.severity,
            enabled: props.enabled,
            scopes: props.scopes,
            evaluation_frequency: props.evaluation_frequency,
            window_size: props.window_size,
            target_resource_type: props.target_resource_type,
            action_groups: props.actions.len(),
            auto_mitigate: props.auto_mitigate,
        }
    }

    fn severity_label(&self) -> String {
        self.severity
            .map_or_else(|| "Unknown".to_string(), |level| format!("Sev{level}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRulesReport {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub disabled_rules: usize,
    pub by_severity: BTreeMap<String, usize>,
    /// Enabled rules that notify nobody when they fire.
    pub rules_without_actions: Vec<String>,
    pub recommendations: Vec<String>,
    pub rules: Vec<AlertRuleEntry>,
}

pub fn summarize_alert_rules(mut rules: Vec<AlertRuleEntry>) -> AlertRulesReport {
    rules.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    let enabled_rules = rules.iter().filter(|r| r.enabled).count();
    let rules_without_actions: Vec<String> = rules
        .iter()
        .filter(|r| r.enabled && r.action_groups == 0)
        .map(|r| r.name.clone())
        .collect();

    let mut recommendations = Vec::new();
    if !rules_without_actions.is_empty() {
        recommendations.push(format!(
            "Attach an action group to {} enabled rule(s) so that fired alerts reach someone",
            rules_without_actions.len()
        ));
    }
    let disabled_rules = rules.len() - enabled_rules;
    if disabled_rules > 0 {
        recommendations.push(format!(
            "Re-enable or delete {disabled_rules} disabled rule(s)"
        ));
    }
    if rules.is_empty() {
        recommendations.push("No metric alert rules exist; add alerts for critical workloads".to_string());
    }

    AlertRulesReport {
        total_rules: rules.len(),
        enabled_rules,
        disabled_rules,
        by_severity: count_by(rules.iter().map(AlertRuleEntry::severity_label)),
        rules_without_actions,
        recommendations,
        rules,
    }
}

// ── Resource Health ────────────────────────────────────────────

const HEALTH_STATUS_SUFFIX: &str = "/providers/microsoft.resourcehealth/availabilitystatuses/";

pub const AVAILABLE: &str = "Available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthEntry {
    pub resource_id: String,
    pub resource_name: String,
    pub availability_state: String,
    pub summary: Option<String>,
    pub reason_type: Option<String>,
    pub occurred_at: Option<String>,
    pub reported_at: Option<String>,
}

impl HealthEntry {
    pub fn from_wire(status: AvailabilityStatus) -> Self {
        let resource_id = match status.id.to_ascii_lowercase().find(HEALTH_STATUS_SUFFIX) {
            Some(index) => status.id[..index].to_string(),
            None => status.id,
        };
        let props = status.properties;
        Self {
            resource_name: name_from_id(&resource_id).to_string(),
            resource_id,
            availability_state: props.availability_state,
            summary: props.summary,
            reason_type: props.reason_type,
            occurred_at: props.occured_time,
            reported_at: props.reported_time,
        }
    }

    pub fn is_available(&self) -> bool {
        self.availability_state.eq_ignore_ascii_case(AVAILABLE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub total_resources: usize,
    pub available: usize,
    pub by_state: BTreeMap<String, usize>,
    pub unhealthy_resources: Vec<HealthEntry>,
}

/// Only resources that are not `Available` are listed individually.
pub fn summarize_health(statuses: Vec<HealthEntry>) -> HealthReport {
    let available = statuses.iter().filter(|s| s.is_available()).count();
    let by_state = count_by(statuses.iter().map(|s| s.availability_state.as_str()));
    let mut unhealthy: Vec<HealthEntry> = statuses.into_iter().filter(|s| !s.is_available()).collect();
    unhealthy.sort_by(|a, b| {
        a.availability_state
            .cmp(&b.availability_state)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    HealthReport {
        total_resources: available + unhealthy.len(),
        available,
        by_state,
        unhealthy_resources: unhealthy,
    }
}
