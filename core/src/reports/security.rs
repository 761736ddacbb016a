//! Defender for Cloud: alerts, assessments and pricing-tier coverage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::{count_by, round2};
use crate::azure::{
    ComplianceStandard, Pricing, SecureScore, SecurityAlert, SecurityAssessment, Subscription,
};

pub const RECENT_ALERT_WINDOW_DAYS: i64 = 7;

pub const CRITICAL_DEFENDER_SERVICES: [&str; 5] = [
    "VirtualMachines",
    "SqlServers",
    "StorageAccounts",
    "KubernetesService",
    "ContainerRegistry",
];

fn is_critical_severity(severity: &str) -> bool {
    severity.eq_ignore_ascii_case("high") || severity.eq_ignore_ascii_case("critical")
}

// ── Alerts ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEntry {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub description: String,
    pub start_time: String,
    pub compromised_entity: String,
    pub remediation_steps: Vec<String>,
    pub subscription_id: String,
}

impl AlertEntry {
    pub fn from_wire(subscription: &Subscription, alert: SecurityAlert) -> Self {
        let props = alert.properties;
        Self {
            id: alert.id,
            name: alert.name,
            display_name: props.alert_display_name,
            alert_type: props.alert_type,
            severity: props.severity,
            status: props.status,
            description: props.description,
            start_time: props.start_time_utc,
            compromised_entity: props.compromised_entity,
            remediation_steps: props.remediation_steps,
            subscription_id: subscription.subscription_id.clone(),
        }
    }

    fn started_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.start_time)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsReport {
    pub total_alerts: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub critical_alerts: Vec<AlertEntry>,
    pub recent_alerts: Vec<AlertEntry>,
    pub alerts: Vec<AlertEntry>,
}

/// Newest first, then by ID.
pub fn summarize_alerts(mut alerts: Vec<AlertEntry>, now: DateTime<Utc>) -> AlertsReport {
    alerts.sort_by(|a, b| {
        b.start_time
            .cmp(&a.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    let cutoff = now - Duration::days(RECENT_ALERT_WINDOW_DAYS);

    AlertsReport {
        total_alerts: alerts.len(),
        by_severity: count_by(alerts.iter().map(|a| a.severity.as_str())),
        by_status: count_by(alerts.iter().map(|a| a.status.as_str())),
        critical_alerts: alerts
            .iter()
            .filter(|a| is_critical_severity(&a.severity))
            .cloned()
            .collect(),
        recent_alerts: alerts
            .iter()
            .filter(|a| a.started_at().is_some_and(|ts| ts >= cutoff))
            .cloned()
            .collect(),
        alerts,
    }
}

// ── Assessments ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentEntry {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub status: String,
    pub cause: String,
    pub severity: String,
    pub categories: Vec<String>,
    pub resource_id: String,
    pub subscription_id: String,
}

impl AssessmentEntry {
    pub fn from_wire(subscription: &Subscription, assessment: SecurityAssessment) -> Self {
        let props = assessment.properties;
        let resource_id = props
            .resource_details
            .get("Id")
            .or_else(|| props.resource_details.get("id"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id: assessment.id,
            name: assessment.name,
            display_name: props.display_name,
            status: props.status.code,
            cause: props.status.cause,
            severity: props.metadata.severity,
            categories: props.metadata.categories,
            resource_id,
            subscription_id: subscription.subscription_id.clone(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("unhealthy") || self.status.eq_ignore_ascii_case("failed")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssessmentsReport {
    pub total_assessments: usize,
    pub healthy: usize,
    pub failed: usize,
    pub not_applicable: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub critical_findings: Vec<AssessmentEntry>,
    pub assessments: Vec<AssessmentEntry>,
}

pub fn summarize_assessments(mut assessments: Vec<AssessmentEntry>) -> AssessmentsReport {
    assessments.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.id.cmp(&b.id))
    });
    let failed = assessments.iter().filter(|a| a.is_failed()).count();
    let healthy = assessments
        .iter()
        .filter(|a| a.status.eq_ignore_ascii_case("healthy"))
        .count();

    AssessmentsReport {
        total_assessments: assessments.len(),
        healthy,
        failed,
        not_applicable: assessments
            .iter()
            .filter(|a| a.status.eq_ignore_ascii_case("notapplicable"))
            .count(),
        by_severity: count_by(assessments.iter().map(|a| a.severity.as_str())),
        by_status: count_by(assessments.iter().map(|a| a.status.as_str())),
        critical_findings: assessments
            .iter()
            .filter(|a| a.is_failed() && is_critical_severity(&a.severity))
            .cloned()
            .collect(),
        assessments,
    }
}

// ── Defender plans ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub subscription_id: String,
    pub subscription_name: String,
    pub service: String,
    pub pricing_tier: String,
    pub enabled: bool,
}

impl PlanEntry {
    pub fn from_wire(subscription: &Subscription, pricing: Pricing) -> Self {
        let tier = pricing.properties.pricing_tier;
        Self {
            subscription_id: subscription.subscription_id.clone(),
            subscription_name: subscription.label().to_string(),
            service: pricing.name,
            enabled: tier.eq_ignore_ascii_case("standard"),
            pricing_tier: tier,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionCoverage {
    pub subscription_name: String,
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCoverage {
    pub enabled_subscriptions: usize,
    pub disabled_subscriptions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefenderReport {
    pub total_plans: usize,
    pub enabled_plans: usize,
    pub disabled_plans: usize,
    pub coverage_percentage: f64,
    pub by_subscription: BTreeMap<String, SubscriptionCoverage>,
    pub by_service: BTreeMap<String, ServiceCoverage>,
    pub recommendations: Vec<String>,
}

pub fn summarize_defender(plans: Vec<PlanEntry>) -> DefenderReport {
    let mut by_subscription: BTreeMap<String, SubscriptionCoverage> = BTreeMap::new();
    let mut by_service: BTreeMap<String, ServiceCoverage> = BTreeMap::new();
    let mut recommendations = BTreeSet::new();

    for plan in &plans {
        let coverage = by_subscription
            .entry(plan.subscription_id.clone())
            .or_insert_with(|| SubscriptionCoverage {
                subscription_name: plan.subscription_name.clone(),
                ..SubscriptionCoverage::default()
            });
        let service = by_service.entry(plan.service.clone()).or_default();
        if plan.enabled {
            coverage.enabled.push(plan.service.clone());
            service.enabled_subscriptions += 1;
        } else {
            coverage.disabled.push(plan.service.clone());
            service.disabled_subscriptions += 1;
            if CRITICAL_DEFENDER_SERVICES
                .iter()
                .any(|critical| critical.eq_ignore_ascii_case(&plan.service))
            {
                recommendations.insert(format!(
                    "Enable Defender for {} in subscription '{}'",
                    plan.service, plan.subscription_name
                ));
            }
        }
    }
    for coverage in by_subscription.values_mut() {
        coverage.enabled.sort();
        coverage.disabled.sort();
    }

    let enabled = plans.iter().filter(|p| p.enabled).count();
    let coverage_percentage = if plans.is_empty() {
        0.0
    } else {
        round2(enabled as f64 * 100.0 / plans.len() as f64)
    };

    DefenderReport {
        total_plans: plans.len(),
        enabled_plans: enabled,
        disabled_plans: plans.len() - enabled,
        coverage_percentage,
        by_subscription,
        by_service,
        recommendations: recommendations.into_iter().collect(),
    }
}

// ── Secure score and compliance ────────────────────────────────

/// Name of the subscription-wide secure score.
pub const OVERALL_SECURE_SCORE: &str = "ascScore";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreEntry {
    pub name: String,
    pub display_name: String,
    pub current: f64,
    pub max: f64,
    pub percentage: f64,
}

impl ScoreEntry {
    pub fn from_wire(score: SecureScore) -> Self {
        let details = score.properties.score;
        let current = details.current.unwrap_or(0.0);
        let max = details.max.unwrap_or(0.0);
        let percentage = match details.percentage {
            Some(fraction) => fraction * 100.0,
            None if max > 0.0 => current * 100.0 / max,
            None => 0.0,
        };
        Self {
            name: score.name,
            display_name: score.properties.display_name,
            current,
            max,
            percentage: round2(percentage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceEntry {
    pub standard: String,
    pub state: String,
    pub passed_controls: u32,
    pub failed_controls: u32,
    pub skipped_controls: u32,
    pub unsupported_controls: u32,
    /// Passed share of the controls that were actually evaluated.
    pub compliance_percentage: Option<f64>,
}

impl ComplianceEntry {
    pub fn from_wire(standard: ComplianceStandard) -> Self {
        let props = standard.properties;
        let evaluated = props.passed_controls + props.failed_controls;
        Self {
            standard: standard.name,
            compliance_percentage: (evaluated > 0)
                .then(|| round2(f64::from(props.passed_controls) * 100.0 / f64::from(evaluated))),
            state: props.state,
            passed_controls: props.passed_controls,
            failed_controls: props.failed_controls,
            skipped_controls: props.skipped_controls,
            unsupported_controls: props.unsupported_controls,
        }
    }

    pub fn is_failing(&self) -> bool {
        self.state.eq_ignore_ascii_case("failed") || self.failed_controls > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecureScoreReport {
    pub secure_score: Option<ScoreEntry>,
    pub scores: Vec<ScoreEntry>,
    pub total_standards: usize,
    pub failing_standards: Vec<String>,
    pub standards: Vec<ComplianceEntry>,
}

/// The overall score is `ascScore`, or the only score when there is one.
pub fn summarize_secure_score(
    mut scores: Vec<ScoreEntry>,
    mut standards: Vec<ComplianceEntry>,
) -> SecureScoreReport {
    scores.sort_by(|a, b| a.name.cmp(&b.name));
    standards.sort_by(|a, b| a.standard.cmp(&b.standard));
    let secure_score = scores
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(OVERALL_SECURE_SCORE))
        .or_else(|| match scores.as_slice() {
            [only] => Some(only),
            _ => None,
        })
        .cloned();

    SecureScoreReport {
        secure_score,
        total_standards: standards.len(),
        failing_standards: standards
            .iter()
            .filter(|s| s.is_failing())
            .map(|s| s.standard.clone())
            .collect(),
        scores,
        standards,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn subscription(id: &str, name: &str) -> Subscription {
        Subscription {
            subscription_id: id.to_string(),
            display_name: name.to_string(),
            state: "Enabled".to_string(),
        }
    }

    fn alert(id: &str, severity: &str, start: &str) -> AlertEntry {
        let wire: SecurityAlert = serde_json::from_value(json!({
            "id": id,
            "name": id,
            "properties": {
                "alertDisplayName": format!("alert {id}"),
                "severity": severity,
                "status": "Active",
                "startTimeUtc": start
            }
        }))
        .unwrap();
        AlertEntry::from_wire(&subscription("s1", "Prod"), wire)
    }

    #[test]
    fn alerts_split_into_critical_and_recent() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let report = summarize_alerts(
            vec![
                alert("a", "Low", "2024-06-09T10:00:00Z"),
                alert("b", "High", "2024-05-01T10:00:00Z"),
                alert("c", "Critical", "2024-06-08T10:00:00Z"),
            ],
            now,
        );
        assert_eq!(report.total_alerts, 3);
        assert_eq!(report.critical_alerts.len(), 2);
        let recent: Vec<_> = report.recent_alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(recent, vec!["a", "c"]);
        assert_eq!(report.alerts[0].id, "a");
        assert_eq!(report.by_severity.get("High"), Some(&1));
    }

    #[test]
    fn failed_high_assessments_are_critical_findings() {
        let wire: Vec<SecurityAssessment> = serde_json::from_value(json!([
            {"id": "1", "properties": {"displayName": "MFA", "status": {"code": "Unhealthy"}, "metadata": {"severity": "High"}}},
            {"id": "2", "properties": {"displayName": "TLS", "status": {"code": "Healthy"}, "metadata": {"severity": "High"}}},
            {"id": "3", "properties": {"displayName": "Tags", "status": {"code": "Unhealthy"}, "metadata": {"severity": "Low"}}}
        ]))
        .unwrap();
        let sub = subscription("s1", "Prod");
        let report = summarize_assessments(
            wire.into_iter()
                .map(|a| AssessmentEntry::from_wire(&sub, a))
                .collect(),
        );
        assert_eq!(report.failed, 2);
        assert_eq!(report.healthy, 1);
        assert_eq!(report.critical_findings.len(), 1);
        assert_eq!(report.critical_findings[0].display_name, "MFA");
    }

    #[test]
    fn defender_recommends_only_disabled_critical_services() {
        let sub = subscription("s1", "Prod");
        let plans: Vec<Pricing> = serde_json::from_value(json!([
            {"name": "VirtualMachines", "properties": {"pricingTier": "Standard"}},
            {"name": "SqlServers", "properties": {"pricingTier": "Free"}},
            {"name": "Dns", "properties": {"pricingTier": "Free"}}
        ]))
        .unwrap();
        let report = summarize_defender(
            plans
                .into_iter()
                .map(|p| PlanEntry::from_wire(&sub, p))
                .collect(),
        );
        assert_eq!(report.enabled_plans, 1);
        assert_eq!(report.disabled_plans, 2);
        assert_eq!(report.coverage_percentage, 33.33);
        assert_eq!(
            report.recommendations,
            vec!["Enable Defender for SqlServers in subscription 'Prod'".to_string()]
        );
        assert_eq!(report.by_subscription["s1"].disabled, vec!["Dns", "SqlServers"]);
    }

    #[test]
    fn secure_score_percentage_is_scaled() {
        let score = ScoreEntry::from_wire(
            serde_json::from_value(json!({
                "name": "ascScore",
                "properties": {"displayName": "ASC score", "score": {"max": 58, "current": 26.5, "percentage": 0.4569}}
            }))
            .unwrap(),
        );
        assert_eq!(score.percentage, 45.69);

        let derived = ScoreEntry::from_wire(
            serde_json::from_value(json!({"name": "other", "properties": {"score": {"max": 10, "current": "4"}}}))
                .unwrap(),
        );
        assert_eq!(derived.percentage, 40.0);
    }

    #[test]
    fn failing_standards_are_listed() {
        let standard = |name: &str, state: &str, passed: u32, failed: u32| {
            ComplianceEntry::from_wire(
                serde_json::from_value(json!({
                    "name": name,
                    "properties": {"state": state, "passedControls": passed, "failedControls": failed, "skippedControls": 1}
                }))
                .unwrap(),
            )
        };
        let report = summarize_secure_score(
            Vec::new(),
            vec![
                standard("PCI-DSS-3.2.1", "Failed", 30, 10),
                standard("Azure-CIS-1.1.0", "Passed", 20, 0),
                standard("SOC-TSP", "Unsupported", 0, 0),
            ],
        );
        assert!(report.secure_score.is_none());
        assert_eq!(report.total_standards, 3);
        assert_eq!(report.failing_standards, vec!["PCI-DSS-3.2.1".to_string()]);
        assert_eq!(report.standards[1].compliance_percentage, Some(75.0));
        assert_eq!(report.standards[2].compliance_percentage, None);
    }
}
