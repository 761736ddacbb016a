//! Azure Monitor alerts, metric alert rules and Resource Health.

use azlens_core::reports::alerting::{
    AlertRuleEntry, AlertRulesReport, AlertsOverviewReport, HealthEntry, HealthReport,
    MonitorAlertEntry, OPEN_ALERT_STATES, summarize_alert_rules, summarize_alerts_overview,
    summarize_health,
};
use azlens_core::{Collector, EndpointFamily, Outcome};
use serde_json::Value;

use super::record_entities;
use crate::client::Session;

pub(crate) async fn alerts_overview(session: &Session<'_>) -> Outcome<AlertsOverviewReport> {
    let family = EndpointFamily::MonitorAlerts;
    let alerts = session
        .list_all::<Value>(
            family,
            &family.subscription_path(session.subscription_id()),
            &[("alertState", OPEN_ALERT_STATES.to_string())],
        )
        .await;
    let mut collector = Collector::new();
    record_entities(&mut collector, family, "monitor alerts", alerts, MonitorAlertEntry::from_wire);
    collector.finish(summarize_alerts_overview)
}

pub(crate) async fn alert_rules(session: &Session<'_>) -> Outcome<AlertRulesReport> {
    let family = EndpointFamily::MetricAlertRules;
    let rules = session
        .list_all::<Value>(family, &family.subscription_path(session.subscription_id()), &[])
        .await;
    let mut collector = Collector::new();
    record_entities(&mut collector, family, "metric alert rules", rules, AlertRuleEntry::from_wire);
    collector.finish(summarize_alert_rules)
}

/// Every availability status is fetched; unavailable resources are picked
/// out locally.
pub(crate) async fn resource_health(session: &Session<'_>) -> Outcome<HealthReport> {
    let family = EndpointFamily::ResourceHealth;
    let statuses = session
        .list_all::<Value>(family, &family.subscription_path(session.subscription_id()), &[])
        .await;
    let mut collector = Collector::new();
    record_entities(&mut collector, family, "resource health", statuses, HealthEntry::from_wire);
    collector.finish(summarize_health)
}

#[cfg(test)]
mod tests {
    use azlens_core::ToolStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::{MockAzure, SUBSCRIPTION};

    fn provider_path(provider: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/providers/{provider}")
    }

    #[tokio::test]
    async fn open_alerts_are_requested_and_ranked() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(provider_path("Microsoft.AlertsManagement/alerts")))
            .and(query_param("alertState", "New,Acknowledged"))
            .and(query_param("api-version", "2019-05-05-preview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/alerts/low", "name": "low", "properties": {"essentials": {
                        "severity": "Sev4", "alertState": "New", "monitorCondition": "Fired",
                        "targetResourceType": "sites", "startDateTime": "2024-06-02T00:00:00Z"}}},
                    {"id": "/alerts/crit", "name": "crit", "properties": {"essentials": {
                        "severity": "Sev0", "alertState": "Acknowledged", "monitorCondition": "Fired",
                        "targetResourceType": "virtualmachines", "startDateTime": "2024-06-01T00:00:00Z"}}}
                ]
            })))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = alerts_overview(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["total_alerts"], 2);
        assert_eq!(result.data["fired"], 2);
        assert_eq!(result.data["alerts"][0]["name"], "crit");
        assert_eq!(result.data["by_state"], json!({"Acknowledged": 1, "New": 1}));
    }

    #[tokio::test]
    async fn missing_monitoring_role_is_named() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(provider_path("Microsoft.Insights/metricAlerts")))
            .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailed"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = alert_rules(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.errors[0].contains("Monitoring Reader"));
    }

    #[tokio::test]
    async fn alert_rules_flag_silent_rules() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(provider_path("Microsoft.Insights/metricAlerts")))
            .and(query_param("api-version", "2018-03-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/rules/cpu", "name": "cpu", "properties": {
                        "severity": 2, "enabled": true, "scopes": ["/subscriptions/s/vm1"],
                        "evaluationFrequency": "PT1M", "windowSize": "PT5M", "actions": []}},
                    {"id": "/rules/bad", "name": "bad", "properties": {"severity": "high"}}
                ]
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = alert_rules(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Partial);
        assert_eq!(result.data["total_rules"], 1);
        assert_eq!(result.data["rules_without_actions"], json!(["cpu"]));
        assert!(result.errors[0].contains("entity '/rules/bad'"));
    }

    #[tokio::test]
    async fn health_reports_unavailable_resources() {
        let azure = MockAzure::start().await;
        let status = |name: &str, state: &str| {
            json!({
                "id": format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/{name}/providers/Microsoft.ResourceHealth/availabilityStatuses/current"),
                "name": "current",
                "properties": {"availabilityState": state, "summary": format!("{name} is {state}")}
            })
        };
        Mock::given(method("GET"))
            .and(path(provider_path("Microsoft.ResourceHealth/availabilityStatuses")))
            .and(query_param("api-version", "2020-05-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [status("sql1", "Available"), status("sql2", "Unavailable")]
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = resource_health(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["total_resources"], 2);
        assert_eq!(result.data["available"], 1);
        assert_eq!(result.data["unhealthy_resources"][0]["resource_name"], "sql2");
        assert_eq!(result.data["unhealthy_resources"][0]["summary"], "sql2 is Unavailable");
    }
}
