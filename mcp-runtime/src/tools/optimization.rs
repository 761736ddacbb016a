use azlens_core::azure::ActivityEvent;
use azlens_core::reports::monitor::{ActivityReport, MetricProfile, summarize_activity};
use azlens_core::reports::optimization::{
    AdvisorEntry, AdvisorReport, UnusedReport, UnusedResource, UtilizationSummary,
    summarize_advisor, summarize_unused, summarize_utilization, unused_resources_query,
};
use azlens_core::{Collector, EndpointFamily, Outcome, ToolStatus};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::Value;

use super::performance::{self, MetricsRequest};
use super::{DEFAULT_HOURS_BACK, record_entities, record_rows};
use crate::client::Session;

const ACTIVITY_FIELDS: &str =
    "eventTimestamp,operationName,resourceId,resourceGroupName,resourceProviderName,status,caller";
const UTILIZATION_METRICS_TIMESPAN: &str = "PT24H";

pub(crate) async fn unused_resources(
    session: &Session<'_>,
    resource_group: Option<&str>,
) -> Outcome<UnusedReport> {
    let mut collector = Collector::new();
    let rows = session
        .resource_graph(&unused_resources_query(resource_group))
        .await;
    record_rows(&mut collector, "unused resource query", rows, UnusedResource::from_row);
    collector.finish(summarize_unused)
}

pub(crate) async fn activity_log(session: &Session<'_>, hours_back: u32) -> Outcome<ActivityReport> {
    let end = Utc::now();
    let start = end - Duration::hours(i64::from(hours_back));
    let filter = format!(
        "eventTimestamp ge '{}' and eventTimestamp le '{}'",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let family = EndpointFamily::ActivityLog;
    let events = session
        .list_all::<Value>(
            family,
            &family.subscription_path(session.subscription_id()),
            &[("$filter", filter), ("$select", ACTIVITY_FIELDS.to_string())],
        )
        .await;

    let mut collector = Collector::new();
    record_entities(&mut collector, family, "activity log", events, |event: ActivityEvent| event);
    collector.finish(|events| summarize_activity(hours_back, &events))
}

pub(crate) async fn advisor(session: &Session<'_>, category: Option<&str>) -> Outcome<AdvisorReport> {
    let family = EndpointFamily::Advisor;
    let query: Vec<(&str, String)> = category
        .map(|category| ("$filter", format!("Category eq '{category}'")))
        .into_iter()
        .collect();
    let recommendations = session
        .list_all::<Value>(
            family,
            &family.subscription_path(session.subscription_id()),
            &query,
        )
        .await;

    let mut collector = Collector::new();
    record_entities(
        &mut collector,
        family,
        "advisor recommendations",
        recommendations,
        AdvisorEntry::from_wire,
    );
    collector.finish(|entries| summarize_advisor(category, entries))
}

/// Bookkeeping for tools that merge whole sub-reports.
#[derive(Default)]
struct Sections {
    errors: Vec<String>,
    succeeded: usize,
    failed: usize,
}

impl Sections {
    fn take<R>(&mut self, section: &str, outcome: Outcome<R>) -> Option<R> {
        let status = outcome.status();
        self.errors
            .extend(outcome.errors.into_iter().map(|e| format!("{section}: {e}")));
        if status == ToolStatus::Error {
            self.failed += 1;
            None
        } else {
            self.succeeded += 1;
            Some(outcome.report)
        }
    }

    fn finish<R>(self, report: R) -> Outcome<R> {
        Outcome {
            report,
            errors: self.errors,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

pub(crate) async fn utilization_summary(session: &Session<'_>) -> Outcome<UtilizationSummary> {
    let vm_metrics = MetricsRequest {
        timespan: UTILIZATION_METRICS_TIMESPAN.to_string(),
        ..MetricsRequest::defaults(MetricProfile::VirtualMachine)
    };
    let (unused, advisor, activity, vm) = tokio::join!(
        unused_resources(session, None),
        advisor(session, None),
        activity_log(session, DEFAULT_HOURS_BACK),
        performance::performance(session, &vm_metrics),
    );

    let mut sections = Sections::default();
    let unused = sections.take("unused_resources", unused);
    let advisor = sections.take("advisor", advisor);
    let activity = sections.take("activity_log", activity);
    let vm = sections.take("vm_metrics", vm);
    sections.finish(summarize_utilization(
        unused.as_ref(),
        advisor.as_ref(),
        activity.as_ref(),
        vm.as_ref(),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::{MockAzure, SUBSCRIPTION};

    fn advisor_path() -> String {
        format!("/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Advisor/recommendations")
    }

    fn activity_path() -> String {
        format!(
            "/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Insights/eventtypes/management/values"
        )
    }

    fn unused_rows() -> Value {
        json!([
            {"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/d1", "name": "d1",
             "type": "Microsoft.Compute/disks", "resourceGroup": "rg", "location": "westeurope",
             "resourceDetails": {"diskState": "Unattached"}},
            {"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/ip1", "name": "ip1",
             "type": "Microsoft.Network/publicIPAddresses", "resourceGroup": "rg", "location": "westeurope"}
        ])
    }

    #[tokio::test]
    async fn unused_resources_normalizes_every_row() {
        let azure = MockAzure::start().await;
        azure.mount_resource_graph(unused_rows()).await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = unused_resources(&session, Some("rg")).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["total_unused"], 2);
        assert_eq!(result.data["by_category"]["unattached_disk"], 1);
    }

    #[tokio::test]
    async fn advisor_passes_category_filter() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(advisor_path()))
            .and(query_param("$filter", "Category eq 'Cost'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1/providers/Microsoft.Advisor/recommendations/r1",
                    "properties": {
                        "category": "Cost",
                        "impact": "High",
                        "shortDescription": {"problem": "Right-size VM", "solution": "Resize"},
                        "extendedProperties": {"savingsAmount": "120.5", "savingsCurrency": "USD"}
                    }
                }]
            })))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = advisor(&session, Some("Cost")).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["estimated_savings"], 120.5);
        assert_eq!(
            result.data["recommendations"][0]["resource_id"],
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1"
        );
    }

    #[tokio::test]
    async fn activity_log_groups_events_per_resource() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(activity_path()))
            .and(query_param("api-version", "2015-04-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"eventTimestamp": "2024-06-01T10:00:00Z", "resourceId": "/r/a", "caller": "alice",
                     "operationName": {"value": "write"}, "status": {"value": "Succeeded"}},
                    {"eventTimestamp": "2024-06-01T11:00:00Z", "resourceId": "/r/a", "caller": "bob",
                     "operationName": {"value": "delete"}, "status": {"value": "Failed"}}
                ]
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = activity_log(&session, 24).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["hours_back"], 24);
        assert_eq!(result.data["total_events"], 2);
        assert_eq!(result.data["resources"][0]["event_count"], 2);
        assert_eq!(result.data["resources"][0]["last_activity"], "2024-06-01T11:00:00Z");
    }

    #[tokio::test]
    async fn utilization_summary_survives_a_failed_section() {
        let azure = MockAzure::start().await;
        Mock::given(method("POST"))
            .and(path("/providers/Microsoft.ResourceGraph/resources"))
            .and(body_string_contains("PowerState/running"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&azure.server)
            .await;
        azure.mount_resource_graph(unused_rows()).await;
        Mock::given(method("GET"))
            .and(path(advisor_path()))
            .respond_with(ResponseTemplate::new(500).set_body_string("advisor down"))
            .mount(&azure.server)
            .await;
        Mock::given(method("GET"))
            .and(path(activity_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = utilization_summary(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Partial);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("advisor: "));
        assert_eq!(result.data["potentially_unused"], 2);
        assert_eq!(result.data["cost_opportunities"], 0);
    }
}
