use azlens_core::azure::MetricsResponse;
use azlens_core::reports::monitor::{
    MetricProfile, PerformanceReport, ResourceMetrics, summarize_performance,
};
use azlens_core::reports::name_from_id;
use azlens_core::{AzureError, Collector, EndpointFamily, Outcome};
use futures::future::join_all;
use serde_json::Value;

use super::DEFAULT_MAX_RESOURCES;
use crate::client::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    pub profile: MetricProfile,
    /// A single resource; otherwise resources are discovered via Resource Graph.
    pub resource_id: Option<String>,
    pub timespan: String,
    pub resource_group: Option<String>,
    pub max_resources: usize,
}

impl MetricsRequest {
    pub fn defaults(profile: MetricProfile) -> Self {
        Self {
            profile,
            resource_id: None,
            timespan: profile.default_timespan().to_string(),
            resource_group: None,
            max_resources: DEFAULT_MAX_RESOURCES,
        }
    }
}

/// Resource Graph query listing the resources whose metrics are fetched.
pub(crate) fn discovery_query(request: &MetricsRequest) -> String {
    let types = request
        .profile
        .resource_types()
        .iter()
        .map(|t| format!("'{t}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut query = format!("Resources\n| where type in~ ({types})\n");
    if request.profile == MetricProfile::VirtualMachine {
        query.push_str(
            "| where tostring(properties.extended.instanceView.powerState.code) =~ 'PowerState/running'\n",
        );
    }
    if let Some(rg) = &request.resource_group {
        query.push_str(&format!(
            "| where resourceGroup =~ '{}'\n",
            rg.replace('\'', "''")
        ));
    }
    query.push_str(&format!(
        "| project id, name, resourceGroup\n| order by id asc\n| limit {}",
        request.max_resources
    ));
    query
}

async fn fetch_metrics(
    session: &Session<'_>,
    request: &MetricsRequest,
    resource_id: &str,
) -> Result<ResourceMetrics, AzureError> {
    let profile = request.profile;
    let query = [
        ("metricnames", profile.metric_names().to_string()),
        ("timespan", request.timespan.clone()),
        ("interval", profile.interval().to_string()),
        ("aggregation", profile.aggregation().to_string()),
    ];
    let response: MetricsResponse = session
        .get_json(
            EndpointFamily::Metrics,
            &EndpointFamily::metrics_path(resource_id),
            &query,
        )
        .await?;
    Ok(ResourceMetrics::from_response(profile, resource_id, response))
}

pub(crate) async fn performance(
    session: &Session<'_>,
    request: &MetricsRequest,
) -> Outcome<PerformanceReport> {
    let mut collector = Collector::new();
    let targets: Vec<String> = match &request.resource_id {
        Some(id) => vec![id.clone()],
        None => match session.resource_graph(&discovery_query(request)).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.get("id").and_then(Value::as_str))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) => {
                collector.fail(Some("resource discovery"), &err);
                Vec::new()
            }
        },
    };
    tracing::debug!(kind = ?request.profile, resources = targets.len(), "fetching metrics");

    let results = join_all(targets.iter().map(|id| fetch_metrics(session, request, id))).await;
    for (id, result) in targets.iter().zip(results) {
        let scope = format!("resource '{}'", name_from_id(id));
        collector.record(Some(&scope), result);
    }
    collector.finish(|resources| summarize_performance(request.profile, &request.timespan, resources))
}

#[cfg(test)]
mod tests {
    use azlens_core::ToolStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::{MockAzure, SUBSCRIPTION};

    fn vm_id(name: &str) -> String {
        format!("/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{name}")
    }

    fn cpu_response(average: f64) -> serde_json::Value {
        json!({
            "timespan": "PT1H",
            "interval": "PT5M",
            "value": [{
                "name": {"value": "Percentage CPU", "localizedValue": "Percentage CPU"},
                "unit": "Percent",
                "timeseries": [{"data": [{"timeStamp": "2024-06-01T00:00:00Z", "average": average, "maximum": average}]}]
            }]
        })
    }

    #[test]
    fn discovery_query_scopes_resource_group_and_limit() {
        let mut request = MetricsRequest::defaults(MetricProfile::VirtualMachine);
        request.resource_group = Some("o'brien".to_string());
        request.max_resources = 3;
        let query = discovery_query(&request);
        assert!(query.contains("'microsoft.compute/virtualmachines'"));
        assert!(query.contains("PowerState/running"));
        assert!(query.contains("resourceGroup =~ 'o''brien'"));
        assert!(query.ends_with("| limit 3"));

        let storage = discovery_query(&MetricsRequest::defaults(MetricProfile::Storage));
        assert!(!storage.contains("PowerState"));
    }

    #[tokio::test]
    async fn one_failing_resource_degrades_to_partial() {
        let azure = MockAzure::start().await;
        azure
            .mount_resource_graph(json!([
                {"id": vm_id("vm-a"), "name": "vm-a"},
                {"id": vm_id("vm-b"), "name": "vm-b"},
                {"id": vm_id("vm-c"), "name": "vm-c"}
            ]))
            .await;
        for (name, average) in [("vm-a", 92.0), ("vm-c", 2.0)] {
            Mock::given(method("GET"))
                .and(path(format!("{}/providers/Microsoft.Insights/metrics", vm_id(name))))
                .and(query_param("api-version", "2018-01-01"))
                .respond_with(ResponseTemplate::new(200).set_body_json(cpu_response(average)))
                .mount(&azure.server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(format!("{}/providers/Microsoft.Insights/metrics", vm_id("vm-b"))))
            .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailed"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let request = MetricsRequest::defaults(MetricProfile::VirtualMachine);
        let result = performance(&session, &request).await.into_tool_result();

        assert_eq!(result.status, ToolStatus::Partial);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("resource 'vm-b'"));
        assert!(result.errors[0].contains("Monitoring Reader"));
        assert_eq!(result.data["resources_analyzed"], 2);
        assert_eq!(result.data["flagged"]["high_cpu"], json!(["vm-a"]));
        assert_eq!(result.data["flagged"]["low_utilization"], json!(["vm-c"]));
    }

    #[tokio::test]
    async fn explicit_resource_skips_discovery() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/providers/Microsoft.Insights/metrics", vm_id("solo"))))
            .and(query_param("timespan", "PT6H"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cpu_response(40.0)))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let request = MetricsRequest {
            resource_id: Some(vm_id("solo")),
            timespan: "PT6H".to_string(),
            ..MetricsRequest::defaults(MetricProfile::VirtualMachine)
        };
        let result = performance(&session, &request).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["resources"][0]["name"], "solo");
        assert_eq!(result.data["flagged"], json!({}));
    }

    #[tokio::test]
    async fn invalid_metrics_body_is_error_with_verbatim_body() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/providers/Microsoft.Insights/metrics", vm_id("solo"))))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway timeout</html>"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let request = MetricsRequest {
            resource_id: Some(vm_id("solo")),
            ..MetricsRequest::defaults(MetricProfile::VirtualMachine)
        };
        let result = performance(&session, &request).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.data, json!({}));
        assert!(result.errors[0].contains("<html>gateway timeout</html>"));
    }
}
