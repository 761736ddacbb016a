//! Azure Monitor metrics and activity-log summaries.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{CountEntry, average, count_by, name_from_id, round2, top_counts};
use crate::azure::{ActivityEvent, Metric, MetricsResponse};

pub const VM_HIGH_CPU_PERCENT: f64 = 80.0;
pub const VM_LOW_CPU_PERCENT: f64 = 5.0;
pub const STORAGE_LOW_TRANSACTIONS: f64 = 100.0;
pub const DATABASE_HIGH_UTILIZATION_PERCENT: f64 = 80.0;

pub const INACTIVE_EVENT_THRESHOLD: usize = 5;
const TOP_CALLERS: usize = 10;

/// Which metric set to request and which thresholds to flag against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricProfile {
    VirtualMachine,
    Storage,
    Database,
}

impl MetricProfile {
    pub const fn metric_names(self) -> &'static str {
        match self {
            MetricProfile::VirtualMachine => {
                "Percentage CPU,Available Memory Bytes,Disk Read Bytes,Disk Write Bytes,Network In Total,Network Out Total"
            }
            MetricProfile::Storage => "Transactions,UsedCapacity,Availability,SuccessE2ELatency",
            MetricProfile::Database => {
                "cpu_percent,dtu_consumption_percent,connection_successful,storage_percent"
            }
        }
    }

    pub const fn aggregation(self) -> &'static str {
        match self {
            MetricProfile::VirtualMachine => "Average,Maximum",
            MetricProfile::Storage => "Total,Average",
            MetricProfile::Database => "Average,Maximum,Total",
        }
    }

    pub const fn interval(self) -> &'static str {
        match self {
            MetricProfile::VirtualMachine => "PT5M",
            MetricProfile::Storage | MetricProfile::Database => "PT1H",
        }
    }

    pub const fn default_timespan(self) -> &'static str {
        match self {
            MetricProfile::VirtualMachine => "PT1H",
            MetricProfile::Storage | MetricProfile::Database => "PT24H",
        }
    }

    /// Resource Graph `type` filter used when no single resource is given.
    pub const fn resource_types(self) -> &'static [&'static str] {
        match self {
            MetricProfile::VirtualMachine => &["microsoft.compute/virtualmachines"],
            MetricProfile::Storage => &["microsoft.storage/storageaccounts"],
            MetricProfile::Database => &["microsoft.sql/servers/databases"],
        }
    }

    pub fn flags(self, metrics: &BTreeMap<String, MetricSeries>) -> Vec<String> {
        let avg = |name: &str| metrics.get(name).and_then(|m| m.average);
        let mut flags = Vec::new();
        match self {
            MetricProfile::VirtualMachine => {
                if let Some(cpu) = avg("Percentage CPU") {
                    if cpu >= VM_HIGH_CPU_PERCENT {
                        flags.push("high_cpu".to_string());
                    } else if cpu < VM_LOW_CPU_PERCENT {
                        flags.push("low_utilization".to_string());
                    }
                }
            }
            MetricProfile::Storage => {
                let transactions = metrics.get("Transactions").and_then(|m| m.total);
                if transactions.is_some_and(|total| total < STORAGE_LOW_TRANSACTIONS) {
                    flags.push("low_usage".to_string());
                }
            }
            MetricProfile::Database => {
                let busiest = [avg("cpu_percent"), avg("dtu_consumption_percent")]
                    .into_iter()
                    .flatten()
                    .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));
                if busiest.is_some_and(|v| v >= DATABASE_HIGH_UTILIZATION_PERCENT) {
                    flags.push("high_utilization".to_string());
                }
            }
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub display_name: String,
    pub unit: String,
    pub average: Option<f64>,
    pub maximum: Option<f64>,
    pub total: Option<f64>,
    pub data_points: usize,
}

impl MetricSeries {
    pub fn from_metric(metric: &Metric) -> Self {
        let points: Vec<_> = metric
            .timeseries
            .iter()
            .flat_map(|series| series.data.iter())
            .collect();
        let averages: Vec<f64> = points.iter().filter_map(|p| p.average).collect();
        let totals: Vec<f64> = points.iter().filter_map(|p| p.total).collect();
        let maximum = points
            .iter()
            .filter_map(|p| p.maximum.or(p.average))
            .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));
        let data_points = points
            .iter()
            .filter(|p| p.average.is_some() || p.maximum.is_some() || p.total.is_some())
            .count();

        Self {
            display_name: metric.name.display().to_string(),
            unit: metric.unit.clone(),
            average: average(averages).map(round2),
            maximum: maximum.map(round2),
            total: (!totals.is_empty()).then(|| round2(totals.iter().sum())),
            data_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    pub resource_id: String,
    pub name: String,
    pub metrics: BTreeMap<String, MetricSeries>,
    pub flags: Vec<String>,
}

impl ResourceMetrics {
    pub fn from_response(profile: MetricProfile, resource_id: &str, response: MetricsResponse) -> Self {
        let metrics: BTreeMap<String, MetricSeries> = response
            .value
            .iter()
            .filter(|metric| !metric.name.value.is_empty())
            .map(|metric| (metric.name.value.clone(), MetricSeries::from_metric(metric)))
            .collect();
        Self {
            resource_id: resource_id.to_string(),
            name: name_from_id(resource_id).to_string(),
            flags: profile.flags(&metrics),
            metrics,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub resource_kind: MetricProfile,
    pub timespan: String,
    pub resources_analyzed: usize,
    pub flagged: BTreeMap<String, Vec<String>>,
    pub resources: Vec<ResourceMetrics>,
}

pub fn summarize_performance(
    profile: MetricProfile,
    timespan: &str,
    mut resources: Vec<ResourceMetrics>,
) -> PerformanceReport {
    resources.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
    let mut flagged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for resource in &resources {
        for flag in &resource.flags {
            flagged
                .entry(flag.clone())
                .or_default()
                .push(resource.name.clone());
        }
    }
    PerformanceReport {
        resource_kind: profile,
        timespan: timespan.to_string(),
        resources_analyzed: resources.len(),
        flagged,
        resources,
    }
}

// ── Activity log ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceActivity {
    pub resource_id: String,
    pub resource_group: String,
    pub event_count: usize,
    pub last_activity: String,
    pub operations: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub hours_back: u32,
    pub total_events: usize,
    pub resources_with_activity: usize,
    pub by_status: BTreeMap<String, usize>,
    pub top_callers: Vec<CountEntry>,
    pub inactive_resources: Vec<String>,
    pub resources: Vec<ResourceActivity>,
}

/// Busiest resources first, ties by ID.
pub fn summarize_activity(hours_back: u32, events: &[ActivityEvent]) -> ActivityReport {
    let mut per_resource: BTreeMap<String, ResourceActivity> = BTreeMap::new();
    for event in events.iter().filter(|e| !e.resource_id.is_empty()) {
        let key = event.resource_id.to_ascii_lowercase();
        let entry = per_resource
            .entry(key)
            .or_insert_with(|| ResourceActivity {
                resource_id: event.resource_id.clone(),
                resource_group: event.resource_group_name.clone(),
                event_count: 0,
                last_activity: String::new(),
                operations: BTreeSet::new(),
            });
        entry.event_count += 1;
        if event.event_timestamp > entry.last_activity {
            entry.last_activity = event.event_timestamp.clone();
        }
        let operation = event.operation_name.display();
        if !operation.is_empty() {
            entry.operations.insert(operation.to_string());
        }
    }

    let mut resources: Vec<ResourceActivity> = per_resource.into_values().collect();
    resources.sort_by(|a, b| {
        b.event_count
            .cmp(&a.event_count)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    let mut inactive_resources: Vec<String> = resources
        .iter()
        .filter(|r| r.event_count < INACTIVE_EVENT_THRESHOLD)
        .map(|r| r.resource_id.clone())
        .collect();
    inactive_resources.sort();

    ActivityReport {
        hours_back,
        total_events: events.len(),
        resources_with_activity: resources.len(),
        by_status: count_by(events.iter().map(|e| e.status.display())),
        top_callers: top_counts(
            events.iter().map(|e| e.caller.as_str()).filter(|c| !c.is_empty()),
            TOP_CALLERS,
        ),
        inactive_resources,
        resources,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(metrics: serde_json::Value) -> MetricsResponse {
        serde_json::from_value(json!({ "timespan": "PT1H", "value": metrics })).unwrap()
    }

    fn cpu(values: &[f64]) -> serde_json::Value {
        let data: Vec<_> = values
            .iter()
            .map(|v| json!({"timeStamp": "2024-01-01T00:00:00Z", "average": v, "maximum": v + 1.0}))
            .collect();
        json!([{
            "name": {"value": "Percentage CPU", "localizedValue": "Percentage CPU"},
            "unit": "Percent",
            "timeseries": [{"data": data}]
        }])
    }

    #[test]
    fn busy_vm_is_flagged_high_cpu() {
        let metrics = ResourceMetrics::from_response(
            MetricProfile::VirtualMachine,
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1",
            response(cpu(&[85.0, 95.0])),
        );
        assert_eq!(metrics.name, "vm1");
        let series = &metrics.metrics["Percentage CPU"];
        assert_eq!(series.average, Some(90.0));
        assert_eq!(series.maximum, Some(96.0));
        assert_eq!(series.data_points, 2);
        assert_eq!(metrics.flags, vec!["high_cpu".to_string()]);
    }

    #[test]
    fn idle_vm_is_flagged_low_utilization() {
        let metrics = ResourceMetrics::from_response(
            MetricProfile::VirtualMachine,
            "/vm/idle",
            response(cpu(&[1.0, 2.0])),
        );
        assert_eq!(metrics.flags, vec!["low_utilization".to_string()]);
    }

    #[test]
    fn quiet_storage_account_is_low_usage() {
        let metrics = ResourceMetrics::from_response(
            MetricProfile::Storage,
            "/storage/quiet",
            response(json!([{
                "name": {"value": "Transactions"},
                "timeseries": [{"data": [{"total": 10.0}, {"total": 20.0}]}]
            }])),
        );
        assert_eq!(metrics.metrics["Transactions"].total, Some(30.0));
        assert_eq!(metrics.flags, vec!["low_usage".to_string()]);
    }

    #[test]
    fn database_flag_uses_busier_of_cpu_and_dtu() {
        let metrics = ResourceMetrics::from_response(
            MetricProfile::Database,
            "/db/busy",
            response(json!([
                {"name": {"value": "cpu_percent"}, "timeseries": [{"data": [{"average": 20.0}]}]},
                {"name": {"value": "dtu_consumption_percent"}, "timeseries": [{"data": [{"average": 81.0}]}]}
            ])),
        );
        assert_eq!(metrics.flags, vec!["high_utilization".to_string()]);
    }

    #[test]
    fn performance_report_groups_flags_by_name() {
        let report = summarize_performance(
            MetricProfile::VirtualMachine,
            "PT1H",
            vec![
                ResourceMetrics::from_response(MetricProfile::VirtualMachine, "/vm/b", response(cpu(&[90.0]))),
                ResourceMetrics::from_response(MetricProfile::VirtualMachine, "/vm/a", response(cpu(&[99.0]))),
            ],
        );
        assert_eq!(report.resources_analyzed, 2);
        assert_eq!(report.flagged["high_cpu"], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn activity_groups_events_per_resource() {
        let events: Vec<ActivityEvent> = serde_json::from_value(json!([
            {"eventTimestamp": "2024-01-01T00:00:00Z", "resourceId": "/vm/a", "operationName": {"value": "write", "localizedValue": "Write VM"}, "caller": "alice@example.com", "status": {"value": "Succeeded"}},
            {"eventTimestamp": "2024-01-03T00:00:00Z", "resourceId": "/VM/A", "operationName": {"value": "start", "localizedValue": "Start VM"}, "caller": "alice@example.com", "status": {"value": "Succeeded"}},
            {"eventTimestamp": "2024-01-02T00:00:00Z", "resourceId": "/vm/b", "operationName": {"value": "delete"}, "caller": "bob@example.com", "status": {"value": "Failed"}}
        ]))
        .unwrap();
        let report = summarize_activity(168, &events);
        assert_eq!(report.total_events, 3);
        assert_eq!(report.resources_with_activity, 2);
        assert_eq!(report.resources[0].event_count, 2);
        assert_eq!(report.resources[0].last_activity, "2024-01-03T00:00:00Z");
        assert_eq!(report.resources[0].operations.len(), 2);
        assert_eq!(report.top_callers[0].name, "alice@example.com");
        assert_eq!(report.inactive_resources.len(), 2);
        assert_eq!(report.by_status.get("Failed"), Some(&1));
    }
}
