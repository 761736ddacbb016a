use std::fmt;

use serde::Serialize;

/// Azure REST endpoint families consumed by the tools.
///
/// Azure pins an explicit `api-version` per provider, and each family needs a
/// specific RBAC role. Both live here so a 403 can name the role that is
/// probably missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFamily {
    Subscriptions,
    Metrics,
    ActivityLog,
    SecurityAlerts,
    SecurityAssessments,
    SecurityPricings,
    ResourceGraph,
    Advisor,
    CostQuery,
    Budgets,
    ResourceLocks,
    RoleAssignments,
    MonitorAlerts,
    MetricAlertRules,
    ResourceHealth,
    SecureScores,
    RegulatoryCompliance,
}

impl EndpointFamily {
    pub const ALL: [EndpointFamily; 17] = [
        EndpointFamily::Subscriptions,
        EndpointFamily::Metrics,
        EndpointFamily::ActivityLog,
        EndpointFamily::SecurityAlerts,
        EndpointFamily::SecurityAssessments,
        EndpointFamily::SecurityPricings,
        EndpointFamily::ResourceGraph,
        EndpointFamily::Advisor,
        EndpointFamily::CostQuery,
        EndpointFamily::Budgets,
        EndpointFamily::ResourceLocks,
        EndpointFamily::RoleAssignments,
        EndpointFamily::MonitorAlerts,
        EndpointFamily::MetricAlertRules,
        EndpointFamily::ResourceHealth,
        EndpointFamily::SecureScores,
        EndpointFamily::RegulatoryCompliance,
    ];

    pub const fn api_version(self) -> &'static str {
        match self {
            EndpointFamily::Subscriptions => "2020-01-01",
            EndpointFamily::Metrics => "2018-01-01",
            EndpointFamily::ActivityLog => "2015-04-01",
            EndpointFamily::SecurityAlerts => "2022-01-01",
            EndpointFamily::SecurityAssessments => "2021-06-01",
            EndpointFamily::SecurityPricings => "2018-06-01",
            EndpointFamily::ResourceGraph => "2021-03-01",
            EndpointFamily::Advisor => "2020-01-01",
            EndpointFamily::CostQuery => "2023-03-01",
            EndpointFamily::Budgets => "2023-05-01",
            EndpointFamily::ResourceLocks => "2020-05-01",
            EndpointFamily::RoleAssignments => "2022-04-01",
            EndpointFamily::MonitorAlerts => "2019-05-05-preview",
            EndpointFamily::MetricAlertRules => "2018-03-01",
            EndpointFamily::ResourceHealth => "2020-05-01",
            EndpointFamily::SecureScores => "2020-01-01",
            EndpointFamily::RegulatoryCompliance => "2019-01-01-preview",
        }
    }

    pub const fn required_role(self) -> &'static str {
        match self {
            EndpointFamily::Metrics
            | EndpointFamily::MonitorAlerts
            | EndpointFamily::MetricAlertRules => "Monitoring Reader",
            EndpointFamily::SecurityAlerts
            | EndpointFamily::SecurityAssessments
            | EndpointFamily::SecurityPricings
            | EndpointFamily::SecureScores
            | EndpointFamily::RegulatoryCompliance => "Security Reader",
            EndpointFamily::ResourceGraph => "Reader / Resource Graph Reader",
            EndpointFamily::CostQuery | EndpointFamily::Budgets => "Cost Management Reader",
            EndpointFamily::Subscriptions
            | EndpointFamily::ActivityLog
            | EndpointFamily::Advisor
            | EndpointFamily::ResourceLocks
            | EndpointFamily::RoleAssignments
            | EndpointFamily::ResourceHealth => "Reader",
        }
    }

    /// Resource Graph and Cost Management take a POST query body.
    pub const fn is_query_post(self) -> bool {
        matches!(self, EndpointFamily::ResourceGraph | EndpointFamily::CostQuery)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EndpointFamily::Subscriptions => "subscriptions",
            EndpointFamily::Metrics => "microsoft.insights/metrics",
            EndpointFamily::ActivityLog => "microsoft.insights/eventtypes/management/values",
            EndpointFamily::SecurityAlerts => "Microsoft.Security/alerts",
            EndpointFamily::SecurityAssessments => "Microsoft.Security/assessments",
            EndpointFamily::SecurityPricings => "Microsoft.Security/pricings",
            EndpointFamily::ResourceGraph => "Microsoft.ResourceGraph/resources",
            EndpointFamily::Advisor => "Microsoft.Advisor/recommendations",
            EndpointFamily::CostQuery => "Microsoft.CostManagement/query",
            EndpointFamily::Budgets => "Microsoft.Consumption/budgets",
            EndpointFamily::ResourceLocks => "Microsoft.Authorization/locks",
            EndpointFamily::RoleAssignments => "Microsoft.Authorization/roleAssignments",
            EndpointFamily::MonitorAlerts => "Microsoft.AlertsManagement/alerts",
            EndpointFamily::MetricAlertRules => "Microsoft.Insights/metricAlerts",
            EndpointFamily::ResourceHealth => "Microsoft.ResourceHealth/availabilityStatuses",
            EndpointFamily::SecureScores => "Microsoft.Security/secureScores",
            EndpointFamily::RegulatoryCompliance => "Microsoft.Security/regulatoryComplianceStandards",
        }
    }

    /// Path relative to the management endpoint. Metric paths hang off a
    /// resource ID and are built by [`EndpointFamily::metrics_path`].
    pub fn subscription_path(self, subscription_id: &str) -> String {
        match self {
            EndpointFamily::Subscriptions => "/subscriptions".to_string(),
            EndpointFamily::ResourceGraph => {
                "/providers/Microsoft.ResourceGraph/resources".to_string()
            }
            EndpointFamily::Metrics => {
                format!("/subscriptions/{subscription_id}/providers/Microsoft.Insights/metrics")
            }
            EndpointFamily::ActivityLog => format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Insights/eventtypes/management/values"
            ),
            EndpointFamily::SecurityAlerts => {
                format!("/subscriptions/{subscription_id}/providers/Microsoft.Security/alerts")
            }
            EndpointFamily::SecurityAssessments => format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Security/assessments"
            ),
            EndpointFamily::SecurityPricings => {
                format!("/subscriptions/{subscription_id}/providers/Microsoft.Security/pricings")
            }
            EndpointFamily::Advisor => format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.Advisor/recommendations"
            ),
            EndpointFamily::CostQuery => format!(
                "/subscriptions/{subscription_id}/providers/Microsoft.CostManagement/query"
            ),
            EndpointFamily::Budgets => {
                format!("/subscriptions/{subscription_id}/providers/Microsoft.Consumption/budgets")
            }
            EndpointFamily::ResourceLocks
            | EndpointFamily::RoleAssignments
            | EndpointFamily::MonitorAlerts
            | EndpointFamily::MetricAlertRules
            | EndpointFamily::ResourceHealth
            | EndpointFamily::SecureScores
            | EndpointFamily::RegulatoryCompliance => {
                format!("/subscriptions/{subscription_id}/providers/{}", self.as_str())
            }
        }
    }

    /// `/subscriptions/{id}` itself rather than the subscription listing.
    pub fn subscription_resource_path(subscription_id: &str) -> String {
        format!("/subscriptions/{subscription_id}")
    }

    pub fn metrics_path(resource_id: &str) -> String {
        format!(
            "/{}/providers/Microsoft.Insights/metrics",
            resource_id.trim_matches('/')
        )
    }
}

impl fmt::Display for EndpointFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
