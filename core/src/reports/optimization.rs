//! Cost-optimization views: unused resources, Advisor recommendations and the
//! merged utilization summary.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::monitor::{ActivityReport, PerformanceReport};
use super::{RankedRecommendation, count_by, rank_recommendations, round2};
use crate::azure::{AdvisorRecommendation, ResourceRow};
use crate::scoring::impact_weight;

// ── Unused resources ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnusedCategory {
    StoppedVirtualMachine,
    UnattachedDisk,
    UnassociatedPublicIp,
    OrphanedNetworkInterface,
    Other,
}

impl UnusedCategory {
    pub fn from_type(resource_type: &str) -> Self {
        match resource_type.to_ascii_lowercase().as_str() {
            "microsoft.compute/virtualmachines" => UnusedCategory::StoppedVirtualMachine,
            "microsoft.compute/disks" => UnusedCategory::UnattachedDisk,
            "microsoft.network/publicipaddresses" => UnusedCategory::UnassociatedPublicIp,
            "microsoft.network/networkinterfaces" => UnusedCategory::OrphanedNetworkInterface,
            _ => UnusedCategory::Other,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            UnusedCategory::StoppedVirtualMachine => "stopped_virtual_machine",
            UnusedCategory::UnattachedDisk => "unattached_disk",
            UnusedCategory::UnassociatedPublicIp => "unassociated_public_ip",
            UnusedCategory::OrphanedNetworkInterface => "orphaned_network_interface",
            UnusedCategory::Other => "other",
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            UnusedCategory::StoppedVirtualMachine => "Virtual machine is stopped or deallocated",
            UnusedCategory::UnattachedDisk => "Managed disk is not attached to any VM",
            UnusedCategory::UnassociatedPublicIp => {
                "Public IP address is not associated with any resource"
            }
            UnusedCategory::OrphanedNetworkInterface => {
                "Network interface is not attached to any VM"
            }
            UnusedCategory::Other => "Resource matched the unused-resource query",
        }
    }

    pub const fn recommendation(self) -> &'static str {
        match self {
            UnusedCategory::StoppedVirtualMachine => {
                "Delete the VM if it is no longer needed, or snapshot its disks and remove it"
            }
            UnusedCategory::UnattachedDisk => {
                "Snapshot the disk if the data is needed, then delete it"
            }
            UnusedCategory::UnassociatedPublicIp => "Release the public IP address",
            UnusedCategory::OrphanedNetworkInterface => "Delete the network interface",
            UnusedCategory::Other => "Review whether the resource is still required",
        }
    }
}

/// Resource Graph query behind the unused-resource scan. `resource_group`
/// narrows it to one group.
pub fn unused_resources_query(resource_group: Option<&str>) -> String {
    let scope = resource_group
        .map(|rg| format!("| where resourceGroup =~ '{}'\n", rg.replace('\'', "''")))
        .unwrap_or_default();
    format!(
        "Resources
| where type in~ (
    'Microsoft.Compute/virtualMachines',
    'Microsoft.Network/publicIPAddresses',
    'Microsoft.Compute/disks',
    'Microsoft.Network/networkInterfaces'
)
{scope}| extend resourceDetails = case(
    type =~ 'Microsoft.Compute/virtualMachines',
        pack('powerState', properties.extended.instanceView.powerState.displayStatus, 'vmSize', properties.hardwareProfile.vmSize),
    type =~ 'Microsoft.Network/publicIPAddresses',
        pack('ipAddress', properties.ipAddress, 'associatedResource', properties.ipConfiguration.id),
    type =~ 'Microsoft.Compute/disks',
        pack('diskState', properties.diskState, 'managedBy', managedBy, 'diskSizeGB', properties.diskSizeGB),
    type =~ 'Microsoft.Network/networkInterfaces',
        pack('virtualMachine', properties.virtualMachine.id),
    pack('status', 'unknown')
)
| extend potentiallyUnused = case(
    type =~ 'Microsoft.Compute/virtualMachines' and (tostring(resourceDetails.powerState) contains 'stopped' or tostring(resourceDetails.powerState) contains 'deallocated'), true,
    type =~ 'Microsoft.Network/publicIPAddresses' and isempty(tostring(resourceDetails.associatedResource)), true,
    type =~ 'Microsoft.Compute/disks' and tostring(resourceDetails.diskState) =~ 'Unattached', true,
    type =~ 'Microsoft.Network/networkInterfaces' and isempty(tostring(resourceDetails.virtualMachine)), true,
    false
)
| where potentiallyUnused == true
| project id, name, type, resourceGroup, location, subscriptionId, resourceDetails, tags"
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnusedResource {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub resource_group: String,
    pub location: String,
    pub category: UnusedCategory,
    pub reason: String,
    pub recommendation: String,
    pub details: Value,
}

impl UnusedResource {
    pub fn from_row(row: ResourceRow) -> Self {
        let category = UnusedCategory::from_type(&row.resource_type);
        Self {
            id: row.id,
            name: row.name,
            resource_type: row.resource_type,
            resource_group: row.resource_group,
            location: row.location,
            category,
            reason: category.reason().to_string(),
            recommendation: category.recommendation().to_string(),
            details: row.resource_details,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnusedReport {
    pub total_unused: usize,
    pub by_category: BTreeMap<String, usize>,
    pub resources: Vec<UnusedResource>,
}

pub fn summarize_unused(mut resources: Vec<UnusedResource>) -> UnusedReport {
    resources.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.id.cmp(&b.id)));
    UnusedReport {
        total_unused: resources.len(),
        by_category: count_by(resources.iter().map(|r| r.category.as_str())),
        resources,
    }
}

// ── Advisor ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisorEntry {
    pub id: String,
    pub category: String,
    pub impact: String,
    pub problem: String,
    pub solution: String,
    pub resource_id: String,
    pub impacted_value: String,
    pub savings_amount: Option<f64>,
    pub savings_currency: Option<String>,
}

impl AdvisorEntry {
    pub fn from_wire(recommendation: AdvisorRecommendation) -> Self {
        let props = recommendation.properties;
        let extended = &props.extended_properties;
        let savings_amount = extended
            .get("savingsAmount")
            .and_then(|value| match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
        let savings_currency = extended
            .get("savingsCurrency")
            .and_then(Value::as_str)
            .map(str::to_string);
        let resource_id = if props.resource_metadata.resource_id.is_empty() {
            recommendation
                .id
                .split("/providers/Microsoft.Advisor/")
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            props.resource_metadata.resource_id
        };
        Self {
            id: recommendation.id,
            category: props.category,
            impact: props.impact,
            problem: props.short_description.problem,
            solution: props.short_description.solution,
            resource_id,
            impacted_value: props.impacted_value,
            savings_amount,
            savings_currency,
        }
    }

    pub fn to_ranked(&self) -> RankedRecommendation {
        let title = if self.problem.is_empty() {
            &self.solution
        } else {
            &self.problem
        };
        RankedRecommendation::new(
            "advisor",
            title.clone(),
            self.resource_id.clone(),
            &self.impact,
            self.solution.clone(),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisorReport {
    pub category_filter: Option<String>,
    pub total_recommendations: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_impact: BTreeMap<String, usize>,
    pub estimated_savings: f64,
    pub recommendations: Vec<AdvisorEntry>,
}

/// Highest impact first, then category, problem and resource.
pub fn summarize_advisor(category_filter: Option<&str>, entries: Vec<AdvisorEntry>) -> AdvisorReport {
    let mut recommendations: Vec<AdvisorEntry> = entries
        .into_iter()
        .filter(|entry| category_filter.is_none_or(|c| entry.category.eq_ignore_ascii_case(c)))
        .collect();
    recommendations.sort_by(|a, b| {
        impact_weight(&b.impact)
            .cmp(&impact_weight(&a.impact))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.problem.cmp(&b.problem))
            .then_with(|| a.resource_id.cmp(&b.resource_id))
            .then_with(|| a.id.cmp(&b.id))
    });
    AdvisorReport {
        category_filter: category_filter.map(str::to_string),
        total_recommendations: recommendations.len(),
        by_category: count_by(recommendations.iter().map(|r| r.category.as_str())),
        by_impact: count_by(recommendations.iter().map(|r| r.impact.as_str())),
        estimated_savings: round2(recommendations.iter().filter_map(|r| r.savings_amount).sum()),
        recommendations,
    }
}

// ── Utilization summary ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UtilizationSummary {
    pub potentially_unused: usize,
    pub cost_opportunities: usize,
    pub performance_alerts: usize,
    pub inactive_resources: usize,
    pub estimated_savings: f64,
    pub unused_by_category: BTreeMap<String, usize>,
    pub advisor_by_category: BTreeMap<String, usize>,
    pub recommendations: Vec<RankedRecommendation>,
}

/// Merges whichever sections were fetched. A missing section contributes
/// nothing.
pub fn summarize_utilization(
    unused: Option<&UnusedReport>,
    advisor: Option<&AdvisorReport>,
    activity: Option<&ActivityReport>,
    performance: Option<&PerformanceReport>,
) -> UtilizationSummary {
    let mut recommendations = Vec::new();

    if let Some(unused) = unused {
        recommendations.extend(unused.resources.iter().map(|r| {
            RankedRecommendation::new(
                "unused_resources",
                r.category.reason(),
                r.id.clone(),
                "Medium",
                r.category.recommendation(),
            )
        }));
    }
    if let Some(advisor) = advisor {
        recommendations.extend(advisor.recommendations.iter().map(AdvisorEntry::to_ranked));
    }
    if let Some(performance) = performance {
        for resource in &performance.resources {
            for flag in &resource.flags {
                let (impact, title, action) = match flag.as_str() {
                    "high_cpu" => (
                        "High",
                        "Sustained high CPU utilization",
                        "Scale up or out, or investigate the workload",
                    ),
                    _ => (
                        "Medium",
                        "Very low CPU utilization",
                        "Downsize the VM or consolidate workloads",
                    ),
                };
                recommendations.push(RankedRecommendation::new(
                    "performance",
                    title,
                    resource.resource_id.clone(),
                    impact,
                    action,
                ));
            }
        }
    }

    UtilizationSummary {
        potentially_unused: unused.map_or(0, |u| u.total_unused),
        cost_opportunities: advisor.map_or(0, |a| {
            a.recommendations
                .iter()
                .filter(|r| r.category.eq_ignore_ascii_case("cost"))
                .count()
        }),
        performance_alerts: performance.map_or(0, |p| {
            p.resources.iter().filter(|r| !r.flags.is_empty()).count()
        }),
        inactive_resources: activity.map_or(0, |a| a.inactive_resources.len()),
        estimated_savings: advisor.map_or(0.0, |a| a.estimated_savings),
        unused_by_category: unused.map(|u| u.by_category.clone()).unwrap_or_default(),
        advisor_by_category: advisor.map(|a| a.by_category.clone()).unwrap_or_default(),
        recommendations: rank_recommendations(recommendations),
    }
}
