use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::count_by;
use crate::azure::ResourceRow;

pub const DEFAULT_INVENTORY_QUERY: &str = "Resources
| project id, name, type, resourceGroup, location, subscriptionId, tags, sku";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEntry {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub tags: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub sku: Value,
}

impl ResourceEntry {
    pub fn from_row(row: ResourceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            resource_type: row.resource_type,
            resource_group: row.resource_group,
            location: row.location,
            subscription_id: row.subscription_id,
            tags: row.tags,
            sku: row.sku,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    pub query: String,
    pub total_resources: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_location: BTreeMap<String, usize>,
    pub by_resource_group: BTreeMap<String, usize>,
    pub resources: Vec<ResourceEntry>,
}

/// Custom queries may project other columns. Rows lacking the standard ones
/// still count, grouped under `Unknown`.
pub fn summarize_inventory(query: &str, mut resources: Vec<ResourceEntry>) -> InventoryReport {
    resources.sort_by(|a, b| a.id.to_ascii_lowercase().cmp(&b.id.to_ascii_lowercase()));
    InventoryReport {
        query: query.to_string(),
        total_resources: resources.len(),
        by_type: count_by(resources.iter().map(|r| r.resource_type.to_ascii_lowercase())),
        by_location: count_by(resources.iter().map(|r| r.location.as_str())),
        by_resource_group: count_by(resources.iter().map(|r| r.resource_group.as_str())),
        resources,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn inventory_counts_by_type_and_location() {
        let rows: Vec<ResourceRow> = serde_json::from_value(json!([
            {"id": "/b", "name": "b", "type": "Microsoft.Compute/virtualMachines", "location": "westeurope", "resourceGroup": "rg"},
            {"id": "/a", "name": "a", "type": "microsoft.compute/virtualmachines", "location": "westeurope", "resourceGroup": "rg"},
            {"id": "/c", "name": "c", "type": "Microsoft.Storage/storageAccounts", "location": "northeurope"}
        ]))
        .unwrap();
        let report = summarize_inventory(
            DEFAULT_INVENTORY_QUERY,
            rows.into_iter().map(ResourceEntry::from_row).collect(),
        );
        assert_eq!(report.total_resources, 3);
        assert_eq!(report.resources[0].id, "/a");
        assert_eq!(report.by_type.get("microsoft.compute/virtualmachines"), Some(&2));
        assert_eq!(report.by_location.get("westeurope"), Some(&2));
        assert_eq!(report.by_resource_group.get("Unknown"), Some(&1));
    }
}
