use serde::Serialize;

use super::{CountEntry, average, round2, top_counts};
use crate::azure::KeyVaultRow;
use crate::scoring::{CRITICAL_SCORE_THRESHOLD, KEY_VAULT_RULES, PERFECT_SCORE, assess};

const TOP_RECOMMENDATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaultAssessment {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub vault_uri: String,
    pub soft_delete_enabled: bool,
    pub purge_protection_enabled: bool,
    pub public_network_access: String,
    pub soft_delete_retention_days: Option<u32>,
    pub security_score: u32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl VaultAssessment {
    pub fn from_row(row: KeyVaultRow) -> Self {
        let assessment = assess(&row, PERFECT_SCORE, &KEY_VAULT_RULES);
        Self {
            soft_delete_enabled: row.enable_soft_delete == Some(true),
            purge_protection_enabled: row.enable_purge_protection == Some(true),
            public_network_access: row
                .public_network_access
                .unwrap_or_else(|| "Unknown".to_string()),
            soft_delete_retention_days: row.soft_delete_retention_in_days,
            id: row.id,
            name: row.name,
            resource_group: row.resource_group,
            location: row.location,
            subscription_id: row.subscription_id,
            vault_uri: row.vault_uri,
            security_score: assessment.score,
            issues: assessment.issues,
            recommendations: assessment.recommendations,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyVaultReport {
    pub total_vaults: usize,
    pub average_security_score: f64,
    pub critical_vaults: Vec<String>,
    pub common_issues: Vec<CountEntry>,
    pub top_recommendations: Vec<CountEntry>,
    pub vaults: Vec<VaultAssessment>,
}

/// Lowest score first, ties by name then ID.
pub fn summarize_key_vaults(mut vaults: Vec<VaultAssessment>) -> KeyVaultReport {
    vaults.sort_by(|a, b| {
        a.security_score
            .cmp(&b.security_score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });

    KeyVaultReport {
        total_vaults: vaults.len(),
        average_security_score: average(vaults.iter().map(|v| f64::from(v.security_score)))
            .map(round2)
            .unwrap_or(0.0),
        critical_vaults: vaults
            .iter()
            .filter(|v| v.security_score < CRITICAL_SCORE_THRESHOLD)
            .map(|v| v.name.clone())
            .collect(),
        common_issues: top_counts(vaults.iter().flat_map(|v| v.issues.iter()), usize::MAX),
        top_recommendations: top_counts(
            vaults.iter().flat_map(|v| v.recommendations.iter()),
            TOP_RECOMMENDATIONS,
        ),
        vaults,
    }
}
