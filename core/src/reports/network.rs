//! NSG rule risk, Azure Firewall posture and public IP exposure.

use serde::Serialize;

use super::{CountEntry, average, round2, top_counts};
use crate::azure::{FirewallRow, NsgRow, PublicIpRow};
use crate::scoring::{
    CRITICAL_SCORE_THRESHOLD, FIREWALL_BASE_SCORE, FIREWALL_RULES, RiskLevel, assess,
    classify_rule, has_policy, nsg_score,
};

const TOP_RECOMMENDATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskyRule {
    pub name: String,
    pub risk_level: RiskLevel,
    pub priority: Option<u32>,
    pub source: String,
    pub destination_ports: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NsgAssessment {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub total_rules: usize,
    pub security_score: u32,
    pub risky_rules: Vec<RiskyRule>,
    pub recommendations: Vec<String>,
}

impl NsgAssessment {
    pub fn from_row(row: NsgRow) -> Self {
        let mut risky_rules = Vec::new();
        let mut recommendations = Vec::new();
        for rule in &row.rules {
            let Some(risk) = classify_rule(&rule.properties) else {
                continue;
            };
            let props = &rule.properties;
            let mut ports = vec![props.destination_port_range.clone()];
            ports.extend(props.destination_port_ranges.iter().cloned());
            let mut sources = vec![props.source_address_prefix.clone()];
            sources.extend(props.source_address_prefixes.iter().cloned());
            for recommendation in &risk.recommendations {
                if !recommendations.iter().any(|r| r == recommendation) {
                    recommendations.push((*recommendation).to_string());
                }
            }
            risky_rules.push(RiskyRule {
                name: rule.name.clone(),
                risk_level: risk.level,
                priority: props.priority,
                source: join_non_empty(&sources),
                destination_ports: join_non_empty(&ports),
                issues: risk.issues.iter().map(|issue| issue.to_string()).collect(),
            });
        }
        risky_rules.sort_by(|a, b| {
            a.risk_level
                .cmp(&b.risk_level)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.name.cmp(&b.name))
        });
        recommendations.sort();

        Self {
            security_score: nsg_score(risky_rules.iter().map(|r| &r.risk_level)),
            total_rules: row.rules.len(),
            id: row.id,
            name: row.name,
            resource_group: row.resource_group,
            location: row.location,
            subscription_id: row.subscription_id,
            risky_rules,
            recommendations,
        }
    }
}

fn join_non_empty(values: &[String]) -> String {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirewallAssessment {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub threat_intel_mode: String,
    pub has_policy: bool,
    pub security_score: u32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl FirewallAssessment {
    pub fn from_row(row: FirewallRow) -> Self {
        let assessment = assess(&row, FIREWALL_BASE_SCORE, &FIREWALL_RULES);
        let has_policy = has_policy(&row);
        Self {
            id: row.id,
            name: row.name,
            resource_group: row.resource_group,
            location: row.location,
            subscription_id: row.subscription_id,
            threat_intel_mode: row.threat_intel_mode.unwrap_or_else(|| "Off".to_string()),
            has_policy,
            security_score: assessment.score,
            issues: assessment.issues,
            recommendations: assessment.recommendations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicIpEntry {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub ip_address: String,
    pub associated_resource: Option<String>,
}

impl PublicIpEntry {
    pub fn from_row(row: PublicIpRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            resource_group: row.resource_group,
            location: row.location,
            ip_address: row.ip_address.unwrap_or_default(),
            associated_resource: row.associated_resource.filter(|id| !id.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NsgSection {
    pub total_nsgs: usize,
    pub average_security_score: f64,
    pub high_risk_rules: usize,
    pub medium_risk_rules: usize,
    pub groups: Vec<NsgAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirewallSection {
    pub total_firewalls: usize,
    pub firewalls: Vec<FirewallAssessment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicIpSection {
    pub total_public_ips: usize,
    pub unassociated_count: usize,
    pub unassociated: Vec<PublicIpEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityRisk {
    pub resource_id: String,
    pub name: String,
    pub security_score: u32,
    pub high_risk_rules: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub nsg_analysis: NsgSection,
    pub firewall_analysis: FirewallSection,
    pub public_ip_exposure: PublicIpSection,
    pub security_risks: Vec<SecurityRisk>,
    pub top_recommendations: Vec<CountEntry>,
}

pub fn summarize_network(
    mut groups: Vec<NsgAssessment>,
    mut firewalls: Vec<FirewallAssessment>,
    mut public_ips: Vec<PublicIpEntry>,
) -> NetworkReport {
    groups.sort_by(|a, b| {
        a.security_score
            .cmp(&b.security_score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    firewalls.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    public_ips.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let rules_at = |level: RiskLevel| {
        groups
            .iter()
            .flat_map(|g| g.risky_rules.iter())
            .filter(|r| r.risk_level == level)
            .count()
    };
    let security_risks = groups
        .iter()
        .filter(|g| g.security_score < CRITICAL_SCORE_THRESHOLD)
        .map(|g| SecurityRisk {
            resource_id: g.id.clone(),
            name: g.name.clone(),
            security_score: g.security_score,
            high_risk_rules: g
                .risky_rules
                .iter()
                .filter(|r| r.risk_level == RiskLevel::High)
                .count(),
        })
        .collect();
    let top_recommendations = top_counts(
        groups
            .iter()
            .flat_map(|g| g.recommendations.iter())
            .chain(firewalls.iter().flat_map(|f| f.recommendations.iter())),
        TOP_RECOMMENDATIONS,
    );
    let unassociated: Vec<PublicIpEntry> = public_ips
        .iter()
        .filter(|ip| ip.associated_resource.is_none())
        .cloned()
        .collect();

    NetworkReport {
        nsg_analysis: NsgSection {
            total_nsgs: groups.len(),
            average_security_score: average(groups.iter().map(|g| f64::from(g.security_score)))
                .map(round2)
                .unwrap_or(0.0),
            high_risk_rules: rules_at(RiskLevel::High),
            medium_risk_rules: rules_at(RiskLevel::Medium),
            groups,
        },
        firewall_analysis: FirewallSection {
            total_firewalls: firewalls.len(),
            firewalls,
        },
        public_ip_exposure: PublicIpSection {
            total_public_ips: public_ips.len(),
            unassociated_count: unassociated.len(),
            unassociated,
        },
        security_risks,
        top_recommendations,
    }
}
