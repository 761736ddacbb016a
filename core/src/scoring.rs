//! Fixed-penalty scoring tables.
//!
//! Each scored entity type has a table of rules pairing a condition with a
//! penalty. [`assess`] subtracts the penalty of every violated rule from the
//! base score, floored at [`SCORE_FLOOR`].

use serde::Serialize;

use crate::azure::{FirewallRow, KeyVaultRow, SecurityRuleProperties};

pub const SCORE_FLOOR: u32 = 0;
pub const PERFECT_SCORE: u32 = 100;
pub const FIREWALL_BASE_SCORE: u32 = 80;

/// Vaults and NSGs scoring below this are reported as critical / at risk.
pub const CRITICAL_SCORE_THRESHOLD: u32 = 70;

pub struct PenaltyRule<T> {
    pub penalty: u32,
    pub violated: fn(&T) -> bool,
    pub issue: &'static str,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub score: u32,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn assess<T>(entity: &T, base: u32, rules: &[PenaltyRule<T>]) -> Assessment {
    let mut penalty = 0u32;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    for rule in rules {
        if (rule.violated)(entity) {
            penalty = penalty.saturating_add(rule.penalty);
            issues.push(rule.issue.to_string());
            recommendations.push(rule.recommendation.to_string());
        }
    }
    Assessment {
        score: base.saturating_sub(penalty).max(SCORE_FLOOR),
        issues,
        recommendations,
    }
}

// ── Key Vault ──────────────────────────────────────────────────

/// A vault that reports no retention period is treated as having none.
pub const MIN_SOFT_DELETE_RETENTION_DAYS: u32 = 30;

pub static KEY_VAULT_RULES: [PenaltyRule<KeyVaultRow>; 4] = [
    PenaltyRule {
        penalty: 25,
        violated: |vault| vault.enable_soft_delete != Some(true),
        issue: "Soft delete not enabled",
        recommendation: "Enable soft delete to protect against accidental deletion",
    },
    PenaltyRule {
        penalty: 20,
        violated: |vault| vault.enable_purge_protection != Some(true),
        issue: "Purge protection not enabled",
        recommendation: "Enable purge protection for additional security",
    },
    PenaltyRule {
        penalty: 20,
        violated: |vault| {
            vault
                .public_network_access
                .as_deref()
                .is_some_and(|access| access.eq_ignore_ascii_case("enabled"))
        },
        issue: "Public network access enabled",
        recommendation: "Consider restricting network access using private endpoints or firewall rules",
    },
    PenaltyRule {
        penalty: 10,
        violated: |vault| {
            vault
                .soft_delete_retention_in_days
                .is_none_or(|days| days < MIN_SOFT_DELETE_RETENTION_DAYS)
        },
        issue: "Short soft delete retention period",
        recommendation: "Consider increasing soft delete retention period to at least 30 days",
    },
];

// ── Azure Firewall ─────────────────────────────────────────────

pub static FIREWALL_RULES: [PenaltyRule<FirewallRow>; 2] = [
    PenaltyRule {
        penalty: 10,
        violated: |firewall| {
            !firewall.threat_intel_mode.as_deref().is_some_and(|mode| {
                mode.eq_ignore_ascii_case("alert") || mode.eq_ignore_ascii_case("deny")
            })
        },
        issue: "Threat intelligence is not in Alert or Deny mode",
        recommendation: "Enable threat intelligence in Alert or Deny mode",
    },
    PenaltyRule {
        penalty: 15,
        violated: |firewall| !has_policy(firewall),
        issue: "No firewall policy attached",
        recommendation: "Attach a firewall policy for centralized rule management",
    },
];

pub fn has_policy(firewall: &FirewallRow) -> bool {
    has_reference(&firewall.firewall_policy)
}

fn has_reference(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Object(map) => map
            .get("id")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|id| !id.trim().is_empty()),
        _ => true,
    }
}

// ── NSG security rules ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    High,
    Medium,
}

impl RiskLevel {
    pub const fn penalty(self) -> u32 {
        match self {
            RiskLevel::High => 20,
            RiskLevel::Medium => 10,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
        }
    }
}

pub const SENSITIVE_PORTS: [u16; 6] = [22, 3389, 1433, 3306, 5432, 27017];

const ANY_SOURCES: [&str; 4] = ["*", "0.0.0.0/0", "internet", "any"];

pub struct RuleCheck {
    pub level: RiskLevel,
    pub applies: fn(&SecurityRuleProperties) -> bool,
    pub issue: &'static str,
    pub recommendation: &'static str,
}

pub static NSG_RULE_CHECKS: [RuleCheck; 3] = [
    RuleCheck {
        level: RiskLevel::High,
        applies: |rule| is_inbound_allow(rule) && allows_any_source(rule),
        issue: "Allows inbound traffic from any source",
        recommendation: "Restrict source IP ranges instead of allowing any source",
    },
    RuleCheck {
        level: RiskLevel::Medium,
        applies: |rule| is_inbound_allow(rule) && port_ranges(rule).any(|range| range == "*"),
        issue: "Allows traffic on all ports",
        recommendation: "Specify explicit destination ports instead of allowing all ports",
    },
    RuleCheck {
        level: RiskLevel::High,
        applies: |rule| {
            is_inbound_allow(rule)
                && allows_any_source(rule)
                && SENSITIVE_PORTS
                    .iter()
                    .any(|port| port_ranges(rule).any(|range| range_covers(range, *port)))
        },
        issue: "Exposes a sensitive management or database port to the internet",
        recommendation: "Use Azure Bastion or a VPN instead of exposing management ports",
    },
];

/// Result of checking one security rule against [`NSG_RULE_CHECKS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRisk {
    pub level: RiskLevel,
    pub issues: Vec<&'static str>,
    pub recommendations: Vec<&'static str>,
}

/// One rule costs one penalty. Several matching checks on the same rule
/// escalate it to `High` instead of stacking.
pub fn classify_rule(rule: &SecurityRuleProperties) -> Option<RuleRisk> {
    let matched: Vec<&RuleCheck> = NSG_RULE_CHECKS
        .iter()
        .filter(|check| (check.applies)(rule))
        .collect();
    if matched.is_empty() {
        return None;
    }
    let level = if matched.len() > 1 || matched.iter().any(|c| c.level == RiskLevel::High) {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };
    Some(RuleRisk {
        level,
        issues: matched.iter().map(|check| check.issue).collect(),
        recommendations: matched.iter().map(|check| check.recommendation).collect(),
    })
}

pub fn nsg_score<'a>(levels: impl IntoIterator<Item = &'a RiskLevel>) -> u32 {
    let penalty = levels
        .into_iter()
        .fold(0u32, |acc, level| acc.saturating_add(level.penalty()));
    PERFECT_SCORE.saturating_sub(penalty).max(SCORE_FLOOR)
}

fn is_inbound_allow(rule: &SecurityRuleProperties) -> bool {
    rule.access.eq_ignore_ascii_case("allow") && rule.direction.eq_ignore_ascii_case("inbound")
}

fn allows_any_source(rule: &SecurityRuleProperties) -> bool {
    std::iter::once(rule.source_address_prefix.as_str())
        .chain(rule.source_address_prefixes.iter().map(String::as_str))
        .map(str::trim)
        .any(|prefix| ANY_SOURCES.iter().any(|any| prefix.eq_ignore_ascii_case(any)))
}

fn port_ranges(rule: &SecurityRuleProperties) -> impl Iterator<Item = &str> {
    std::iter::once(rule.destination_port_range.as_str())
        .chain(rule.destination_port_ranges.iter().map(String::as_str))
        .map(str::trim)
        .filter(|range| !range.is_empty())
}

/// `"*"`, `"22"` or `"20-25"`.
pub fn range_covers(range: &str, port: u16) -> bool {
    let range = range.trim();
    if range == "*" {
        return true;
    }
    match range.split_once('-') {
        Some((low, high)) => match (low.trim().parse::<u16>(), high.trim().parse::<u16>()) {
            (Ok(low), Ok(high)) => (low..=high).contains(&port),
            _ => false,
        },
        None => range.parse::<u16>().is_ok_and(|single| single == port),
    }
}

// ── Recommendation ranking ─────────────────────────────────────

pub fn impact_weight(impact: &str) -> u8 {
    match impact.trim().to_ascii_lowercase().as_str() {
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ssh_from_anywhere() -> SecurityRuleProperties {
        SecurityRuleProperties {
            source_address_prefix: "*".to_string(),
            destination_port_range: "22".to_string(),
            protocol: "Tcp".to_string(),
            access: "Allow".to_string(),
            direction: "Inbound".to_string(),
            priority: Some(100),
            ..SecurityRuleProperties::default()
        }
    }

    fn nsg_score_for(rules: &[SecurityRuleProperties]) -> u32 {
        let levels: Vec<RiskLevel> = rules
            .iter()
            .filter_map(classify_rule)
            .map(|risk| risk.level)
            .collect();
        nsg_score(&levels)
    }

    #[test]
    fn key_vault_with_every_misconfiguration_scores_25() {
        let vault = KeyVaultRow {
            name: "kv-weak".to_string(),
            enable_soft_delete: Some(false),
            enable_purge_protection: Some(false),
            public_network_access: Some("Enabled".to_string()),
            soft_delete_retention_in_days: Some(15),
            ..KeyVaultRow::default()
        };
        let assessment = assess(&vault, PERFECT_SCORE, &KEY_VAULT_RULES);
        assert_eq!(assessment.score, 25);
        assert_eq!(assessment.issues.len(), 4);
    }

    #[test]
    fn hardened_key_vault_scores_100() {
        let vault = KeyVaultRow {
            enable_soft_delete: Some(true),
            enable_purge_protection: Some(true),
            public_network_access: Some("Disabled".to_string()),
            soft_delete_retention_in_days: Some(90),
            ..KeyVaultRow::default()
        };
        let assessment = assess(&vault, PERFECT_SCORE, &KEY_VAULT_RULES);
        assert_eq!(assessment.score, 100);
        assert!(assessment.issues.is_empty());
    }

    #[test]
    fn missing_soft_delete_flag_counts_as_disabled() {
        let vault = KeyVaultRow {
            enable_purge_protection: Some(true),
            soft_delete_retention_in_days: Some(90),
            ..KeyVaultRow::default()
        };
        assert_eq!(assess(&vault, PERFECT_SCORE, &KEY_VAULT_RULES).score, 75);
    }

    #[test]
    fn missing_retention_counts_as_short() {
        let vault = KeyVaultRow {
            name: "kv-legacy".to_string(),
            enable_soft_delete: Some(false),
            enable_purge_protection: Some(false),
            public_network_access: Some("Enabled".to_string()),
            soft_delete_retention_in_days: None,
            ..KeyVaultRow::default()
        };
        let assessment = assess(&vault, PERFECT_SCORE, &KEY_VAULT_RULES);
        assert_eq!(assessment.score, 25);
        assert!(
            assessment
                .issues
                .contains(&"Short soft delete retention period".to_string())
        );
    }

    #[test]
    fn one_exposed_ssh_rule_scores_80() {
        assert_eq!(nsg_score_for(&[ssh_from_anywhere()]), 80);
    }

    #[test]
    fn two_exposed_ssh_rules_score_60() {
        assert_eq!(
            nsg_score_for(&[ssh_from_anywhere(), ssh_from_anywhere()]),
            60
        );
    }

    #[test]
    fn many_violations_floor_at_zero() {
        let rules: Vec<_> = (0..12).map(|_| ssh_from_anywhere()).collect();
        assert_eq!(nsg_score_for(&rules), SCORE_FLOOR);
    }

    #[test]
    fn deny_rules_and_outbound_rules_are_not_risky() {
        let mut deny = ssh_from_anywhere();
        deny.access = "Deny".to_string();
        let mut outbound = ssh_from_anywhere();
        outbound.direction = "Outbound".to_string();
        assert!(classify_rule(&deny).is_none());
        assert!(classify_rule(&outbound).is_none());
    }

    #[test]
    fn any_port_from_restricted_source_is_medium() {
        let rule = SecurityRuleProperties {
            source_address_prefix: "10.0.0.0/8".to_string(),
            destination_port_range: "*".to_string(),
            access: "Allow".to_string(),
            direction: "Inbound".to_string(),
            ..SecurityRuleProperties::default()
        };
        let risk = classify_rule(&rule).unwrap();
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(nsg_score(&[risk.level]), 90);
    }

    #[test]
    fn port_ranges_cover_sensitive_ports() {
        assert!(range_covers("20-25", 22));
        assert!(range_covers("*", 3389));
        assert!(range_covers(" 1433 ", 1433));
        assert!(!range_covers("80", 22));
        assert!(!range_covers("garbage", 22));
    }

    #[test]
    fn firewall_penalties_stack_from_base_80() {
        let bare = FirewallRow::default();
        assert_eq!(assess(&bare, FIREWALL_BASE_SCORE, &FIREWALL_RULES).score, 55);

        let hardened = FirewallRow {
            threat_intel_mode: Some("Deny".to_string()),
            firewall_policy: json!({"id": "/subscriptions/s/policies/p"}),
            ..FirewallRow::default()
        };
        assert_eq!(assess(&hardened, FIREWALL_BASE_SCORE, &FIREWALL_RULES).score, 80);
    }

    #[test]
    fn impact_weights_are_fixed() {
        assert_eq!(impact_weight("High"), 3);
        assert_eq!(impact_weight("medium"), 2);
        assert_eq!(impact_weight("Low"), 1);
        assert_eq!(impact_weight("n/a"), 0);
    }
}
