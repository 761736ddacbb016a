//! Subscription metadata, management locks and RBAC role assignments.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use super::{count_by, name_from_id};
use crate::azure::{ResourceLock, RoleAssignment, SubscriptionDetails};

// ── Subscription ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionReport {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
    pub tenant_id: String,
    pub authorization_source: String,
    pub quota_id: String,
    pub spending_limit: String,
    pub location_placement_id: String,
    pub managed_by_tenants: usize,
    pub tags: Value,
}

pub fn summarize_subscription(details: SubscriptionDetails) -> SubscriptionReport {
    let policies = details.subscription_policies;
    SubscriptionReport {
        subscription_id: details.subscription_id,
        display_name: details.display_name,
        state: details.state,
        tenant_id: details.tenant_id,
        authorization_source: details.authorization_source,
        quota_id: policies.quota_id,
        spending_limit: policies.spending_limit,
        location_placement_id: policies.location_placement_id,
        managed_by_tenants: details.managed_by_tenants.len(),
        tags: match details.tags {
            Value::Null => Value::Object(Default::default()),
            tags => tags,
        },
    }
}

// ── Locks ──────────────────────────────────────────────────────

const LOCK_PROVIDER_SEGMENT: &str = "/providers/microsoft.authorization/locks/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Subscription,
    ResourceGroup,
    Resource,
}

impl ScopeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Subscription => "subscription",
            ScopeKind::ResourceGroup => "resource_group",
            ScopeKind::Resource => "resource",
        }
    }

    /// `/subscriptions/s`, `/subscriptions/s/resourceGroups/rg` or anything deeper.
    pub fn of(scope: &str) -> Self {
        match scope.trim_matches('/').split('/').count() {
            0..=2 => ScopeKind::Subscription,
            3 | 4 => ScopeKind::ResourceGroup,
            _ => ScopeKind::Resource,
        }
    }
}

/// Resource group named in an ARM scope, if the scope is inside one.
pub fn resource_group_of(scope: &str) -> Option<&str> {
    let mut segments = scope.trim_matches('/').split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourcegroups") {
            return segments.next().filter(|rg| !rg.is_empty());
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockEntry {
    pub id: String,
    pub name: String,
    pub level: String,
    pub scope: String,
    pub scope_kind: ScopeKind,
    pub notes: Option<String>,
}

impl LockEntry {
    pub fn from_wire(lock: ResourceLock) -> Self {
        let scope = match lock.id.to_ascii_lowercase().find(LOCK_PROVIDER_SEGMENT) {
            Some(index) => lock.id[..index].to_string(),
            None => String::new(),
        };
        Self {
            scope_kind: ScopeKind::of(&scope),
            level: lock.properties.level,
            notes: lock.properties.notes.filter(|notes| !notes.trim().is_empty()),
            name: lock.name,
            id: lock.id,
            scope,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LocksReport {
    pub total_locks: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_scope_kind: BTreeMap<String, usize>,
    pub locked_resource_groups: Vec<String>,
    pub locks: Vec<LockEntry>,
}

/// Ordered by scope, then lock name.
pub fn summarize_locks(mut locks: Vec<LockEntry>) -> LocksReport {
    locks.sort_by(|a, b| {
        a.scope
            .cmp(&b.scope)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    let locked_resource_groups: BTreeSet<String> = locks
        .iter()
        .filter_map(|lock| resource_group_of(&lock.scope))
        .map(str::to_string)
        .collect();

    LocksReport {
        total_locks: locks.len(),
        by_level: count_by(locks.iter().map(|l| l.level.as_str())),
        by_scope_kind: count_by(locks.iter().map(|l| l.scope_kind.as_str())),
        locked_resource_groups: locked_resource_groups.into_iter().collect(),
        locks,
    }
}

// ── Role assignments ───────────────────────────────────────────

/// Built-in role definition GUIDs, which are the same in every tenant.
pub const BUILTIN_ROLES: [(&str, &str); 10] = [
    ("8e3af657-a8ff-443c-a75c-2fe8c4bcb635", "Owner"),
    ("b24988ac-6180-42a0-ab88-20f7382dd24c", "Contributor"),
    ("acdd72a7-3385-48ef-bd42-f606fba81ae7", "Reader"),
    ("18d7d88d-d35e-4fb5-a5c3-7773c20a72d9", "User Access Administrator"),
    ("f58310d9-a9f6-439a-9e8d-f62e7b41a168", "Role Based Access Control Administrator"),
    ("39bc4728-0917-49c7-9d2c-d95423bc2eb4", "Security Reader"),
    ("fb1c8493-542b-48eb-b624-b4c8fea62acd", "Security Admin"),
    ("43d0d8ad-25c7-4714-9337-8ba259a9fe05", "Monitoring Reader"),
    ("72fafb9e-0641-4937-9268-a91bfd8191a3", "Cost Management Reader"),
    ("00482a5a-887f-4fb3-b363-3b7fe8e74483", "Key Vault Administrator"),
];

/// Roles that can change resources or grant access.
pub const PRIVILEGED_ROLES: [&str; 4] = [
    "Owner",
    "Contributor",
    "User Access Administrator",
    "Role Based Access Control Administrator",
];

/// Display name of a built-in role; custom roles keep their GUID.
pub fn role_name(role_definition_id: &str) -> String {
    let guid = name_from_id(role_definition_id);
    BUILTIN_ROLES
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(guid))
        .map_or_else(|| guid.to_string(), |(_, name)| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAssignmentEntry {
    pub id: String,
    pub role_definition_id: String,
    pub role_name: String,
    pub principal_id: String,
    pub principal_type: String,
    pub scope: String,
    pub scope_kind: ScopeKind,
    pub privileged: bool,
    pub conditional: bool,
}

impl RoleAssignmentEntry {
    pub fn from_wire(assignment: RoleAssignment) -> Self {
        let props = assignment.properties;
        let role_name = role_name(&props.role_definition_id);
        Self {
            id: assignment.id,
            privileged: PRIVILEGED_ROLES.contains(&role_name.as_str()),
            conditional: props.condition.is_some_and(|c| !c.trim().is_empty()),
            scope_kind: ScopeKind::of(&props.scope),
            role_definition_id: props.role_definition_id,
            role_name,
            principal_id: props.principal_id,
            principal_type: props.principal_type,
            scope: props.scope,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RbacReport {
    pub total_assignments: usize,
    pub by_role: BTreeMap<String, usize>,
    pub by_principal_type: BTreeMap<String, usize>,
    pub subscription_scope_assignments: usize,
    pub privileged_assignments: Vec<RoleAssignmentEntry>,
    pub recommendations: Vec<String>,
    pub assignments: Vec<RoleAssignmentEntry>,
}

pub fn summarize_rbac(mut assignments: Vec<RoleAssignmentEntry>) -> RbacReport {
    assignments.sort_by(|a, b| {
        a.role_name
            .cmp(&b.role_name)
            .then_with(|| a.scope.cmp(&b.scope))
            .then_with(|| a.principal_id.cmp(&b.principal_id))
            .then_with(|| a.id.cmp(&b.id))
    });
    let privileged: Vec<RoleAssignmentEntry> =
        assignments.iter().filter(|a| a.privileged).cloned().collect();

    let mut recommendations = Vec::new();
    let broad_privileged = privileged
        .iter()
        .filter(|a| a.scope_kind == ScopeKind::Subscription)
        .count();
    if broad_privileged > 0 {
        recommendations.push(format!(
            "Review {broad_privileged} privileged assignment(s) at subscription scope and narrow them to resource groups where possible"
        ));
    }
    let user_privileged = privileged
        .iter()
        .filter(|a| a.principal_type.eq_ignore_ascii_case("user"))
        .count();
    if user_privileged > 0 {
        recommendations.push(format!(
            "Consider Privileged Identity Management for {user_privileged} user(s) holding privileged roles"
        ));
    }

    RbacReport {
        total_assignments: assignments.len(),
        by_role: count_by(assignments.iter().map(|a| a.role_name.as_str())),
        by_principal_type: count_by(assignments.iter().map(|a| a.principal_type.as_str())),
        subscription_scope_assignments: assignments
            .iter()
            .filter(|a| a.scope_kind == ScopeKind::Subscription)
            .count(),
        privileged_assignments: privileged,
        recommendations,
        assignments,
    }
}
