//! Subscription metadata, management locks and RBAC.

use azlens_core::azure::SubscriptionDetails;
use azlens_core::reports::governance::{
    LockEntry, LocksReport, RbacReport, RoleAssignmentEntry, SubscriptionReport, summarize_locks,
    summarize_rbac, summarize_subscription,
};
use azlens_core::{Collector, EndpointFamily, Outcome};
use serde_json::Value;

use super::record_entities;
use crate::client::Session;

/// Role assignments granted at the subscription or inherited from above it.
const AT_SCOPE_FILTER: &str = "atScope()";

pub(crate) async fn subscription_details(
    session: &Session<'_>,
) -> Outcome<Option<SubscriptionReport>> {
    let details = session
        .get_json::<SubscriptionDetails>(
            EndpointFamily::Subscriptions,
            &EndpointFamily::subscription_resource_path(session.subscription_id()),
            &[],
        )
        .await;
    let mut collector = Collector::new();
    collector.record(Some("subscription"), details.map(summarize_subscription));
    collector.finish(|mut reports| reports.pop())
}

pub(crate) async fn resource_locks(session: &Session<'_>) -> Outcome<LocksReport> {
    let family = EndpointFamily::ResourceLocks;
    let locks = session
        .list_all::<Value>(family, &family.subscription_path(session.subscription_id()), &[])
        .await;
    let mut collector = Collector::new();
    record_entities(&mut collector, family, "resource locks", locks, LockEntry::from_wire);
    collector.finish(summarize_locks)
}

pub(crate) async fn rbac_assignments(session: &Session<'_>) -> Outcome<RbacReport> {
    let family = EndpointFamily::RoleAssignments;
    let assignments = session
        .list_all::<Value>(
            family,
            &family.subscription_path(session.subscription_id()),
            &[("$filter", AT_SCOPE_FILTER.to_string())],
        )
        .await;
    let mut collector = Collector::new();
    record_entities(
        &mut collector,
        family,
        "role assignments",
        assignments,
        RoleAssignmentEntry::from_wire,
    );
    collector.finish(summarize_rbac)
}

#[cfg(test)]
mod tests {
    use azlens_core::ToolStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::{MockAzure, SUBSCRIPTION};

    #[tokio::test]
    async fn subscription_details_are_flattened() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{SUBSCRIPTION}")))
            .and(query_param("api-version", "2020-01-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("/subscriptions/{SUBSCRIPTION}"),
                "subscriptionId": SUBSCRIPTION,
                "displayName": "Production",
                "state": "Enabled",
                "tenantId": "tenant",
                "authorizationSource": "RoleBased",
                "subscriptionPolicies": {
                    "locationPlacementId": "Public_2014-09-01",
                    "quotaId": "EnterpriseAgreement_2014-09-01",
                    "spendingLimit": "Off"
                },
                "tags": {"env": "prod"}
            })))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = subscription_details(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["display_name"], "Production");
        assert_eq!(result.data["quota_id"], "EnterpriseAgreement_2014-09-01");
        assert_eq!(result.data["tags"]["env"], "prod");
    }

    #[tokio::test]
    async fn missing_subscription_is_an_error() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{SUBSCRIPTION}")))
            .respond_with(ResponseTemplate::new(404).set_body_string("SubscriptionNotFound"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = subscription_details(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.data, json!({}));
        assert!(result.errors[0].starts_with("subscription: "));
        assert!(result.errors[0].contains("SubscriptionNotFound"));
    }

    #[tokio::test]
    async fn locks_are_grouped_by_level() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Authorization/locks"
            )))
            .and(query_param("api-version", "2020-05-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"id": "/subscriptions/s/resourceGroups/prod/providers/Microsoft.Authorization/locks/keep",
                     "name": "keep", "properties": {"level": "CanNotDelete", "notes": "do not remove"}},
                    {"id": "/subscriptions/s/providers/Microsoft.Authorization/locks/frozen",
                     "name": "frozen", "properties": {"level": "ReadOnly"}}
                ]
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = resource_locks(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["total_locks"], 2);
        assert_eq!(result.data["by_level"], json!({"CanNotDelete": 1, "ReadOnly": 1}));
        assert_eq!(result.data["locked_resource_groups"], json!(["prod"]));
    }

    #[tokio::test]
    async fn role_assignments_use_at_scope_filter() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Authorization/roleAssignments"
            )))
            .and(query_param("$filter", "atScope()"))
            .and(query_param("api-version", "2022-04-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "/subscriptions/s/providers/Microsoft.Authorization/roleAssignments/a1",
                    "name": "a1",
                    "properties": {
                        "roleDefinitionId": "/subscriptions/s/providers/Microsoft.Authorization/roleDefinitions/8e3af657-a8ff-443c-a75c-2fe8c4bcb635",
                        "principalId": "p1",
                        "principalType": "User",
                        "scope": "/subscriptions/s"
                    }
                }]
            })))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = rbac_assignments(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.data["by_role"], json!({"Owner": 1}));
        assert_eq!(result.data["privileged_assignments"][0]["principal_id"], "p1");
    }

    #[tokio::test]
    async fn missing_reader_role_is_named_for_locks() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Authorization/locks"
            )))
            .respond_with(ResponseTemplate::new(403).set_body_string("AuthorizationFailed"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = resource_locks(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.errors[0].contains("'Reader'"));
    }
}
