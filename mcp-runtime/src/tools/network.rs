use azlens_core::reports::network::{
    FirewallAssessment, NetworkReport, NsgAssessment, PublicIpEntry, summarize_network,
};
use azlens_core::{Collector, Outcome};

use super::record_rows;
use crate::client::Session;

const NSG_QUERY: &str = "Resources
| where type =~ 'microsoft.network/networksecuritygroups'
| project id, name, resourceGroup, location, subscriptionId, rules = properties.securityRules";

const FIREWALL_QUERY: &str = "Resources
| where type =~ 'microsoft.network/azurefirewalls'
| project id, name, resourceGroup, location, subscriptionId,
    firewallPolicy = properties.firewallPolicy,
    threatIntelMode = tostring(properties.threatIntelMode),
    sku = properties.sku";

const PUBLIC_IP_QUERY: &str = "Resources
| where type =~ 'microsoft.network/publicipaddresses'
| project id, name, resourceGroup, location, subscriptionId,
    ipAddress = tostring(properties.ipAddress),
    associatedResource = tostring(properties.ipConfiguration.id)";

/// Three independent Resource Graph queries; any one of them may fail
/// without discarding the other two.
pub(crate) async fn network_security(session: &Session<'_>) -> Outcome<NetworkReport> {
    let (nsg_rows, firewall_rows, ip_rows) = tokio::join!(
        session.resource_graph(NSG_QUERY),
        session.resource_graph(FIREWALL_QUERY),
        session.resource_graph(PUBLIC_IP_QUERY),
    );

    let mut groups = Collector::new();
    record_rows(&mut groups, "network security group query", nsg_rows, NsgAssessment::from_row);
    let mut firewalls = Collector::new();
    record_rows(&mut firewalls, "firewall query", firewall_rows, FirewallAssessment::from_row);
    let mut public_ips = Collector::new();
    record_rows(&mut public_ips, "public IP query", ip_rows, PublicIpEntry::from_row);

    let groups = groups.finish(|items| items);
    let firewalls = firewalls.finish(|items| items);
    let public_ips = public_ips.finish(|items| items);
    Outcome {
        errors: [groups.errors, firewalls.errors, public_ips.errors].concat(),
        succeeded: groups.succeeded + firewalls.succeeded + public_ips.succeeded,
        failed: groups.failed + firewalls.failed + public_ips.failed,
        report: summarize_network(groups.report, firewalls.report, public_ips.report),
    }
}

#[cfg(test)]
mod tests {
    use azlens_core::ToolStatus;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::MockAzure;

    const GRAPH_PATH: &str = "/providers/Microsoft.ResourceGraph/resources";

    fn ssh_rule(name: &str, priority: u32) -> serde_json::Value {
        json!({
            "name": name,
            "properties": {
                "sourceAddressPrefix": "*",
                "destinationPortRange": "22",
                "protocol": "Tcp",
                "access": "Allow",
                "direction": "Inbound",
                "priority": priority
            }
        })
    }

    async fn mount_query(azure: &MockAzure, marker: &str, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(GRAPH_PATH))
            .and(body_string_contains(marker))
            .respond_with(template)
            .mount(&azure.server)
            .await;
    }

    #[tokio::test]
    async fn nsg_scores_follow_rule_risk() {
        let azure = MockAzure::start().await;
        mount_query(
            &azure,
            "networksecuritygroups",
            ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"id": "/nsg/one", "name": "one", "rules": [ssh_rule("ssh", 100)]},
                {"id": "/nsg/two", "name": "two", "rules": [ssh_rule("ssh-a", 100), ssh_rule("ssh-b", 110)]},
                {"id": "/nsg/none", "name": "none", "rules": null}
            ]})),
        )
        .await;
        mount_query(
            &azure,
            "azurefirewalls",
            ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"id": "/fw/1", "name": "fw", "threatIntelMode": "Off"}
            ]})),
        )
        .await;
        mount_query(
            &azure,
            "publicipaddresses",
            ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"id": "/ip/1", "name": "ip1", "ipAddress": "20.1.2.3", "associatedResource": ""}
            ]})),
        )
        .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = network_security(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Success);

        let groups = result.data["nsg_analysis"]["groups"].as_array().unwrap().clone();
        let score_of = |name: &str| {
            groups
                .iter()
                .find(|g| g["name"] == name)
                .map(|g| g["security_score"].clone())
                .unwrap()
        };
        assert_eq!(score_of("one"), 80);
        assert_eq!(score_of("two"), 60);
        assert_eq!(score_of("none"), 100);
        assert_eq!(result.data["firewall_analysis"]["firewalls"][0]["security_score"], 55);
        assert_eq!(result.data["public_ip_exposure"]["unassociated_count"], 1);
        assert_eq!(result.data["security_risks"][0]["name"], "two");
    }

    #[tokio::test]
    async fn failed_query_leaves_the_others() {
        let azure = MockAzure::start().await;
        mount_query(
            &azure,
            "networksecuritygroups",
            ResponseTemplate::new(200).set_body_json(json!({"data": []})),
        )
        .await;
        mount_query(
            &azure,
            "azurefirewalls",
            ResponseTemplate::new(400).set_body_string("BadRequest: invalid query"),
        )
        .await;
        mount_query(
            &azure,
            "publicipaddresses",
            ResponseTemplate::new(200).set_body_json(json!({"data": []})),
        )
        .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let result = network_security(&session).await.into_tool_result();
        assert_eq!(result.status, ToolStatus::Partial);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("firewall query: "));
        assert_eq!(result.data["nsg_analysis"]["total_nsgs"], 0);
    }
}
