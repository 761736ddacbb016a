//! Local mock of the Azure AD and ARM endpoints for runtime tests.

use std::path::PathBuf;
use std::time::Duration;

use azlens_core::{Credential, RuntimeConfig, Settings};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::client::AzureClient;

pub(crate) const TENANT: &str = "tenant";
pub(crate) const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";

pub(crate) struct MockAzure {
    pub server: MockServer,
}

impl MockAzure {
    /// Server whose token endpoint always issues `test-token`.
    pub async fn start() -> Self {
        Self::start_with_token(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "test-token"
        })))
        .await
    }

    pub async fn start_with_token(token_response: ResponseTemplate) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT}/oauth2/v2.0/token")))
            .respond_with(token_response)
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn settings(&self, export_dir: PathBuf) -> Settings {
        Settings {
            management_url: self.server.uri(),
            authority_host: self.server.uri(),
            request_timeout: Duration::from_secs(5),
            export_dir,
        }
    }

    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig::new(credential(), self.settings(std::env::temp_dir()))
    }

    pub fn client(&self) -> AzureClient {
        AzureClient::new(self.config())
    }

    pub async fn mount_subscriptions(&self, ids: &[&str]) {
        let value: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "subscriptionId": id,
                    "displayName": format!("Sub {id}"),
                    "state": "Enabled"
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": value })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_resource_graph(&self, rows: Value) {
        Mock::given(method("POST"))
            .and(path("/providers/Microsoft.ResourceGraph/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalRecords": rows.as_array().map_or(0, Vec::len),
                "data": rows
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

pub(crate) fn credential() -> Credential {
    Credential {
        tenant_id: TENANT.to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        subscription_id: SUBSCRIPTION.to_string(),
    }
}

/// Scratch directory unique to one test.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "azlens-test-{name}-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
