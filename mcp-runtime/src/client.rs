use std::fmt;
use std::sync::Arc;

use azlens_core::azure::{ArmList, RawResponse, ResourceGraphResponse, lenient_f64};
use azlens_core::{AzureError, EndpointFamily, RuntimeConfig};
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use url::Url;

pub const MAX_LIST_PAGES: usize = 20;
pub const MAX_RESOURCE_GRAPH_PAGES: usize = 10;
pub const RESOURCE_GRAPH_PAGE_SIZE: u32 = 1000;

/// Tokens are treated as expired this long before Azure AD says they are.
const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    expires_in: Option<f64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

const DEFAULT_TOKEN_LIFETIME_SECS: f64 = 3600.0;
/// Upper bound on a reported `expires_in`.
const MAX_TOKEN_LIFETIME_SECS: f64 = 86_400.0;

/// Azure REST client bound to one immutable configuration. Cheap to clone;
/// clones share the connection pool.
#[derive(Clone)]
pub struct AzureClient {
    http: reqwest::Client,
    config: Arc<RuntimeConfig>,
}

impl AzureClient {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            http: client(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// OAuth2 client-credentials exchange against Azure AD. Not retried.
    pub async fn access_token(&self) -> Result<AccessToken, AzureError> {
        let credential = &self.config.credential;
        let scope = self.config.token_scope();
        let response = self
            .http
            .post(self.config.token_url())
            .timeout(self.config.settings.request_timeout)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AzureError::Authentication {
                status: None,
                message: format!("token endpoint unreachable: {e}"),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| AzureError::Authentication {
            status: Some(status),
            message: format!("failed to read token response: {e}"),
        })?;

        if !(200..=299).contains(&status) {
            tracing::warn!(status, tenant = %credential.tenant_id, "token exchange rejected");
            return Err(AzureError::Authentication {
                status: Some(status),
                message: token_error_message(&body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AzureError::Authentication {
                status: Some(status),
                message: format!("token response is not valid JSON: {e}"),
            })?;
        let value = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AzureError::Authentication {
                status: Some(status),
                message: "token response did not contain an access_token".to_string(),
            })?;
        let lifetime = parsed
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .clamp(0.0, MAX_TOKEN_LIFETIME_SECS) as i64;

        tracing::debug!(expires_in = lifetime, "acquired management token");
        Ok(AccessToken {
            value,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        })
    }

    /// Acquires the token that the sibling calls of one tool invocation share.
    pub async fn session(&self) -> Result<Session<'_>, AzureError> {
        let token = self.access_token().await?;
        Ok(Session {
            client: self,
            token,
        })
    }
}

fn token_error_message(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        Ok(TokenErrorResponse {
            error: Some(error), ..
        }) => error,
        _ if body.trim().is_empty() => "empty response from token endpoint".to_string(),
        _ => body.to_string(),
    }
}

/// One tool invocation's view of Azure: the client plus a read-only token.
pub struct Session<'a> {
    client: &'a AzureClient,
    token: AccessToken,
}

impl Session<'_> {
    pub fn config(&self) -> &RuntimeConfig {
        self.client.config()
    }

    pub fn subscription_id(&self) -> &str {
        self.client.config.subscription_id()
    }

    async fn bearer(&self) -> Result<String, AzureError> {
        if self.token.is_expired(Utc::now()) {
            let fresh = self.client.access_token().await?;
            return Ok(fresh.value);
        }
        Ok(self.token.value.clone())
    }

    fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!(
                "{}/{}",
                self.client.config.management_url(),
                target.trim_start_matches('/')
            )
        }
    }

    /// Issues one call. Any HTTP status comes back as a [`RawResponse`];
    /// only transport failures are errors.
    pub async fn call(
        &self,
        method: Method,
        family: EndpointFamily,
        target: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<RawResponse, AzureError> {
        let mut url = Url::parse(&self.resolve_url(target)).map_err(|e| {
            AzureError::Transport {
                family,
                message: format!("invalid request URL '{target}': {e}"),
            }
        })?;
        let has_version = url.query_pairs().any(|(key, _)| key == "api-version");
        {
            let mut pairs = url.query_pairs_mut();
            if !has_version {
                pairs.append_pair("api-version", family.api_version());
            }
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let token = self.bearer().await?;
        let mut request = self
            .client
            .http
            .request(method.clone(), url.clone())
            .timeout(self.client.config.settings.request_timeout)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(family = %family, method = %method, path = url.path(), error = %e, "azure request failed");
            AzureError::Transport {
                family,
                message: e.to_string(),
            }
        })?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| AzureError::Transport {
            family,
            message: format!("failed to read response body: {e}"),
        })?;

        tracing::debug!(family = %family, method = %method, path = url.path(), status, bytes = text.len(), "azure call");
        Ok(RawResponse {
            family,
            url: url.to_string(),
            status,
            body: text,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        family: EndpointFamily,
        target: &str,
        query: &[(&str, String)],
    ) -> Result<T, AzureError> {
        self.call(Method::GET, family, target, query, None)
            .await?
            .json()
    }

    /// GETs an ARM list, following `nextLink` for at most [`MAX_LIST_PAGES`].
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        family: EndpointFamily,
        target: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, AzureError> {
        let mut items = Vec::new();
        let mut page: ArmList<T> = self.get_json(family, target, query).await?;
        for page_number in 1.. {
            items.append(&mut page.value);
            let Some(next) = page.next_link.take().filter(|link| !link.is_empty()) else {
                break;
            };
            if page_number >= MAX_LIST_PAGES {
                tracing::warn!(family = %family, pages = page_number, "nextLink pagination limit reached; results truncated");
                break;
            }
            page = self.get_json(family, &next, &[]).await?;
        }
        Ok(items)
    }

    /// Enabled subscriptions visible to the service principal.
    pub async fn subscriptions(&self) -> Result<Vec<azlens_core::azure::Subscription>, AzureError> {
        let subscriptions: Vec<azlens_core::azure::Subscription> = self
            .list_all(
                EndpointFamily::Subscriptions,
                &EndpointFamily::Subscriptions.subscription_path(""),
                &[],
            )
            .await?;
        Ok(subscriptions
            .into_iter()
            .filter(|sub| !sub.subscription_id.is_empty())
            .filter(|sub| sub.state.is_empty() || sub.state.eq_ignore_ascii_case("enabled"))
            .collect())
    }

    /// Runs a Resource Graph query against the configured subscription,
    /// following `$skipToken` for at most [`MAX_RESOURCE_GRAPH_PAGES`].
    pub async fn resource_graph(&self, query: &str) -> Result<Vec<Map<String, Value>>, AzureError> {
        let family = EndpointFamily::ResourceGraph;
        let path = family.subscription_path(self.subscription_id());
        let mut rows = Vec::new();
        let mut skip_token: Option<String> = None;

        for page_number in 1..=MAX_RESOURCE_GRAPH_PAGES {
            let mut options = json!({
                "resultFormat": "objectArray",
                "$top": RESOURCE_GRAPH_PAGE_SIZE,
            });
            if let Some(token) = &skip_token {
                options["$skipToken"] = Value::String(token.clone());
            }
            let body = json!({
                "subscriptions": [self.subscription_id()],
                "query": query,
                "options": options,
            });
            let page: ResourceGraphResponse = self
                .call(Method::POST, family, &path, &[], Some(&body))
                .await?
                .json()?;
            rows.extend(page.rows());

            skip_token = page.skip_token.filter(|token| !token.is_empty());
            if skip_token.is_none() {
                break;
            }
            if page_number == MAX_RESOURCE_GRAPH_PAGES {
                tracing::warn!(pages = page_number, "Resource Graph pagination limit reached; results truncated");
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::testing::{MockAzure, SUBSCRIPTION};

    #[test]
    fn token_expiry_includes_skew() {
        let now = Utc::now();
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: now + Duration::seconds(30),
        };
        assert!(token.is_expired(now));
        let fresh = AccessToken {
            value: "t".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(!fresh.is_expired(now));
        assert!(!format!("{fresh:?}").contains("\"t\""));
    }

    #[test]
    fn token_errors_prefer_description() {
        assert_eq!(
            token_error_message(r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#),
            "AADSTS7000215: Invalid client secret"
        );
        assert_eq!(token_error_message(r#"{"error":"unauthorized_client"}"#), "unauthorized_client");
        assert_eq!(token_error_message("nope"), "nope");
    }

    #[tokio::test]
    async fn session_sends_bearer_token_and_api_version() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{SUBSCRIPTION}/providers/Microsoft.Security/pricings")))
            .and(query_param("api-version", "2018-06-01"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(1)
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let raw = session
            .call(
                Method::GET,
                EndpointFamily::SecurityPricings,
                &EndpointFamily::SecurityPricings.subscription_path(SUBSCRIPTION),
                &[],
                None,
            )
            .await
            .unwrap();
        assert!(raw.is_success());
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let azure = MockAzure::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let raw = session
            .call(Method::GET, EndpointFamily::Subscriptions, "/subscriptions", &[], None)
            .await
            .unwrap();
        assert_eq!(raw.status, 503);
        assert_eq!(raw.body, "busy");
    }

    #[tokio::test]
    async fn rejected_secret_is_authentication_error() {
        let azure = MockAzure::start_with_token(
            ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })),
        )
        .await;
        let err = azure.client().access_token().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, AzureError::Authentication { status: Some(401), .. }));
        assert!(err.to_string().contains("AADSTS7000215"));
    }

    #[tokio::test]
    async fn expires_in_may_be_a_string() {
        let azure = MockAzure::start_with_token(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "test-token", "expires_in": "3599"})),
        )
        .await;
        let token = azure.client().access_token().await.unwrap();
        assert!(!token.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn huge_expires_in_is_clamped_to_a_day() {
        let azure = MockAzure::start_with_token(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "test-token", "expires_in": 1e300})),
        )
        .await;
        let before = Utc::now();
        let token = azure.client().access_token().await.unwrap();
        assert!(token.expires_at <= Utc::now() + Duration::seconds(86_400));
        assert!(token.expires_at >= before + Duration::seconds(86_399));
    }

    #[tokio::test]
    async fn list_all_follows_next_link() {
        let azure = MockAzure::start().await;
        let next = format!("{}/subscriptions?api-version=2020-01-01&page=2", azure.server.uri());
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"subscriptionId": "s3", "state": "Enabled"}]
            })))
            .mount(&azure.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"subscriptionId": "s1", "state": "Enabled"},
                    {"subscriptionId": "s2", "state": "Disabled"}
                ],
                "nextLink": next
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let subs = session.subscriptions().await.unwrap();
        let ids: Vec<_> = subs.iter().map(|s| s.subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
    }

    #[tokio::test]
    async fn resource_graph_follows_skip_token() {
        let azure = MockAzure::start().await;
        Mock::given(method("POST"))
            .and(path("/providers/Microsoft.ResourceGraph/resources"))
            .and(body_partial_json(json!({"options": {"$skipToken": "page-2"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "/c"}]
            })))
            .mount(&azure.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/providers/Microsoft.ResourceGraph/resources"))
            .and(query_param("api-version", "2021-03-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "/a"}, {"id": "/b"}],
                "$skipToken": "page-2"
            })))
            .mount(&azure.server)
            .await;

        let client = azure.client();
        let session = client.session().await.unwrap();
        let rows = session.resource_graph("Resources | project id").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("id"), Some(&json!("/c")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let azure = MockAzure::start().await;
        let client = azure.client();
        let session = client.session().await.unwrap();
        let err = session
            .call(
                Method::GET,
                EndpointFamily::Advisor,
                "http://127.0.0.1:9/unreachable",
                &[],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport_error");
    }
}
