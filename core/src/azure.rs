//! Typed shapes of the Azure REST responses the tools consume.
//!
//! Every field is defaulted so that partially populated payloads still
//! deserialize. A body that is not JSON at all is reported through
//! [`RawResponse::json`] as a malformed-body error carrying the original text.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoints::EndpointFamily;
use crate::error::AzureError;

/// Status and body of one upstream call, whatever the status was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub family: EndpointFamily,
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Non-2xx becomes an upstream (or permission) error.
    pub fn ensure_success(self) -> Result<Self, AzureError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AzureError::from_status(self.family, self.status, self.body))
        }
    }

    /// Checks the status, then parses the body into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, AzureError> {
        let this = self.ensure_success()?;
        if this.body.trim().is_empty() {
            return Err(AzureError::MalformedBody {
                family: this.family,
                reason: "empty body".to_string(),
                body: this.body,
            });
        }
        serde_json::from_str(&this.body).map_err(|e| AzureError::MalformedBody {
            family: this.family,
            reason: e.to_string(),
            body: this.body,
        })
    }
}

/// Converts one already-parsed JSON entity into its typed shape.
pub fn decode_entity<T: DeserializeOwned>(
    family: EndpointFamily,
    context: impl Into<String>,
    value: Value,
) -> Result<T, AzureError> {
    serde_json::from_value(value).map_err(|e| AzureError::ShapeMismatch {
        family,
        context: context.into(),
        reason: e.to_string(),
    })
}

/// `{ "value": [...], "nextLink": "..." }` list envelope used by ARM.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// `{ "value": "cpu_percent", "localizedValue": "CPU percentage" }`, or a bare
/// string in some older payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalizedName {
    pub value: String,
    pub localized_value: String,
}

impl LocalizedName {
    pub fn display(&self) -> &str {
        if self.localized_value.is_empty() {
            &self.value
        } else {
            &self.localized_value
        }
    }
}

impl<'de> Deserialize<'de> for LocalizedName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Object {
                #[serde(default)]
                value: Option<String>,
                #[serde(rename = "localizedValue", default)]
                localized_value: Option<String>,
            },
            Null,
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(value) => LocalizedName {
                value,
                localized_value: String::new(),
            },
            Repr::Object {
                value,
                localized_value,
            } => LocalizedName {
                value: value.unwrap_or_default(),
                localized_value: localized_value.unwrap_or_default(),
            },
            Repr::Null => LocalizedName::default(),
        })
    }
}

/// Azure sometimes sends numbers as strings (`"3599"`, `"12.50"`).
pub fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got '{s}'"))),
        Some(other) => Err(de::Error::custom(format!("expected a number, got {other}"))),
    }
}

// ── Subscriptions ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
}

impl Subscription {
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            "Unknown"
        } else {
            &self.display_name
        }
    }
}

// ── Security Center ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityAlert {
    pub id: String,
    pub name: String,
    pub properties: SecurityAlertProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAlertProperties {
    pub alert_display_name: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub description: String,
    pub start_time_utc: String,
    pub end_time_utc: String,
    pub compromised_entity: String,
    pub remediation_steps: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityAssessment {
    pub id: String,
    pub name: String,
    pub properties: SecurityAssessmentProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAssessmentProperties {
    pub display_name: String,
    pub status: AssessmentStatus,
    pub metadata: AssessmentMetadata,
    pub resource_details: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssessmentStatus {
    pub code: String,
    pub cause: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentMetadata {
    pub severity: String,
    pub categories: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub id: String,
    pub name: String,
    pub properties: PricingProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingProperties {
    pub pricing_tier: String,
    pub free_trial_remaining_time: String,
    pub sub_plan: String,
}

// ── Resource Graph ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceGraphResponse {
    #[serde(rename = "totalRecords")]
    pub total_records: u64,
    pub count: u64,
    pub data: Value,
    #[serde(rename = "$skipToken")]
    pub skip_token: Option<String>,
}

impl ResourceGraphResponse {
    /// Rows as JSON objects, whether the query returned `objectArray` or
    /// `table` (`columns` + `rows`) format.
    pub fn rows(&self) -> Vec<Map<String, Value>> {
        match &self.data {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = Map::new();
                        map.insert("value".to_string(), other.clone());
                        map
                    }
                })
                .collect(),
            Value::Object(table) => {
                let columns: Vec<String> = table
                    .get("columns")
                    .and_then(Value::as_array)
                    .map(|columns| {
                        columns
                            .iter()
                            .map(|column| {
                                column
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_string()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                table
                    .get("rows")
                    .and_then(Value::as_array)
                    .map(|rows| {
                        rows.iter()
                            .filter_map(Value::as_array)
                            .map(|cells| {
                                columns
                                    .iter()
                                    .cloned()
                                    .zip(cells.iter().cloned())
                                    .collect::<Map<String, Value>>()
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRow {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub resource_details: Value,
    pub tags: Value,
    pub sku: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyVaultRow {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub vault_uri: String,
    pub enable_soft_delete: Option<bool>,
    pub enable_purge_protection: Option<bool>,
    pub public_network_access: Option<String>,
    pub soft_delete_retention_in_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NsgRow {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub rules: Vec<SecurityRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityRule {
    pub name: String,
    pub properties: SecurityRuleProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityRuleProperties {
    pub source_address_prefix: String,
    pub source_address_prefixes: Vec<String>,
    pub destination_port_range: String,
    pub destination_port_ranges: Vec<String>,
    pub protocol: String,
    pub access: String,
    pub direction: String,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallRow {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub firewall_policy: Value,
    pub threat_intel_mode: Option<String>,
    pub sku: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicIpRow {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub subscription_id: String,
    pub ip_address: Option<String>,
    pub associated_resource: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Azure Monitor ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsResponse {
    pub timespan: String,
    pub interval: String,
    pub value: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metric {
    pub name: LocalizedName,
    pub unit: String,
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeSeries {
    pub data: Vec<MetricValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricValue {
    pub time_stamp: String,
    pub average: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub total: Option<f64>,
    pub count: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityEvent {
    pub event_timestamp: String,
    pub operation_name: LocalizedName,
    pub resource_id: String,
    pub resource_group_name: String,
    pub resource_provider_name: LocalizedName,
    pub status: LocalizedName,
    pub caller: String,
}

// ── Advisor ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvisorRecommendation {
    pub id: String,
    pub name: String,
    pub properties: AdvisorProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvisorProperties {
    pub category: String,
    pub impact: String,
    pub impacted_field: String,
    pub impacted_value: String,
    pub short_description: ShortDescription,
    pub resource_metadata: ResourceMetadata,
    pub extended_properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShortDescription {
    pub problem: String,
    pub solution: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetadata {
    pub resource_id: String,
}

// ── Cost Management ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CostQueryResponse {
    pub id: String,
    pub properties: CostQueryProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostQueryProperties {
    pub next_link: Option<String>,
    pub columns: Vec<CostColumn>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CostColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Budget {
    pub id: String,
    pub name: String,
    pub properties: BudgetProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BudgetProperties {
    #[serde(deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
    pub time_grain: String,
    pub category: String,
    pub current_spend: Option<BudgetSpend>,
    pub forecast_spend: Option<BudgetSpend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetSpend {
    #[serde(deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
    pub unit: String,
}

// ── Governance ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionDetails {
    pub id: String,
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
    pub tenant_id: String,
    pub authorization_source: String,
    pub subscription_policies: SubscriptionPolicies,
    pub managed_by_tenants: Vec<Value>,
    pub tags: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionPolicies {
    pub location_placement_id: String,
    pub quota_id: String,
    pub spending_limit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceLock {
    pub id: String,
    pub name: String,
    pub properties: ResourceLockProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceLockProperties {
    pub level: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoleAssignment {
    pub id: String,
    pub name: String,
    pub properties: RoleAssignmentProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleAssignmentProperties {
    pub role_definition_id: String,
    pub principal_id: String,
    pub principal_type: String,
    pub scope: String,
    pub created_on: Option<String>,
    pub condition: Option<String>,
}

// ── Azure Monitor alerting and resource health ─────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorAlert {
    pub id: String,
    pub name: String,
    pub properties: MonitorAlertProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorAlertProperties {
    pub essentials: AlertEssentials,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertEssentials {
    pub severity: String,
    pub signal_type: String,
    pub alert_state: String,
    pub monitor_condition: String,
    pub monitor_service: String,
    pub alert_rule: String,
    pub target_resource: String,
    pub target_resource_name: String,
    pub target_resource_type: String,
    pub target_resource_group: String,
    pub start_date_time: String,
    pub last_modified_date_time: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricAlertRule {
    pub id: String,
    pub name: String,
    pub location: String,
    pub properties: MetricAlertProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricAlertProperties {
    pub description: Option<String>,
    pub severity: Option<u8>,
    pub enabled: bool,
    pub scopes: Vec<String>,
    pub evaluation_frequency: String,
    pub window_size: String,
    pub target_resource_type: Option<String>,
    pub auto_mitigate: Option<bool>,
    pub actions: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AvailabilityStatus {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub properties: AvailabilityStatusProperties,
}

/// `occuredTime` is spelled that way by the Resource Health API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AvailabilityStatusProperties {
    pub availability_state: String,
    pub summary: Option<String>,
    pub reason_type: Option<String>,
    pub occured_time: Option<String>,
    pub reported_time: Option<String>,
}

// ── Secure score and regulatory compliance ─────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecureScore {
    pub id: String,
    pub name: String,
    pub properties: SecureScoreProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecureScoreProperties {
    pub display_name: String,
    pub score: ScoreDetails,
    pub weight: Option<u64>,
}

/// `percentage` is a fraction between 0 and 1.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoreDetails {
    #[serde(deserialize_with = "lenient_f64")]
    pub max: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub current: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ComplianceStandard {
    pub id: String,
    pub name: String,
    pub properties: ComplianceStandardProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplianceStandardProperties {
    pub state: String,
    pub passed_controls: u32,
    pub failed_controls: u32,
    pub skipped_controls: u32,
    pub unsupported_controls: u32,
}
