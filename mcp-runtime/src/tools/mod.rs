//! Tool surface: definitions, argument validation and dispatch.
//!
//! Arguments are validated completely before any network I/O. A tool call
//! then acquires one token, runs its fetch-and-normalize pipeline and returns
//! the `{status, data, errors}` envelope.

use std::time::Instant;

use azlens_core::azure::decode_entity;
use azlens_core::error::codes;
use azlens_core::reports::billing::{CostQuery, Granularity, Timeframe};
use azlens_core::reports::inventory::DEFAULT_INVENTORY_QUERY;
use azlens_core::reports::monitor::MetricProfile;
use azlens_core::{AzureError, Collector, EndpointFamily, ToolResult};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::client::{AzureClient, Session};
use crate::export;

pub mod billing;
pub mod governance;
pub mod monitoring;
pub mod network;
pub mod optimization;
pub mod performance;
pub mod security;

pub use performance::MetricsRequest;

pub const DEFAULT_HOURS_BACK: u32 = 168;
/// Activity log retention.
pub const MAX_HOURS_BACK: u64 = 2160;
pub const DEFAULT_MAX_RESOURCES: usize = 10;
pub const MAX_RESOURCES_LIMIT: u64 = 50;

pub const ADVISOR_CATEGORIES: [&str; 5] = [
    "Cost",
    "Security",
    "Performance",
    "HighAvailability",
    "OperationalExcellence",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Optimization,
    Performance,
    Security,
    Resources,
    Billing,
    Monitoring,
    Governance,
}

impl ToolCategory {
    /// Export subdirectory.
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolCategory::Optimization => "optimization",
            ToolCategory::Performance => "performance",
            ToolCategory::Security => "security",
            ToolCategory::Resources => "resources",
            ToolCategory::Billing => "billing",
            ToolCategory::Monitoring => "monitoring",
            ToolCategory::Governance => "governance",
        }
    }
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub category: ToolCategory,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// True when every argument is optional, i.e. the tool can run with `{}`.
    pub fn is_parameterless(&self) -> bool {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .is_none_or(|required| required.is_empty())
    }

    fn accepts(&self, key: &str) -> bool {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|properties| properties.contains_key(key))
    }
}

fn schema(mut properties: Map<String, Value>) -> Value {
    properties.insert(
        "export".to_string(),
        json!({
            "type": "boolean",
            "default": false,
            "description": "Also write the result to <export_dir>/<category>/<tool>.json"
        }),
    );
    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    })
}

fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn metrics_schema(id_field: &str, id_description: &str, default_timespan: &str) -> Value {
    let mut properties = props(json!({
        "timespan": {
            "type": "string",
            "default": default_timespan,
            "description": "ISO 8601 duration, e.g. PT1H, PT24H, P7D"
        },
        "resource_group": { "type": "string" },
        "max_resources": {
            "type": "integer",
            "minimum": 1,
            "maximum": MAX_RESOURCES_LIMIT,
            "default": DEFAULT_MAX_RESOURCES
        }
    }));
    properties.insert(
        id_field.to_string(),
        json!({ "type": "string", "description": id_description }),
    );
    schema(properties)
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_unused_resources",
            category: ToolCategory::Optimization,
            description: "Find stopped VMs, unattached disks, unassociated public IPs and orphaned NICs.",
            input_schema: schema(props(json!({
                "resource_group": { "type": "string", "description": "Limit the scan to one resource group" }
            }))),
        },
        ToolDefinition {
            name: "get_resource_utilization_summary",
            category: ToolCategory::Optimization,
            description: "Merged view of unused resources, Advisor recommendations, activity and VM CPU over the last 24h.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_vm_performance_metrics",
            category: ToolCategory::Performance,
            description: "CPU, memory, disk and network metrics for running VMs, flagging high and low CPU.",
            input_schema: metrics_schema(
                "vm_resource_id",
                "Full resource ID of a single VM",
                MetricProfile::VirtualMachine.default_timespan(),
            ),
        },
        ToolDefinition {
            name: "get_storage_performance_metrics",
            category: ToolCategory::Performance,
            description: "Transactions, capacity, availability and latency for storage accounts.",
            input_schema: metrics_schema(
                "storage_account_id",
                "Full resource ID of a single storage account",
                MetricProfile::Storage.default_timespan(),
            ),
        },
        ToolDefinition {
            name: "get_database_performance_metrics",
            category: ToolCategory::Performance,
            description: "CPU, DTU, connection and storage metrics for SQL databases.",
            input_schema: metrics_schema(
                "database_id",
                "Full resource ID of a single SQL database",
                MetricProfile::Database.default_timespan(),
            ),
        },
        ToolDefinition {
            name: "get_activity_log_analysis",
            category: ToolCategory::Optimization,
            description: "Activity log events grouped per resource, with callers and low-activity resources.",
            input_schema: schema(props(json!({
                "hours_back": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_HOURS_BACK,
                    "default": DEFAULT_HOURS_BACK
                }
            }))),
        },
        ToolDefinition {
            name: "get_azure_advisor_detailed",
            category: ToolCategory::Optimization,
            description: "Azure Advisor recommendations ranked by impact, with estimated savings.",
            input_schema: schema(props(json!({
                "category": { "type": "string", "enum": ADVISOR_CATEGORIES }
            }))),
        },
        ToolDefinition {
            name: "get_security_center_alerts",
            category: ToolCategory::Security,
            description: "Defender for Cloud alerts across subscriptions, by severity and status.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_security_assessments",
            category: ToolCategory::Security,
            description: "Security assessments across subscriptions with failed and critical findings.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_defender_for_cloud_status",
            category: ToolCategory::Security,
            description: "Defender plan coverage per subscription and per service.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_key_vault_security_status",
            category: ToolCategory::Security,
            description: "Score Key Vaults on soft delete, purge protection, network exposure and retention.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_network_security_analysis",
            category: ToolCategory::Security,
            description: "Risky NSG rules, firewall posture and unassociated public IPs.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_secure_score_and_compliance",
            category: ToolCategory::Security,
            description: "Defender secure score and regulatory compliance standards with failing controls.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_alerts_overview",
            category: ToolCategory::Monitoring,
            description: "Open Azure Monitor alerts (New or Acknowledged), most severe first.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_alert_rules",
            category: ToolCategory::Monitoring,
            description: "Metric alert rules, flagging disabled rules and rules without action groups.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_resource_health_status",
            category: ToolCategory::Monitoring,
            description: "Resource Health availability across the subscription, listing resources that are not Available.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_resource_locks",
            category: ToolCategory::Governance,
            description: "Management locks by level and scope, with the locked resource groups.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_rbac_assignments",
            category: ToolCategory::Governance,
            description: "Role assignments at subscription scope, highlighting privileged roles.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_all_resources",
            category: ToolCategory::Resources,
            description: "Resource inventory via Resource Graph; accepts a custom KQL query.",
            input_schema: schema(props(json!({
                "query": { "type": "string", "description": "Resource Graph (KQL) query" }
            }))),
        },
        ToolDefinition {
            name: "get_cost_analysis",
            category: ToolCategory::Billing,
            description: "Actual cost for a timeframe, optionally grouped by a dimension.",
            input_schema: schema(props(json!({
                "timeframe": {
                    "type": "string",
                    "enum": Timeframe::ALL.map(Timeframe::as_str),
                    "default": "MonthToDate"
                },
                "granularity": {
                    "type": "string",
                    "enum": ["Daily", "Monthly", "None"],
                    "default": "Daily"
                },
                "group_by": { "type": "string", "description": "Dimension, e.g. ResourceGroup or ServiceName" },
                "start_date": { "type": "string", "format": "date", "description": "Custom timeframe start (YYYY-MM-DD)" },
                "end_date": { "type": "string", "format": "date", "description": "Custom timeframe end (YYYY-MM-DD)" }
            }))),
        },
        ToolDefinition {
            name: "get_budgets",
            category: ToolCategory::Billing,
            description: "Consumption budgets with current spend and utilization.",
            input_schema: schema(Map::new()),
        },
        ToolDefinition {
            name: "get_subscription_details",
            category: ToolCategory::Billing,
            description: "State, offer (quota ID), spending limit and tags of the configured subscription.",
            input_schema: schema(Map::new()),
        },
    ]
}

pub fn find_tool(name: &str) -> Option<ToolDefinition> {
    tool_definitions().into_iter().find(|tool| tool.name == name)
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        payload
    }

    /// The rejection as an envelope, with the machine code attached.
    pub fn to_envelope(&self) -> Value {
        let mut envelope = ToolResult::failed(vec![format!("{}: {}", self.code, self.message)]).to_value();
        envelope["error"] = self.to_value();
        envelope
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ToolError {
    ToolError::new(codes::VALIDATION_FAILED, message).with_field(key)
}

pub(crate) fn arg_bool(args: &Map<String, Value>, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(v)) => Ok(*v),
        Some(_) => Err(invalid(key, format!("'{key}' must be a boolean"))),
    }
}

pub(crate) fn arg_string(args: &Map<String, Value>, key: &str, default: &str) -> Result<String, ToolError> {
    Ok(arg_optional_string(args, key)?.unwrap_or_else(|| default.to_string()))
}

pub(crate) fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(invalid(key, format!("'{key}' must be a string"))),
    }
}

pub(crate) fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| invalid(key, format!("'{key}' must be an unsigned integer")))
            .map(Some),
        Some(_) => Err(invalid(key, format!("'{key}' must be an unsigned integer"))),
    }
}

fn arg_bounded_u64(
    args: &Map<String, Value>,
    key: &str,
    min: u64,
    max: u64,
    default: u64,
) -> Result<u64, ToolError> {
    let value = arg_optional_u64(args, key)?.unwrap_or(default);
    if !(min..=max).contains(&value) {
        return Err(invalid(key, format!("'{key}' must be between {min} and {max}")));
    }
    Ok(value)
}

fn arg_optional_date(args: &Map<String, Value>, key: &str) -> Result<Option<NaiveDate>, ToolError> {
    arg_optional_string(args, key)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|_| invalid(key, format!("'{key}' must be a date in YYYY-MM-DD format")))
        })
        .transpose()
}

/// `PT1H`, `PT30M`, `P7D`, `P1DT12H` and the like.
pub(crate) fn is_iso_duration(value: &str) -> bool {
    let Some(rest) = value.strip_prefix('P') else {
        return false;
    };
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };
    let valid_part = |part: &str, units: &str| {
        let mut digits = 0;
        for c in part.chars() {
            if c.is_ascii_digit() {
                digits += 1;
            } else if units.contains(c) && digits > 0 {
                digits = 0;
            } else {
                return false;
            }
        }
        digits == 0
    };
    let date_ok = valid_part(date_part, "YMWD");
    let time_ok = time_part.is_none_or(|time| !time.is_empty() && valid_part(time, "HMS"));
    date_ok && time_ok && !(date_part.is_empty() && time_part.is_none())
}

// ── Parsed invocations ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    UnusedResources { resource_group: Option<String> },
    UtilizationSummary,
    Performance(MetricsRequest),
    ActivityLog { hours_back: u32 },
    Advisor { category: Option<String> },
    SecurityAlerts,
    SecurityAssessments,
    DefenderStatus,
    KeyVaultSecurity,
    NetworkSecurity,
    SecureScore,
    AlertsOverview,
    AlertRules,
    ResourceHealth,
    ResourceLocks,
    RbacAssignments,
    AllResources { query: String },
    CostAnalysis(CostQuery),
    Budgets,
    SubscriptionDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub args: ToolArgs,
    pub export: bool,
}

impl ToolRequest {
    pub fn parse(tool: &ToolDefinition, args: &Map<String, Value>) -> Result<Self, ToolError> {
        if let Some(unknown) = args.keys().find(|key| !tool.accepts(key)) {
            return Err(invalid(
                unknown,
                format!("'{unknown}' is not an argument of {}", tool.name),
            )
            .with_docs_hint("Call tools/list for the accepted input schema."));
        }
        let export = arg_bool(args, "export", false)?;

        let parsed = match tool.name {
            "get_unused_resources" => ToolArgs::UnusedResources {
                resource_group: arg_optional_string(args, "resource_group")?,
            },
            "get_resource_utilization_summary" => ToolArgs::UtilizationSummary,
            "get_vm_performance_metrics" => ToolArgs::Performance(parse_metrics(
                args,
                MetricProfile::VirtualMachine,
                "vm_resource_id",
            )?),
            "get_storage_performance_metrics" => ToolArgs::Performance(parse_metrics(
                args,
                MetricProfile::Storage,
                "storage_account_id",
            )?),
            "get_database_performance_metrics" => ToolArgs::Performance(parse_metrics(
                args,
                MetricProfile::Database,
                "database_id",
            )?),
            "get_activity_log_analysis" => ToolArgs::ActivityLog {
                hours_back: arg_bounded_u64(args, "hours_back", 1, MAX_HOURS_BACK, u64::from(DEFAULT_HOURS_BACK))?
                    as u32,
            },
            "get_azure_advisor_detailed" => ToolArgs::Advisor {
                category: arg_optional_string(args, "category")?
                    .map(|raw| {
                        ADVISOR_CATEGORIES
                            .into_iter()
                            .find(|c| c.eq_ignore_ascii_case(&raw))
                            .map(str::to_string)
                            .ok_or_else(|| {
                                invalid(
                                    "category",
                                    format!("'category' must be one of {}", ADVISOR_CATEGORIES.join(", ")),
                                )
                            })
                    })
                    .transpose()?,
            },
            "get_security_center_alerts" => ToolArgs::SecurityAlerts,
            "get_security_assessments" => ToolArgs::SecurityAssessments,
            "get_defender_for_cloud_status" => ToolArgs::DefenderStatus,
            "get_key_vault_security_status" => ToolArgs::KeyVaultSecurity,
            "get_network_security_analysis" => ToolArgs::NetworkSecurity,
            "get_secure_score_and_compliance" => ToolArgs::SecureScore,
            "get_alerts_overview" => ToolArgs::AlertsOverview,
            "get_alert_rules" => ToolArgs::AlertRules,
            "get_resource_health_status" => ToolArgs::ResourceHealth,
            "get_resource_locks" => ToolArgs::ResourceLocks,
            "get_rbac_assignments" => ToolArgs::RbacAssignments,
            "get_all_resources" => ToolArgs::AllResources {
                query: arg_string(args, "query", DEFAULT_INVENTORY_QUERY)?,
            },
            "get_cost_analysis" => ToolArgs::CostAnalysis(parse_cost_query(args)?),
            "get_budgets" => ToolArgs::Budgets,
            "get_subscription_details" => ToolArgs::SubscriptionDetails,
            other => {
                return Err(ToolError::new(
                    codes::UNKNOWN_TOOL,
                    format!("Unknown tool '{other}'"),
                ));
            }
        };
        Ok(Self {
            args: parsed,
            export,
        })
    }
}

fn parse_metrics(
    args: &Map<String, Value>,
    profile: MetricProfile,
    id_field: &str,
) -> Result<MetricsRequest, ToolError> {
    let resource_id = arg_optional_string(args, id_field)?;
    let is_full_id = |id: &String| {
        id.trim_start_matches('/')
            .to_ascii_lowercase()
            .starts_with("subscriptions/")
    };
    if resource_id.as_ref().is_some_and(|id| !is_full_id(id)) {
        return Err(invalid(
            id_field,
            format!("'{id_field}' must be a full resource ID starting with /subscriptions/"),
        ));
    }
    let timespan = arg_string(args, "timespan", profile.default_timespan())?;
    if !is_iso_duration(&timespan) {
        return Err(invalid(
            "timespan",
            "'timespan' must be an ISO 8601 duration such as PT1H or P7D",
        ));
    }
    Ok(MetricsRequest {
        profile,
        resource_id,
        timespan,
        resource_group: arg_optional_string(args, "resource_group")?,
        max_resources: arg_bounded_u64(
            args,
            "max_resources",
            1,
            MAX_RESOURCES_LIMIT,
            DEFAULT_MAX_RESOURCES as u64,
        )? as usize,
    })
}

fn parse_cost_query(args: &Map<String, Value>) -> Result<CostQuery, ToolError> {
    let raw_timeframe = arg_string(args, "timeframe", Timeframe::MonthToDate.as_str())?;
    let timeframe = Timeframe::parse(&raw_timeframe).ok_or_else(|| {
        invalid(
            "timeframe",
            format!(
                "'timeframe' must be one of {}",
                Timeframe::ALL.map(Timeframe::as_str).join(", ")
            ),
        )
    })?;
    let raw_granularity = arg_string(args, "granularity", Granularity::Daily.as_str())?;
    let granularity = Granularity::parse(&raw_granularity).ok_or_else(|| {
        invalid("granularity", "'granularity' must be one of Daily, Monthly, None")
    })?;
    let start = arg_optional_date(args, "start_date")?;
    let end = arg_optional_date(args, "end_date")?;
    if matches!((start, end), (Some(start), Some(end)) if start > end) {
        return Err(invalid("start_date", "'start_date' must not be after 'end_date'"));
    }
    Ok(CostQuery::new(
        timeframe,
        granularity,
        arg_optional_string(args, "group_by")?,
        start,
        end,
        Utc::now().date_naive(),
    ))
}

// ── Dispatch ───────────────────────────────────────────────────

impl ToolArgs {
    pub async fn run(&self, session: &Session<'_>) -> ToolResult {
        match self {
            ToolArgs::UnusedResources { resource_group } => {
                optimization::unused_resources(session, resource_group.as_deref())
                    .await
                    .into_tool_result()
            }
            ToolArgs::UtilizationSummary => optimization::utilization_summary(session)
                .await
                .into_tool_result(),
            ToolArgs::Performance(request) => performance::performance(session, request)
                .await
                .into_tool_result(),
            ToolArgs::ActivityLog { hours_back } => optimization::activity_log(session, *hours_back)
                .await
                .into_tool_result(),
            ToolArgs::Advisor { category } => optimization::advisor(session, category.as_deref())
                .await
                .into_tool_result(),
            ToolArgs::SecurityAlerts => security::alerts(session).await.into_tool_result(),
            ToolArgs::SecurityAssessments => security::assessments(session).await.into_tool_result(),
            ToolArgs::DefenderStatus => security::defender_status(session).await.into_tool_result(),
            ToolArgs::KeyVaultSecurity => security::key_vaults(session).await.into_tool_result(),
            ToolArgs::NetworkSecurity => network::network_security(session).await.into_tool_result(),
            ToolArgs::SecureScore => security::secure_score(session).await.into_tool_result(),
            ToolArgs::AlertsOverview => monitoring::alerts_overview(session).await.into_tool_result(),
            ToolArgs::AlertRules => monitoring::alert_rules(session).await.into_tool_result(),
            ToolArgs::ResourceHealth => monitoring::resource_health(session).await.into_tool_result(),
            ToolArgs::ResourceLocks => governance::resource_locks(session).await.into_tool_result(),
            ToolArgs::RbacAssignments => governance::rbac_assignments(session).await.into_tool_result(),
            ToolArgs::AllResources { query } => billing::all_resources(session, query)
                .await
                .into_tool_result(),
            ToolArgs::CostAnalysis(query) => billing::cost_analysis(session, query)
                .await
                .into_tool_result(),
            ToolArgs::Budgets => billing::budgets(session).await.into_tool_result(),
            ToolArgs::SubscriptionDetails => governance::subscription_details(session)
                .await
                .into_tool_result(),
        }
    }
}

/// Resolves the tool and validates its arguments without any I/O.
pub fn prepare(name: &str, args: &Map<String, Value>) -> Result<(ToolDefinition, ToolRequest), ToolError> {
    let tool = find_tool(name).ok_or_else(|| {
        ToolError::new(codes::UNKNOWN_TOOL, format!("Unknown tool '{name}'"))
            .with_field("name")
            .with_docs_hint("Call tools/list for the available tools.")
    })?;
    let request = ToolRequest::parse(&tool, args)?;
    Ok((tool, request))
}

/// Validates, runs and optionally exports one tool call.
///
/// `Err` means the call was rejected before any network I/O. Upstream
/// failures are reported inside the returned envelope.
pub async fn invoke(
    client: &AzureClient,
    name: &str,
    args: &Map<String, Value>,
) -> Result<ToolResult, ToolError> {
    let (tool, request) = prepare(name, args)?;

    let started = Instant::now();
    let mut result = match client.session().await {
        Ok(session) => request.args.run(&session).await,
        Err(err) => {
            tracing::warn!(tool = tool.name, error = %err, "token acquisition failed");
            ToolResult::from_error(&err)
        }
    };
    tracing::info!(
        tool = tool.name,
        status = result.status.as_str(),
        errors = result.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool call finished"
    );

    if request.export {
        export::export_result(&client.config().settings.export_dir, &tool, &mut result).await;
    }
    Ok(result)
}

// ── Entity decoding ────────────────────────────────────────────

fn entity_label(value: &Value, index: usize) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| format!("entity '{id}'"))
        .unwrap_or_else(|| format!("entity #{index}"))
}

/// Records one sub-call's entities. A failed sub-call is one error; an entity
/// that does not fit its shape is one error and the rest are kept.
pub(crate) fn record_entities<W, T>(
    collector: &mut Collector<T>,
    family: EndpointFamily,
    scope: &str,
    result: Result<Vec<Value>, AzureError>,
    convert: impl Fn(W) -> T,
) where
    W: DeserializeOwned,
{
    let values = match result {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(family = %family, scope, code = err.code(), "sub-call failed");
            collector.fail(Some(scope), &err);
            return;
        }
    };
    if values.is_empty() {
        collector.extend(Vec::new());
        return;
    }
    for (index, value) in values.into_iter().enumerate() {
        let context = format!("{scope} {}", entity_label(&value, index));
        collector.record(None, decode_entity::<W>(family, context, value).map(&convert));
    }
}

/// Resource Graph rows through [`record_entities`].
pub(crate) fn record_rows<W, T>(
    collector: &mut Collector<T>,
    scope: &str,
    result: Result<Vec<Map<String, Value>>, AzureError>,
    convert: impl Fn(W) -> T,
) where
    W: DeserializeOwned,
{
    record_entities(
        collector,
        EndpointFamily::ResourceGraph,
        scope,
        result.map(|rows| rows.into_iter().map(Value::Object).collect()),
        convert,
    );
}
