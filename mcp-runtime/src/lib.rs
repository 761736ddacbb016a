use azlens_core::error::codes;
use azlens_core::{AzureError, RuntimeConfig, Settings, ToolResult};
use chrono::SecondsFormat;
use clap::{Args, Subcommand};
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

mod catalog;
mod client;
mod export;
#[cfg(test)]
mod testing;
pub mod tools;

pub use client::{AccessToken, AzureClient};
pub use tools::{ToolCategory, ToolDefinition, ToolError, tool_definitions};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "azlens-mcp";

/// Configuration plus the Azure client built from it.
///
/// A missing credential is kept as the configuration error; every tool call
/// then returns it as an error envelope without touching the network.
pub struct Runtime {
    settings: Settings,
    client: Result<AzureClient, AzureError>,
}

impl Runtime {
    pub fn from_env(settings: Settings) -> Self {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(settings: Settings, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let client = RuntimeConfig::from_lookup(settings.clone(), lookup).map(AzureClient::new);
        if let Err(err) = &client {
            tracing::warn!(error = %err, "azure credential incomplete; tool calls will fail");
        }
        Self { settings, client }
    }

    pub fn from_client(client: AzureClient) -> Self {
        Self {
            settings: client.config().settings.clone(),
            client: Ok(client),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> Result<&AzureClient, &AzureError> {
        self.client.as_ref()
    }

    /// Runs one tool. Arguments are validated first; a missing credential is
    /// then reported as an error envelope without any network I/O.
    pub async fn call_tool(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        match &self.client {
            Ok(client) => tools::invoke(client, name, args).await,
            Err(err) => {
                let (tool, request) = tools::prepare(name, args)?;
                let mut result = ToolResult::from_error(err);
                if request.export {
                    export::export_result(&self.settings.export_dir, &tool, &mut result).await;
                }
                Ok(result)
            }
        }
    }
}

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the MCP server over stdio
    Serve,
    /// Run one tool and print its envelope
    Call(CallArgs),
    /// List tool names, categories and descriptions
    ListTools,
    /// Run tools and write their envelopes below the export directory
    Export(ExportArgs),
    /// Acquire one management token to verify the credential
    CheckAuth,
}

#[derive(Args, Clone, Debug)]
pub struct CallArgs {
    /// Tool name, see `list-tools`
    pub tool: String,
    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// Also write the envelope to <export-dir>/<category>/<tool>.json
    #[arg(long)]
    pub export: bool,
}

#[derive(Args, Clone, Debug)]
pub struct ExportArgs {
    /// Comma-separated tool names (default: every tool that runs without arguments)
    #[arg(long, value_delimiter = ',')]
    pub tools: Vec<String>,
}

/// Every command except `list-tools` needs the credential and exits with a
/// configuration error before any network I/O when it is incomplete.
pub async fn run(settings: Settings, command: McpCommands) -> i32 {
    let runtime = Runtime::from_env(settings);
    if !matches!(command, McpCommands::ListTools) {
        if let Err(err) = runtime.client() {
            let payload = json!({
                "error": err.code(),
                "message": err.to_string(),
            });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    }
    match command {
        McpCommands::Serve => {
            let server = McpServer::new(runtime);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Call(args) => print_report(call_command(&runtime, &args).await),
        McpCommands::ListTools => {
            println!("{}", to_pretty_json(&list_tools_payload()));
            0
        }
        McpCommands::Export(args) => print_report(export_command(&runtime, &args).await),
        McpCommands::CheckAuth => print_report(check_auth(&runtime).await),
    }
}

fn print_report((payload, code): (Value, i32)) -> i32 {
    println!("{}", to_pretty_json(&payload));
    code
}

fn exit_code(result: &ToolResult) -> i32 {
    if result.is_error() { 1 } else { 0 }
}

async fn call_command(runtime: &Runtime, args: &CallArgs) -> (Value, i32) {
    let mut tool_args = match serde_json::from_str::<Value>(&args.args) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            let err = ToolError::new(codes::VALIDATION_FAILED, "--args must be a JSON object")
                .with_field("args");
            return (err.to_envelope(), 1);
        }
        Err(e) => {
            let err = ToolError::new(codes::VALIDATION_FAILED, format!("--args is not valid JSON: {e}"))
                .with_field("args");
            return (err.to_envelope(), 1);
        }
    };
    if args.export {
        tool_args.insert("export".to_string(), Value::Bool(true));
    }
    match runtime.call_tool(&args.tool, &tool_args).await {
        Ok(result) => (result.to_value(), exit_code(&result)),
        Err(err) => (err.to_envelope(), 1),
    }
}

fn list_tools_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "category": tool.category.as_str(),
                "description": tool.description,
            })
        })
        .collect();
    json!({ "tools": tools })
}

/// Exit code 1 when a requested tool is unknown or any exported envelope is
/// an error.
async fn export_command(runtime: &Runtime, args: &ExportArgs) -> (Value, i32) {
    let selected: Vec<ToolDefinition> = if args.tools.is_empty() {
        tool_definitions()
            .into_iter()
            .filter(ToolDefinition::is_parameterless)
            .collect()
    } else {
        let mut selected = Vec::new();
        for name in args.tools.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            match tools::find_tool(name) {
                Some(tool) => selected.push(tool),
                None => {
                    let err = ToolError::new(codes::UNKNOWN_TOOL, format!("Unknown tool '{name}'"))
                        .with_field("tools")
                        .with_docs_hint("Run list-tools for the available tools.");
                    return (err.to_envelope(), 1);
                }
            }
        }
        selected
    };

    let export_args = Map::from_iter([("export".to_string(), Value::Bool(true))]);
    let mut entries = Vec::new();
    let mut failed = 0;
    for tool in &selected {
        let entry = match runtime.call_tool(tool.name, &export_args).await {
            Ok(result) => {
                if result.is_error() {
                    failed += 1;
                }
                json!({
                    "tool": tool.name,
                    "status": result.status.as_str(),
                    "path": export::export_path(&runtime.settings.export_dir, tool).display().to_string(),
                    "errors": result.errors,
                })
            }
            Err(err) => {
                failed += 1;
                json!({
                    "tool": tool.name,
                    "status": "error",
                    "errors": [err.message],
                })
            }
        };
        entries.push(entry);
    }

    let summary = json!({
        "export_dir": runtime.settings.export_dir.display().to_string(),
        "exported": selected.len() - failed,
        "failed": failed,
        "tools": entries,
    });
    (summary, if failed == 0 { 0 } else { 1 })
}

/// Reports the token expiry, never the token itself.
async fn check_auth(runtime: &Runtime) -> (Value, i32) {
    let client = match runtime.client() {
        Ok(client) => client,
        Err(err) => {
            return (
                json!({ "status": "error", "error": err.code(), "message": err.to_string() }),
                1,
            );
        }
    };
    let config = client.config();
    match client.access_token().await {
        Ok(token) => (
            json!({
                "status": "ok",
                "tenant_id": config.credential.tenant_id,
                "client_id": config.credential.client_id,
                "subscription_id": config.subscription_id(),
                "expires_at": token.expires_at().to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
            0,
        ),
        Err(err) => (
            json!({ "status": "error", "error": err.code(), "message": err.to_string() }),
            1,
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    ContentLength,
    NewlineDelimited,
}

struct Frame {
    framing: Framing,
    payload: Result<Value, String>,
}

pub struct McpServer {
    runtime: Runtime,
}

impl McpServer {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        tracing::info!(
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            configured = self.runtime.client().is_ok(),
            "mcp server listening on stdio"
        );
        let mut reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        self.serve(&mut reader, &mut stdout).await
    }

    /// Answers every request in the framing it arrived in until EOF.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let frame = read_framed_json(reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(frame) = frame else {
                break;
            };

            let reply = match frame.payload {
                Ok(incoming) => self.reply_to(incoming).await,
                Err(message) => {
                    tracing::warn!(%message, "discarding unparseable message");
                    Some(error_response(Value::Null, RpcError::parse_error(message)))
                }
            };
            if let Some(reply) = reply {
                write_framed_json(writer, &reply, frame.framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        Ok(())
    }

    /// Batches are answered with one array, single requests with one object.
    async fn reply_to(&self, incoming: Value) -> Option<Value> {
        let batch = incoming.as_array().is_some_and(|items| !items.is_empty());
        let mut responses = self.handle_incoming_message(incoming).await;
        if responses.is_empty() {
            None
        } else if batch {
            Some(Value::Array(responses))
        } else {
            responses.pop()
        }
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                tracing::debug!(method, "mcp request");
                Some(match self.handle_request(method, params).await {
                    Ok(payload) => success_response(id, payload),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                tracing::debug!(method, "mcp notification ignored");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(self.resources_list_payload()),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => Ok(self.prompts_list_payload()),
            "prompts/get" => self.handle_prompts_get(params),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": "Read-only Azure analysis. Every tool returns {status, data, errors}: \
                status is success, partial (some sub-calls failed, data is still usable) or error. \
                Read errors for missing RBAC roles. Pass export=true to also write the result to \
                the export directory."
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tool_definitions()
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        Ok(match self.runtime.call_tool(name, &args).await {
            Ok(result) => build_tool_call_response(result.to_value(), result.is_error()),
            Err(err) => {
                tracing::info!(tool = name, code = %err.code, "tool call rejected");
                build_tool_call_response(err.to_envelope(), true)
            }
        })
    }

    fn resources_list_payload(&self) -> Value {
        let resources: Vec<Value> = catalog::resource_definitions()
            .into_iter()
            .map(|res| {
                json!({
                    "uri": res.uri,
                    "name": res.name,
                    "description": res.description,
                    "mimeType": "application/json"
                })
            })
            .collect();
        json!({ "resources": resources })
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("resources/read params must be an object"))?;
        let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
            RpcError::invalid_params("resources/read requires string field 'uri'")
        })?;
        let resource = catalog::find_resource(uri)
            .ok_or_else(|| RpcError::invalid_params(format!("Unknown resource uri '{uri}'")))?;

        let result = self
            .runtime
            .call_tool(resource.tool, &Map::new())
            .await
            .map_err(|err| RpcError::internal(err.message))?;
        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": to_pretty_json(&result.to_value())
            }]
        }))
    }

    fn prompts_list_payload(&self) -> Value {
        let prompts: Vec<Value> = catalog::prompt_definitions()
            .into_iter()
            .map(|prompt| {
                let arguments: Vec<Value> = prompt
                    .arguments
                    .iter()
                    .map(|arg| {
                        json!({
                            "name": arg.name,
                            "description": arg.description,
                            "required": false
                        })
                    })
                    .collect();
                json!({
                    "name": prompt.name,
                    "description": prompt.description,
                    "arguments": arguments
                })
            })
            .collect();
        json!({ "prompts": prompts })
    }

    fn handle_prompts_get(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("prompts/get params must be an object"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("prompts/get requires string field 'name'"))?;
        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "prompts/get 'arguments' must be an object",
                ));
            }
        };
        catalog::prompt_messages(name, &args)
            .ok_or_else(|| RpcError::invalid_params(format!("Unknown prompt '{name}'")))
    }
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

fn parse_payload(bytes: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("Invalid JSON payload: {e}"))
}

/// Reads one message framed either by `Content-Length` headers or as a
/// single line of JSON. `Ok(None)` at a clean EOF. A line that is not a
/// `Content-*` header is taken as a JSON line, even when it does not parse.
async fn read_framed_json<R>(reader: &mut R) -> Result<Option<Frame>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !in_headers {
            if trimmed.is_empty() {
                continue;
            }
            if !trimmed.to_ascii_lowercase().starts_with("content-") {
                return Ok(Some(Frame {
                    framing: Framing::NewlineDelimited,
                    payload: parse_payload(trimmed.as_bytes()),
                }));
            }
            in_headers = true;
        }

        if trimmed.is_empty() {
            break;
        }

        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        framing: Framing::ContentLength,
        payload: parse_payload(&payload),
    }))
}

async fn write_framed_json<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::NewlineDelimited => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

pub(crate) fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
