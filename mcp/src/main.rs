use std::path::PathBuf;
use std::time::Duration;

use azlens_core::Settings;
use azlens_core::config::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_EXPORT_DIR, DEFAULT_MANAGEMENT_URL,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use azlens_mcp_runtime::{McpCommands, run as run_mcp};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "azlens_mcp=info,azlens_mcp_runtime=info";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser)]
#[command(
    name = "azlens-mcp",
    version,
    about = "Read-only Azure cost, performance and security analysis over MCP"
)]
struct Cli {
    /// Azure Resource Manager base URL
    #[arg(long, env = "AZURE_MANAGEMENT_URL", default_value = DEFAULT_MANAGEMENT_URL)]
    management_url: String,

    /// Azure AD authority host
    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    authority_host: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "AZLENS_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    /// Root directory for exported tool results
    #[arg(long, env = "AZLENS_EXPORT_DIR", default_value = DEFAULT_EXPORT_DIR)]
    export_dir: PathBuf,

    /// Log line format on stderr (stdout carries the protocol)
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: McpCommands,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let settings = Settings {
        management_url: cli.management_url,
        authority_host: cli.authority_host,
        request_timeout: Duration::from_secs(cli.request_timeout_secs.max(1)),
        export_dir: cli.export_dir,
    };
    let code = run_mcp(settings, cli.command).await;
    std::process::exit(code);
}
