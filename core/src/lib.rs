//! Shared building blocks for the azlens tool runtime.
//!
//! Everything in this crate is pure: configuration loading, the error
//! taxonomy, the endpoint table, typed Azure response shapes, the scoring
//! rule tables and the per-shape normalizers that turn raw responses into
//! reports. Network I/O lives in `azlens-mcp-runtime`.

pub mod azure;
pub mod config;
pub mod endpoints;
pub mod envelope;
pub mod error;
pub mod reports;
pub mod scoring;

pub use config::{Credential, RuntimeConfig, Settings};
pub use endpoints::EndpointFamily;
pub use envelope::{Collector, Outcome, ToolResult, ToolStatus};
pub use error::AzureError;
