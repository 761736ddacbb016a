//! Writes tool envelopes to `<export_dir>/<category>/<tool>.json`.

use std::io;
use std::path::{Path, PathBuf};

use azlens_core::ToolResult;

use crate::to_pretty_json;
use crate::tools::ToolDefinition;

pub fn export_path(dir: &Path, tool: &ToolDefinition) -> PathBuf {
    dir.join(tool.category.as_str())
        .join(format!("{}.json", tool.name))
}

/// Writes exactly the text an MCP client receives for `result`.
pub async fn write(dir: &Path, tool: &ToolDefinition, result: &ToolResult) -> io::Result<PathBuf> {
    let path = export_path(dir, tool);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, to_pretty_json(&result.to_value())).await?;
    Ok(path)
}

/// A failed export never discards the data; it is appended to `errors`.
pub async fn export_result(dir: &Path, tool: &ToolDefinition, result: &mut ToolResult) {
    match write(dir, tool, result).await {
        Ok(path) => {
            tracing::info!(tool = tool.name, path = %path.display(), "exported tool result");
        }
        Err(err) => {
            let path = export_path(dir, tool);
            tracing::warn!(tool = tool.name, path = %path.display(), error = %err, "export failed");
            result.push_error(format!("export to {} failed: {err}", path.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use azlens_core::ToolStatus;
    use serde_json::json;

    use super::*;
    use crate::testing::scratch_dir;
    use crate::tools::find_tool;

    #[tokio::test]
    async fn export_matches_the_rendered_envelope() {
        let dir = scratch_dir("export-ok");
        let tool = find_tool("get_budgets").unwrap();
        let mut result = ToolResult::success(json!({"total_budgets": 0, "budgets": []}));

        export_result(&dir, &tool, &mut result).await;

        assert_eq!(result.status, ToolStatus::Success);
        let path = dir.join("billing").join("get_budgets.json");
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, to_pretty_json(&result.to_value()));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unwritable_directory_degrades_to_partial() {
        let blocker = scratch_dir("export-blocked");
        std::fs::write(&blocker, "not a directory").unwrap();
        let tool = find_tool("get_security_center_alerts").unwrap();
        let mut result = ToolResult::success(json!({"total_alerts": 1}));

        export_result(&blocker, &tool, &mut result).await;

        assert_eq!(result.status, ToolStatus::Partial);
        assert_eq!(result.data["total_alerts"], 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("export to "));
        let _ = std::fs::remove_file(&blocker);
    }

    #[tokio::test]
    async fn error_envelopes_stay_errors() {
        let blocker = scratch_dir("export-error");
        std::fs::write(&blocker, "x").unwrap();
        let tool = find_tool("get_budgets").unwrap();
        let mut result = ToolResult::failed(vec!["upstream down".to_string()]);

        export_result(&blocker, &tool, &mut result).await;

        assert_eq!(result.status, ToolStatus::Error);
        assert_eq!(result.errors.len(), 2);
        let _ = std::fs::remove_file(&blocker);
    }
}
