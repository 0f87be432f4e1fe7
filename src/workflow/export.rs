use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::types::WorkflowState;

pub const EXPORT_VERSION: &str = "1.0";

/// Self-describing snapshot of a workflow written by `export`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub timestamp: DateTime<Utc>,
    pub workflow: WorkflowState,
    pub export_version: String,
}

impl ExportDocument {
    pub fn new(workflow: WorkflowState) -> Self {
        Self {
            timestamp: Utc::now(),
            workflow,
            export_version: EXPORT_VERSION.to_string(),
        }
    }

    /// `<output_dir>/eda_export_<millis>.json`
    pub fn default_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("eda_export_{}.json", self.timestamp.timestamp_millis()))
    }
}

/// Write `state` as pretty JSON to `output`, or to the default file under
/// `output_dir` when no explicit path is given. Returns the written path.
pub fn write_export(state: &WorkflowState, output: Option<&Path>, output_dir: &Path) -> Result<PathBuf> {
    let document = ExportDocument::new(state.clone());
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => document.default_path(output_dir),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write export to {}", path.display()))?;

    info!(
        path = %path.display(),
        stage = %state.current_stage,
        history_len = state.history.len(),
        "Workflow exported"
    );
    Ok(path)
}

/// Plain-text report of the current record
pub fn render_summary(state: &WorkflowState) -> String {
    let mut out = String::new();
    let final_status = state
        .critique
        .as_ref()
        .map(|c| c.status.as_str().to_uppercase())
        .unwrap_or_else(|| "N/A".to_string());

    let _ = writeln!(out, "Stage:              {}", state.current_stage);
    let _ = writeln!(out, "Iterations:         {}", state.iteration_count);
    let _ = writeln!(out, "Rejected critiques: {}", state.rejected_critiques_in_history());
    let _ = writeln!(out, "History entries:    {}", state.history.len());
    let _ = writeln!(out, "Final status:       {}", final_status);

    if let Some(instruction) = &state.instruction {
        let _ = writeln!(out);
        let _ = writeln!(out, "Instruction");
        let _ = writeln!(out, "  Type:        {}", instruction.kind);
        let _ = writeln!(out, "  Description: {}", instruction.description);
        let _ = writeln!(out, "  Priority:    {:?}", instruction.priority);
    }

    if let Some(data) = &state.data {
        let _ = writeln!(out);
        let _ = writeln!(out, "Data");
        let _ = writeln!(out, "  Path:   {}", data.path);
        let _ = writeln!(out, "  Format: {}", data.format);
        let _ = writeln!(out, "  Size:   {:.2} MB", data.size_bytes as f64 / (1024.0 * 1024.0));
    }

    if let Some(execution) = &state.execution {
        let _ = writeln!(out);
        let _ = writeln!(out, "Execution");
        let _ = writeln!(out, "  Status:  {:?}", execution.status);
        let _ = writeln!(out, "  Results: {} result(s)", execution.results.len());
        if let Some(error) = &execution.error {
            let _ = writeln!(out, "  Error:   {}", error);
        }
    }

    if let Some(critique) = &state.critique {
        let _ = writeln!(out);
        let _ = writeln!(out, "Critique");
        let _ = writeln!(out, "  Status:   {}", critique.status);
        let _ = writeln!(out, "  Feedback: {}", critique.feedback);
        if critique.issues.is_empty() {
            let _ = writeln!(out, "  No issues found");
        }
        for issue in &critique.issues {
            let _ = writeln!(out, "  - [{:?}] {}", issue.severity, issue.description);
            if let Some(suggestion) = &issue.suggestion {
                let _ = writeln!(out, "    suggestion: {}", suggestion);
            }
        }
    }

    out
}
