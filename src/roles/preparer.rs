use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::traits::Preparer;
use crate::config::PreparerConfig;
use crate::workflow::types::{new_artifact_id, DataDescriptor};

/// Describes a dataset on the local filesystem
#[derive(Debug, Clone)]
pub struct FilePreparer {
    config: PreparerConfig,
}

impl FilePreparer {
    pub fn new(config: PreparerConfig) -> Self {
        Self { config }
    }

    async fn describe(&self, path: &Path) -> Result<DataDescriptor> {
        let stats = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Data file not found: {}", path.display()))?;
        if !stats.is_file() {
            anyhow::bail!("Data path is not a file: {}", path.display());
        }

        let path = tokio::fs::canonicalize(path).await?;
        let format = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut metadata = HashMap::new();
        metadata.insert(
            "filename".to_string(),
            json!(path.file_name().map(|n| n.to_string_lossy().to_string())),
        );
        metadata.insert(
            "directory".to_string(),
            json!(path.parent().map(|p| p.display().to_string())),
        );
        metadata.insert("format".to_string(), json!(format));
        if let Ok(modified) = stats.modified() {
            let modified: DateTime<Utc> = modified.into();
            metadata.insert("last_modified".to_string(), json!(modified.to_rfc3339()));
        }

        // Content inspection is best effort; the descriptor is still usable
        // without it.
        match format.as_str() {
            "csv" => match tokio::fs::read_to_string(&path).await {
                Ok(content) => csv_metadata(&content, self.config.sample_rows, &mut metadata),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read CSV metadata"),
            },
            "json" => match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => json_metadata(&value, &mut metadata),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to parse JSON metadata"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read JSON metadata"),
            },
            _ => {}
        }

        Ok(DataDescriptor {
            id: new_artifact_id("data"),
            path: path.display().to_string(),
            format,
            size_bytes: stats.len(),
            metadata,
        })
    }
}

#[async_trait]
impl Preparer for FilePreparer {
    async fn select_and_prepare_data(&self) -> Result<Option<DataDescriptor>> {
        let Some(path) = &self.config.data_path else {
            warn!("No data path configured, declining to prepare data");
            return Ok(None);
        };

        let data = self.describe(path).await?;
        info!(
            data_id = %data.id,
            path = %data.path,
            format = %data.format,
            size_bytes = data.size_bytes,
            "Data prepared"
        );
        Ok(Some(data))
    }
}

fn csv_metadata(content: &str, sample_rows: usize, metadata: &mut HashMap<String, Value>) {
    let lines: Vec<&str> = content.lines().filter(|line| !line.trim().is_empty()).collect();
    let Some(header) = lines.first() else {
        metadata.insert("row_count".to_string(), json!(0));
        return;
    };

    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    metadata.insert("row_count".to_string(), json!(lines.len() - 1));
    metadata.insert("column_count".to_string(), json!(columns.len()));
    metadata.insert("columns".to_string(), json!(columns));
    metadata.insert(
        "sample_rows".to_string(),
        json!(lines.iter().skip(1).take(sample_rows).collect::<Vec<_>>()),
    );
}

fn json_metadata(value: &Value, metadata: &mut HashMap<String, Value>) {
    let structure = match value {
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    };
    metadata.insert("is_array".to_string(), json!(value.is_array()));
    metadata.insert("structure".to_string(), json!(structure));

    match value {
        Value::Array(records) => {
            metadata.insert("record_count".to_string(), json!(records.len()));
            if let Some(first) = records.first() {
                let fields = object_keys(first.as_object());
                metadata.insert("field_count".to_string(), json!(fields.len()));
                metadata.insert("fields".to_string(), json!(fields));
                metadata.insert("sample_record".to_string(), first.clone());
            }
        }
        Value::Object(object) => {
            let keys = object_keys(Some(object));
            metadata.insert("key_count".to_string(), json!(keys.len()));
            metadata.insert("keys".to_string(), json!(keys));
        }
        _ => {}
    }
}

fn object_keys(object: Option<&Map<String, Value>>) -> Vec<String> {
    object
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}
