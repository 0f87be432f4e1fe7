use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::traits::Instructor;
use crate::config::InstructorConfig;
use crate::workflow::types::{new_artifact_id, AnalysisKind, Instruction};

/// Issues the instruction described by configuration (or CLI overrides).
#[derive(Debug, Clone)]
pub struct ConfiguredInstructor {
    config: InstructorConfig,
}

impl ConfiguredInstructor {
    pub fn new(config: InstructorConfig) -> Self {
        Self { config }
    }

    /// Parameters each analysis kind starts from before configured overrides
    pub fn default_parameters(kind: AnalysisKind) -> HashMap<String, Value> {
        let pairs: Vec<(&str, Value)> = match kind {
            AnalysisKind::StatisticalSummary => {
                vec![("include_percentiles", json!(true)), ("precision", json!(2))]
            }
            AnalysisKind::DistributionAnalysis => {
                vec![("plot_type", json!("histogram")), ("bins", json!(30))]
            }
            AnalysisKind::CorrelationAnalysis => {
                vec![("method", json!("pearson")), ("threshold", json!(0.5))]
            }
            AnalysisKind::OutlierDetection => {
                vec![("method", json!("zscore")), ("threshold", json!(3))]
            }
            AnalysisKind::MissingValuesAnalysis => {
                vec![("visualize", json!(true)), ("drop_threshold", json!(50))]
            }
            AnalysisKind::TimeSeriesAnalysis => {
                vec![("frequency", json!("D")), ("trend_analysis", json!(true))]
            }
            AnalysisKind::CategoricalAnalysis | AnalysisKind::Custom => vec![],
        };

        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

#[async_trait]
impl Instructor for ConfiguredInstructor {
    async fn create_instruction(&self) -> Result<Option<Instruction>> {
        let description = match self.config.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => {
                debug!("No task description configured, declining to instruct");
                return Ok(None);
            }
        };

        let mut parameters = Self::default_parameters(self.config.kind);
        parameters.extend(self.config.parameters.clone());

        let instruction = Instruction {
            id: new_artifact_id("instr"),
            kind: self.config.kind,
            description,
            parameters,
            priority: self.config.priority,
        };

        info!(
            instruction_id = %instruction.id,
            kind = %instruction.kind,
            priority = ?instruction.priority,
            "Instruction issued"
        );
        Ok(Some(instruction))
    }
}
