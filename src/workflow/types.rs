use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Pipeline stages. `Idle` and `Completed` are the only stages without a
/// pending artifact; `Completed` is terminal until an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    FatherInstruction,
    MotherDelivery,
    SonExecution,
    DaughterCritique,
    Completed,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Idle,
        Stage::FatherInstruction,
        Stage::MotherDelivery,
        Stage::SonExecution,
        Stage::DaughterCritique,
        Stage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::FatherInstruction => "father_instruction",
            Stage::MotherDelivery => "mother_delivery",
            Stage::SonExecution => "son_execution",
            Stage::DaughterCritique => "daughter_critique",
            Stage::Completed => "completed",
        }
    }

    /// Whether the stage carries an artifact that a resumed run can pick up.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Stage::Idle | Stage::Completed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of analysis an instruction can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    StatisticalSummary,
    DistributionAnalysis,
    CorrelationAnalysis,
    OutlierDetection,
    MissingValuesAnalysis,
    CategoricalAnalysis,
    TimeSeriesAnalysis,
    Custom,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::StatisticalSummary => "statistical_summary",
            AnalysisKind::DistributionAnalysis => "distribution_analysis",
            AnalysisKind::CorrelationAnalysis => "correlation_analysis",
            AnalysisKind::OutlierDetection => "outlier_detection",
            AnalysisKind::MissingValuesAnalysis => "missing_values_analysis",
            AnalysisKind::CategoricalAnalysis => "categorical_analysis",
            AnalysisKind::TimeSeriesAnalysis => "time_series_analysis",
            AnalysisKind::Custom => "custom",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statistical_summary" => Ok(AnalysisKind::StatisticalSummary),
            "distribution_analysis" => Ok(AnalysisKind::DistributionAnalysis),
            "correlation_analysis" => Ok(AnalysisKind::CorrelationAnalysis),
            "outlier_detection" => Ok(AnalysisKind::OutlierDetection),
            "missing_values_analysis" => Ok(AnalysisKind::MissingValuesAnalysis),
            "categorical_analysis" => Ok(AnalysisKind::CategoricalAnalysis),
            "time_series_analysis" => Ok(AnalysisKind::TimeSeriesAnalysis),
            "custom" => Ok(AnalysisKind::Custom),
            other => Err(format!("unknown analysis kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// What to analyse. Produced once per workflow attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub priority: Priority,
}

/// Reference to a dataset; the descriptor never owns the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub id: String,
    pub path: String,
    pub format: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One analysis run. A new execution replaces the prior one on every retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub instruction_id: String,
    pub data_id: String,
    #[serde(default)]
    pub results: Vec<Value>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueIssue {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueStatus {
    NeedsImprovement,
    Acceptable,
    Excellent,
}

impl CritiqueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CritiqueStatus::NeedsImprovement => "needs_improvement",
            CritiqueStatus::Acceptable => "acceptable",
            CritiqueStatus::Excellent => "excellent",
        }
    }
}

impl fmt::Display for CritiqueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judgement of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub id: String,
    pub execution_id: String,
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<CritiqueIssue>,
    pub status: CritiqueStatus,
    /// Wall-clock time of the verdict; ordering between critiques comes from history
    pub timestamp: DateTime<Utc>,
}

impl Critique {
    pub fn needs_improvement(&self) -> bool {
        self.status == CritiqueStatus::NeedsImprovement
    }
}

/// What a history entry recorded. One variant per kind of committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryDetails {
    InstructionCommitted { instruction: Instruction },
    DataCommitted { data: DataDescriptor },
    ExecutionCommitted { execution: Execution },
    CritiqueCommitted { critique: Critique, iteration_count: u32 },
    WorkflowCompleted { final_status: Option<CritiqueStatus> },
    StageChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub details: HistoryDetails,
}

/// The single persisted workflow record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowState {
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Instruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Critique>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl WorkflowState {
    /// Number of `needs_improvement` critiques recorded in history.
    pub fn rejected_critiques_in_history(&self) -> u32 {
        self.history
            .iter()
            .filter(|entry| {
                matches!(
                    &entry.details,
                    HistoryDetails::CritiqueCommitted { critique, .. } if critique.needs_improvement()
                )
            })
            .count() as u32
    }
}

/// Shallow partial update. `Some` fields replace the stored value.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub current_stage: Option<Stage>,
    pub instruction: Option<Instruction>,
    pub data: Option<DataDescriptor>,
    pub execution: Option<Execution>,
    pub critique: Option<Critique>,
    pub iteration_count: Option<u32>,
}

impl StateUpdate {
    pub fn stage(stage: Stage) -> Self {
        Self {
            current_stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn with_data(mut self, data: DataDescriptor) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = Some(execution);
        self
    }

    pub fn with_critique(mut self, critique: Critique) -> Self {
        self.critique = Some(critique);
        self
    }

    pub fn with_iteration_count(mut self, count: u32) -> Self {
        self.iteration_count = Some(count);
        self
    }
}

/// Lightweight view published to observers after every mutation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateSnapshot {
    pub current_stage: Stage,
    pub iteration_count: u32,
    pub history_len: usize,
    pub has_instruction: bool,
    pub has_data: bool,
    pub execution_status: Option<ExecutionStatus>,
    pub critique_status: Option<CritiqueStatus>,
}

impl From<&WorkflowState> for StateSnapshot {
    fn from(state: &WorkflowState) -> Self {
        Self {
            current_stage: state.current_stage,
            iteration_count: state.iteration_count,
            history_len: state.history.len(),
            has_instruction: state.instruction.is_some(),
            has_data: state.data.is_some(),
            execution_status: state.execution.as_ref().map(|e| e.status),
            critique_status: state.critique.as_ref().map(|c| c.status),
        }
    }
}

/// Prefixed unique identifier for a freshly produced artifact.
pub fn new_artifact_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
