use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use super::traits::Critic;
use crate::workflow::types::{
    new_artifact_id, Critique, CritiqueIssue, CritiqueStatus, Execution, ExecutionStatus, Severity,
};

/// Judges an execution by inspecting its result documents.
///
/// A failed execution is always `needs_improvement`. Otherwise the verdict
/// follows the worst issue found: none is `excellent`, any high severity
/// issue is `needs_improvement`, and anything else is `acceptable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedCritic;

impl RuleBasedCritic {
    pub fn new() -> Self {
        Self
    }

    pub fn inspect_results(results: &[Value]) -> Vec<CritiqueIssue> {
        let mut issues = Vec::new();

        for result in results {
            if result.get("type").and_then(Value::as_str) == Some("error") {
                let message = result.get("message").and_then(Value::as_str).unwrap_or("unknown error");
                issues.push(issue(
                    Severity::High,
                    format!("Error in results: {message}"),
                    "Review the error and fix the analysis logic",
                ));
            }

            if let Some(analysis) = result.get("analysis") {
                inspect_analysis(analysis, &mut issues);
            }

            if let Some(plots) = result.get("plots") {
                let has_files = plots
                    .get("files")
                    .and_then(Value::as_array)
                    .is_some_and(|files| !files.is_empty());
                if !has_files {
                    issues.push(issue(
                        Severity::Medium,
                        "No plots generated for the analysis".to_string(),
                        "Check if plotting libraries are installed and configured correctly",
                    ));
                }
            }
        }

        issues
    }
}

#[async_trait]
impl Critic for RuleBasedCritic {
    async fn critique_results(
        &self,
        execution: &Execution,
        prior_critiques: &[Critique],
    ) -> Result<Option<Critique>> {
        debug!(
            execution_id = %execution.id,
            prior_critiques = prior_critiques.len(),
            "Critiquing execution"
        );

        let (status, feedback, issues) = if execution.status == ExecutionStatus::Failed {
            let suggestion = execution
                .error
                .clone()
                .unwrap_or_else(|| "Check the error logs for details".to_string());
            (
                CritiqueStatus::NeedsImprovement,
                "The EDA execution failed. Please review and fix the errors.".to_string(),
                vec![CritiqueIssue {
                    severity: Severity::High,
                    description: "Execution failed".to_string(),
                    suggestion: Some(suggestion),
                }],
            )
        } else {
            let issues = Self::inspect_results(&execution.results);
            let worst = issues.iter().map(|i| i.severity).max();
            let (status, feedback) = match worst {
                None => (
                    CritiqueStatus::Excellent,
                    "Excellent analysis! The results are comprehensive and well-presented.",
                ),
                Some(Severity::High) => (
                    CritiqueStatus::NeedsImprovement,
                    "Critical issues found that need to be addressed.",
                ),
                Some(Severity::Medium) => (
                    CritiqueStatus::Acceptable,
                    "Good analysis with some areas for improvement.",
                ),
                Some(Severity::Low) => (
                    CritiqueStatus::Acceptable,
                    "Analysis is acceptable with minor suggestions.",
                ),
            };
            (status, feedback.to_string(), issues)
        };

        let critique = Critique {
            id: new_artifact_id("critique"),
            execution_id: execution.id.clone(),
            feedback,
            issues,
            status,
            timestamp: Utc::now(),
        };

        info!(
            critique_id = %critique.id,
            status = %critique.status,
            issues = critique.issues.len(),
            "Critique completed"
        );
        Ok(Some(critique))
    }
}

fn inspect_analysis(analysis: &Value, issues: &mut Vec<CritiqueIssue>) {
    if let Some(summary) = analysis.get("summary") {
        if summary.get("numeric_count").and_then(Value::as_u64) == Some(0) {
            issues.push(issue(
                Severity::Medium,
                "No numeric columns found in the dataset".to_string(),
                "Consider converting categorical variables to numeric or check data types",
            ));
        }

        if let Some(missing) = summary.get("missing_values").and_then(Value::as_object) {
            let total: f64 = missing.values().filter_map(Value::as_f64).sum();
            if total > 0.0 {
                issues.push(issue(
                    Severity::Low,
                    format!("Found {total} missing values in the dataset"),
                    "Consider imputation strategies or report missing value handling",
                ));
            }
        }
    }

    if let Some(correlation) = analysis.get("correlation") {
        let has_high = correlation
            .get("high_correlations")
            .and_then(Value::as_array)
            .is_some_and(|pairs| !pairs.is_empty());
        if !has_high {
            issues.push(issue(
                Severity::Low,
                "No high correlations found between variables".to_string(),
                "Consider adjusting the correlation threshold or checking for non-linear relationships",
            ));
        }
    }

    if let Some(outliers) = analysis.get("outliers") {
        let total: f64 = outliers
            .get("outliers_by_column")
            .and_then(Value::as_object)
            .map(|columns| {
                columns
                    .values()
                    .filter_map(|column| column.get("count").and_then(Value::as_f64))
                    .sum()
            })
            .unwrap_or(0.0);
        if total > 0.0 {
            issues.push(issue(
                Severity::Low,
                format!("Detected {total} outliers across columns"),
                "Review outliers and consider if they are valid data points or errors",
            ));
        }
    }
}

fn issue(severity: Severity, description: String, suggestion: &str) -> CritiqueIssue {
    CritiqueIssue {
        severity,
        description,
        suggestion: Some(suggestion.to_string()),
    }
}
