use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::script::generate_analysis_script;
use super::traits::Executor;
use crate::config::{ExecutorConfig, ExecutorMode};
use crate::workflow::types::{
    new_artifact_id, Critique, DataDescriptor, Execution, ExecutionStatus, Instruction,
};

/// Payload written to the analysis command's stdin
#[derive(Debug, Serialize)]
pub struct AnalysisRequest<'a> {
    pub instruction: &'a Instruction,
    pub data: &'a DataDescriptor,
    pub prior_critique: Option<&'a Critique>,
    pub output_dir: String,
    /// Where plots should be saved
    pub plot_dir: String,
}

/// Runs an analysis program.
///
/// The program receives an [`AnalysisRequest`] as JSON on stdin and must
/// print a JSON value on stdout: an array becomes the result list, anything
/// else a single result. In [`ExecutorMode::Generated`] the program is a
/// Python script written for the instruction kind (see
/// [`generate_analysis_script`]) and `command` is its interpreter. Every way
/// the program can go wrong is reported as a failed [`Execution`], never as
/// an error.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Arguments for one run, writing the generated script first when needed
    async fn prepare_args(
        &self,
        execution_id: &str,
        request: &AnalysisRequest<'_>,
    ) -> Result<Vec<String>> {
        let mut args = self.config.args.clone();

        if self.config.mode == ExecutorMode::Generated {
            let script_path = self.script_path(execution_id);
            let script = generate_analysis_script(request.instruction.kind, request.prior_critique);
            tokio::fs::write(&script_path, script)
                .await
                .with_context(|| format!("Failed to write analysis script {}", script_path.display()))?;
            debug!(path = %script_path.display(), "Analysis script generated");
            args.push(script_path.display().to_string());
        }

        Ok(args)
    }

    fn script_path(&self, execution_id: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("analysis_{}.py", execution_id))
    }

    async fn run_analysis(
        &self,
        execution_id: &str,
        request: &AnalysisRequest<'_>,
    ) -> Result<Vec<Value>> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| {
                format!("Failed to create output directory {}", self.config.output_dir.display())
            })?;

        let payload = serde_json::to_vec(request)?;
        let args = self.prepare_args(execution_id, request).await?;

        let mut child = Command::new(&self.config.command)
            .args(&args)
            .env("EDA_OUTPUT_DIR", &self.config.output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start analysis command '{}'", self.config.command))?;

        let stdin = child.stdin.take();

        // Sending the request counts against the deadline: a program that
        // never reads a request larger than the pipe buffer blocks the write.
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&payload).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("Analysis command closed stdin before reading the request");
                    }
                    Err(e) => return Err(e).context("Failed to send request to analysis command"),
                }
            }
            child
                .wait_with_output()
                .await
                .context("Failed to collect analysis output")
        };

        let limit = Duration::from_secs(self.config.timeout_seconds);
        let output = match tokio::time::timeout(limit, exchange).await {
            Ok(output) => output?,
            // Dropping the exchange drops the child, which kills it
            Err(_) => bail!("Analysis timed out after {} seconds", self.config.timeout_seconds),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Analysis exited with {}: {}", output.status, stderr.trim());
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .context("Analysis output is not valid JSON")?;

        Ok(match value {
            Value::Array(results) => results,
            other => vec![other],
        })
    }

    async fn save_execution(&self, execution: &Execution) -> Result<()> {
        let path = self
            .config
            .output_dir
            .join(format!("execution_{}.json", execution.id));
        tokio::fs::write(&path, serde_json::to_vec_pretty(execution)?).await?;
        debug!(path = %path.display(), "Execution saved");
        Ok(())
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn execute(
        &self,
        instruction: &Instruction,
        data: &DataDescriptor,
        prior_critique: Option<&Critique>,
    ) -> Result<Option<Execution>> {
        let mut execution = Execution {
            id: new_artifact_id("exec"),
            instruction_id: instruction.id.clone(),
            data_id: data.id.clone(),
            results: vec![],
            status: ExecutionStatus::Running,
            error: None,
        };

        info!(
            execution_id = %execution.id,
            kind = %instruction.kind,
            mode = ?self.config.mode,
            command = %self.config.command,
            with_feedback = prior_critique.is_some(),
            "Running analysis"
        );

        let request = AnalysisRequest {
            instruction,
            data,
            prior_critique,
            output_dir: self.config.output_dir.display().to_string(),
            plot_dir: self.config.output_dir.join("plots").display().to_string(),
        };

        match self.run_analysis(&execution.id, &request).await {
            Ok(results) => {
                execution.results = results;
                execution.status = ExecutionStatus::Completed;
                if let Err(e) = self.save_execution(&execution).await {
                    warn!(execution_id = %execution.id, error = %e, "Failed to save execution results");
                }
            }
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "Analysis failed");
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(format!("{e:#}"));
            }
        }

        Ok(Some(execution))
    }
}
