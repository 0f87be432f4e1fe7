use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::workflow::persistence::PersistenceConfig;
use crate::workflow::types::{AnalysisKind, Priority};

/// Main configuration structure for eda-family
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdaFamilyConfig {
    /// Stage sequencing and retry policy
    pub workflow: WorkflowSettings,
    /// Where the workflow record lives
    pub persistence: PersistenceConfig,
    /// Instruction issued by the configured instructor
    pub instructor: InstructorConfig,
    /// Dataset selection
    pub preparer: PreparerConfig,
    /// External analysis command
    pub executor: ExecutorConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Skip every confirmation gate between stages
    pub auto_proceed: bool,
    /// Improve-and-retry cycles allowed before completion is forced
    pub max_critique_iterations: u32,
    /// Treat an unanswered interactive prompt as cancelled after this long
    pub approval_timeout_seconds: Option<u64>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            auto_proceed: false,
            max_critique_iterations: 3,
            approval_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InstructorConfig {
    pub kind: AnalysisKind,
    pub description: Option<String>,
    pub priority: Priority,
    pub parameters: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreparerConfig {
    /// Dataset to describe. The preparer abstains when unset.
    pub data_path: Option<PathBuf>,
    /// Number of CSV rows copied into the descriptor metadata
    pub sample_rows: usize,
}

impl Default for PreparerConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            sample_rows: 5,
        }
    }
}

/// How the executor obtains the analysis it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorMode {
    /// Generate a Python analysis for the instruction kind and run it with `command`
    #[default]
    Generated,
    /// Run `command` with `args` as the analysis itself
    Command,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub mode: ExecutorMode,
    /// Program that performs the analysis (the interpreter in generated mode)
    pub command: String,
    pub args: Vec<String>,
    /// Kill the analysis after this many seconds
    pub timeout_seconds: u64,
    /// Working directory handed to the analysis (and default export location)
    pub output_dir: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::Generated,
            command: "python3".to_string(),
            args: vec![],
            timeout_seconds: 300,
            output_dir: PathBuf::from("./eda_output"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl EdaFamilyConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (eda-family.toml, .eda-family-rc)
    /// 3. Environment variables (EDA_FAMILY__SECTION__KEY)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`EdaFamilyConfig::load`] with configuration files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("eda-family.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".eda-family-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("EDA_FAMILY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<EdaFamilyConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = EdaFamilyConfig::load_env_file();
        EdaFamilyConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static EdaFamilyConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
