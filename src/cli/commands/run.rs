use anyhow::Result;
use std::path::PathBuf;

use super::{print_outcome, Command, ControllerSession};
use crate::config::EdaFamilyConfig;
use crate::workflow::types::{AnalysisKind, Priority};

pub struct RunCommand {
    config: EdaFamilyConfig,
    pub auto_proceed: bool,
    pub max_iterations: Option<u32>,
    pub data: Option<PathBuf>,
    pub description: Option<String>,
    pub kind: Option<AnalysisKind>,
    pub priority: Option<Priority>,
    pub yes: bool,
}

impl RunCommand {
    pub fn new(config: EdaFamilyConfig) -> Self {
        Self {
            config,
            auto_proceed: false,
            max_iterations: None,
            data: None,
            description: None,
            kind: None,
            priority: None,
            yes: false,
        }
    }

    pub fn with_auto_proceed(mut self, auto_proceed: bool) -> Self {
        self.auto_proceed = auto_proceed;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_data(mut self, data: Option<PathBuf>) -> Self {
        self.data = data;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_kind(mut self, kind: Option<AnalysisKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    /// Configuration with command line overrides applied
    pub fn effective_config(&self) -> EdaFamilyConfig {
        let mut config = self.config.clone();
        if self.auto_proceed {
            config.workflow.auto_proceed = true;
        }
        if let Some(max) = self.max_iterations {
            config.workflow.max_critique_iterations = max;
        }
        if let Some(data) = &self.data {
            config.preparer.data_path = Some(data.clone());
        }
        if let Some(description) = &self.description {
            config.instructor.description = Some(description.clone());
        }
        if let Some(kind) = self.kind {
            config.instructor.kind = kind;
        }
        if let Some(priority) = self.priority {
            config.instructor.priority = priority;
        }
        config
    }
}

impl Command for RunCommand {
    async fn execute(&self) -> Result<()> {
        let config = self.effective_config();

        println!("🏠 Starting EDA workflow");
        println!(
            "   🎯 Analysis: {} ({:?} priority)",
            config.instructor.kind, config.instructor.priority
        );
        if let Some(path) = &config.preparer.data_path {
            println!("   📂 Data: {}", path.display());
        }
        println!(
            "   🔁 Max critique iterations: {}",
            config.workflow.max_critique_iterations
        );
        println!();

        let mut session = ControllerSession::open(&config, self.yes)?;
        let outcome = session.controller.start_workflow().await?;
        print_outcome(&outcome);
        Ok(())
    }
}
