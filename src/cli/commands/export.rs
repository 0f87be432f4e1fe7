use anyhow::Result;
use std::path::PathBuf;

use super::{open_store, Command};
use crate::config::EdaFamilyConfig;
use crate::workflow::write_export;

pub struct ExportCommand {
    config: EdaFamilyConfig,
    pub output: Option<PathBuf>,
}

impl ExportCommand {
    pub fn new(config: EdaFamilyConfig) -> Self {
        Self {
            config,
            output: None,
        }
    }

    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }
}

impl Command for ExportCommand {
    async fn execute(&self) -> Result<()> {
        let state = open_store(&self.config)?.state();
        let path = write_export(&state, self.output.as_deref(), &self.config.executor.output_dir)?;

        println!("📦 Results exported to {}", path.display());
        Ok(())
    }
}
