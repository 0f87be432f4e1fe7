use anyhow::Result;

use super::{open_store, Command};
use crate::cli::StatusFormat;
use crate::config::EdaFamilyConfig;
use crate::workflow::render_summary;

pub struct StatusCommand {
    config: EdaFamilyConfig,
    pub format: StatusFormat,
}

impl StatusCommand {
    pub fn new(config: EdaFamilyConfig) -> Self {
        Self {
            config,
            format: StatusFormat::Text,
        }
    }

    pub fn with_format(mut self, format: StatusFormat) -> Self {
        self.format = format;
        self
    }
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let store = open_store(&self.config)?;
        let state = store.state();

        match self.format {
            StatusFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            StatusFormat::Text => {
                println!("🏠 EDA FAMILY WORKFLOW STATUS");
                println!("============================");
                println!();
                print!("{}", render_summary(&state));
                println!();
                if store.can_proceed_to_next_stage() {
                    println!("✅ Ready for the next stage");
                } else {
                    println!("⏳ Waiting on the current stage");
                }
            }
        }
        Ok(())
    }
}
