use anyhow::Result;

use super::{open_store, Command};
use crate::config::EdaFamilyConfig;

pub struct ResetCommand {
    config: EdaFamilyConfig,
}

impl ResetCommand {
    pub fn new(config: EdaFamilyConfig) -> Self {
        Self { config }
    }
}

impl Command for ResetCommand {
    async fn execute(&self) -> Result<()> {
        let mut store = open_store(&self.config)?;
        let previous = store.current_stage();
        store.reset()?;

        println!("🔄 Workflow reset successfully (was: {})", previous);
        Ok(())
    }
}
