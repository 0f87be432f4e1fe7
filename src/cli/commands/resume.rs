use anyhow::Result;

use super::{open_store, print_outcome, Command, ControllerSession};
use crate::config::EdaFamilyConfig;

pub struct ResumeCommand {
    config: EdaFamilyConfig,
    pub auto_proceed: bool,
    pub yes: bool,
}

impl ResumeCommand {
    pub fn new(config: EdaFamilyConfig) -> Self {
        Self {
            config,
            auto_proceed: false,
            yes: false,
        }
    }

    pub fn with_auto_proceed(mut self, auto_proceed: bool) -> Self {
        self.auto_proceed = auto_proceed;
        self
    }

    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }
}

impl Command for ResumeCommand {
    async fn execute(&self) -> Result<()> {
        let mut config = self.config.clone();
        if self.auto_proceed {
            config.workflow.auto_proceed = true;
        }

        let stage = open_store(&config)?.current_stage();
        if stage.is_in_flight() {
            println!("🔄 Resuming workflow at {}", stage);
        } else {
            println!("ℹ️  No workflow in progress (stage: {}), starting a new one", stage);
        }
        println!();

        let mut session = ControllerSession::open(&config, self.yes)?;
        let outcome = session.controller.continue_workflow().await?;
        print_outcome(&outcome);
        Ok(())
    }
}
