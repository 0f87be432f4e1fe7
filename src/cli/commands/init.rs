use anyhow::{bail, Result};
use std::path::PathBuf;

use super::Command;
use crate::config::EdaFamilyConfig;

/// Writes a starter `eda-family.toml` holding every default, ready to edit.
/// An existing file is only replaced with `--force`.
pub struct InitCommand {
    path: PathBuf,
    force: bool,
}

impl InitCommand {
    pub fn new(force: bool) -> Self {
        Self {
            path: PathBuf::from("eda-family.toml"),
            force,
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }
}

impl Command for InitCommand {
    async fn execute(&self) -> Result<()> {
        if self.path.exists() && !self.force {
            bail!(
                "{} already exists. Use --force to overwrite it",
                self.path.display()
            );
        }

        EdaFamilyConfig::default().save_to_file(&self.path)?;
        tracing::info!(path = %self.path.display(), "Starter configuration written");

        println!("✅ Wrote {}", self.path.display());
        println!("💡 Set [instructor] description and [preparer] data_path, then: eda-family run");
        Ok(())
    }
}
