use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use eda_family::cli::commands::export::ExportCommand;
use eda_family::cli::commands::init::InitCommand;
use eda_family::cli::commands::reset::ResetCommand;
use eda_family::cli::commands::resume::ResumeCommand;
use eda_family::cli::commands::run::RunCommand;
use eda_family::cli::commands::status::StatusCommand;
use eda_family::cli::commands::Command;
use eda_family::cli::{Cli, Commands};
use eda_family::config::{config, EdaFamilyConfig};
use eda_family::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?.clone();

    if let Err(e) = init_telemetry(&config.observability) {
        eprintln!("Warning: failed to initialize telemetry: {e}");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(dispatch(cli, config));
    // A terminal prompt may still be waiting on stdin
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn dispatch(cli: Cli, config: EdaFamilyConfig) -> Result<()> {
    match cli.command {
        // Default behavior: no subcommand shows where things stand
        None => StatusCommand::new(config).execute().await,
        Some(Commands::Init { force }) => InitCommand::new(force).execute().await,
        Some(Commands::Run {
            auto_proceed,
            max_iterations,
            data,
            description,
            kind,
            priority,
            yes,
        }) => {
            RunCommand::new(config)
                .with_auto_proceed(auto_proceed)
                .with_max_iterations(max_iterations)
                .with_data(data)
                .with_description(description)
                .with_kind(kind)
                .with_priority(priority)
                .with_yes(yes)
                .execute()
                .await
        }
        Some(Commands::Resume { auto_proceed, yes }) => {
            ResumeCommand::new(config)
                .with_auto_proceed(auto_proceed)
                .with_yes(yes)
                .execute()
                .await
        }
        Some(Commands::Status { format }) => {
            StatusCommand::new(config).with_format(format).execute().await
        }
        Some(Commands::Reset) => ResetCommand::new(config).execute().await,
        Some(Commands::Export { output }) => {
            ExportCommand::new(config).with_output(output).execute().await
        }
    }
}
