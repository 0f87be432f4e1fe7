use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::workflow::types::{AnalysisKind, Priority};

pub mod commands;

#[derive(Parser)]
#[command(name = "eda-family")]
#[command(about = "Resumable instruct/prepare/execute/critique workflow for exploratory data analysis")]
#[command(long_about = "eda-family drives an exploratory data analysis through four roles: an \
                       instructor that states the task, a preparer that describes the dataset, \
                       an executor that runs the analysis and a critic that judges it. Progress is \
                       persisted after every stage, so an interrupted workflow can be resumed with \
                       'eda-family resume'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter eda-family.toml with every default
    Init {
        /// Replace an existing eda-family.toml
        #[arg(long, help = "Overwrite an existing eda-family.toml")]
        force: bool,
    },
    /// Start a workflow (or continue the one in progress)
    Run {
        /// Skip the confirmation prompts between stages
        #[arg(long, help = "Skip confirmation prompts between stages")]
        auto_proceed: bool,
        /// Retry ceiling for the critique loop
        #[arg(long, help = "Maximum improve-and-retry cycles before completion is forced")]
        max_iterations: Option<u32>,
        /// Dataset to analyse
        #[arg(long, help = "Path to the dataset (CSV, JSON, ...)")]
        data: Option<PathBuf>,
        /// What the analysis should find out
        #[arg(long, help = "Task description handed to the executor")]
        description: Option<String>,
        /// Kind of analysis
        #[arg(long, help = "Analysis kind, e.g. statistical_summary or outlier_detection")]
        kind: Option<AnalysisKind>,
        /// Priority of the task
        #[arg(long, help = "Priority: low, medium or high")]
        priority: Option<Priority>,
        /// Answer yes to every prompt
        #[arg(short = 'y', long, help = "Auto-approve every prompt, including continuing an existing workflow")]
        yes: bool,
    },
    /// Continue an interrupted workflow from its last committed stage
    Resume {
        /// Skip the confirmation prompts between stages
        #[arg(long, help = "Skip confirmation prompts between stages")]
        auto_proceed: bool,
        /// Answer yes to every prompt
        #[arg(short = 'y', long, help = "Auto-approve every prompt")]
        yes: bool,
    },
    /// Show the persisted workflow state
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "text", help = "Output format")]
        format: StatusFormat,
    },
    /// Discard the workflow and return to idle
    Reset,
    /// Write the workflow record to a JSON export file
    Export {
        /// Destination file
        #[arg(long, help = "Export file (default: <output_dir>/eda_export_<millis>.json)")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusFormat {
    Text,
    Json,
}
