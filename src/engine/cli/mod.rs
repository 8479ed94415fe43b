//! airquery CLI Module
//! Command-line interface for compiling requests without a database

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "airquery")]
#[command(version)]
#[command(about = "Compile query requests to SQL or document operations", long_about = None)]
pub struct Cli {
    /// Project directory holding airquery.config.json (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a request to SQL text and parameters
    Sql {
        /// Schema descriptor file (JSON)
        schema: PathBuf,

        /// Query request file (JSON)
        request: PathBuf,

        /// sqlite, postgres or mysql (overrides the configured dialect)
        #[arg(short, long)]
        dialect: Option<String>,

        /// Also render the count statement
        #[arg(long)]
        count: bool,
    },

    /// Compile a request to a document operation
    Doc {
        /// Schema descriptor file (JSON)
        schema: PathBuf,

        /// Query request file (JSON)
        request: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write a default airquery.config.json into the project directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
