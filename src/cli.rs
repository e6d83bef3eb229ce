use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "readly")]
#[command(author, version, about = "Web page to PDF and EPUB conversion service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP service and the retention task
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Delete old conversions and their files once
    Cleanup {
        /// Maximum age in days (defaults to retention.max_age_days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Print summary and engagement statistics as JSON
    Stats,

    /// Print the admin session token for the configured password
    AdminToken,

    /// Generate a random secret for the admin password
    GenerateSecret,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
