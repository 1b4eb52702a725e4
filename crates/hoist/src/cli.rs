use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hoist")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file to use instead of the platform default
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Write debug records to the terminal and log file
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Act without operator capabilities
    #[arg(long, global = true)]
    pub viewer: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the installed version and any recorded pending update
    Status,

    /// Look for a newer release or branch build
    Check {
        /// Ignore the cached answer (operators only)
        #[arg(short, long)]
        force: bool,
    },

    /// Print the update notice operators would see
    Notice,

    /// Print package details for the newest available version as JSON
    Info,

    /// Download and install the newest available version
    Install,

    /// Drop cached lookups and the pending update record (operators only)
    ClearCache,
}
