use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blogsmith", about = "AI-assisted blog post generation")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file
    Validate,

    /// Run the auto-post pipeline once and store the article
    Generate {
        /// TOML file holding the generation request
        #[arg(long)]
        request: PathBuf,

        /// Author user id (must match an [[admin]] entry)
        #[arg(long)]
        user: String,

        /// Also write the assembled HTML to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print a stored article as JSON
    Show {
        /// Article id
        id: String,
    },
}
