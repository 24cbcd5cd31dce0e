//! CLI interface for the proctor engine
//!
//! Defines the commands and global flags using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Remote exam proctoring and grading engine
///
/// Serves the proctoring and grading API, and grades stored attempts offline.
#[derive(Parser, Debug)]
#[command(name = "proctor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Address to bind, overriding server.bind_addr
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Grade a candidate's latest attempt without the server
    Grade {
        /// Candidate whose attempt to grade
        candidate_id: String,
    },

    /// Show stored results for a candidate
    Results {
        /// Candidate to look up
        candidate_id: String,
    },

    /// Print the effective configuration
    Config,
}
