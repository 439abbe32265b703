//! Command-line interface for clipon.
//!
//! This module provides the CLI structure for the `clipon` binary. The
//! handlers that talk to the daemon live in `main.rs`.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DeleteCommand, ListCommand, ListError, StatusCommand};

/// clipon - A lightweight clipboard history recorder
///
/// A background daemon records every text you copy. The other commands
/// query and manage the recorded history.
#[derive(Debug, Parser)]
#[command(name = "clipon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Daemon,

    /// Start the daemon in the background
    Start,

    /// Stop the daemon
    Stop,

    /// Show whether the daemon is recording
    Status(StatusCommand),

    /// Summary of configuration and history
    Info,

    /// List clipboard history
    List(ListCommand),

    /// Number of history entries
    Size,

    /// Delete all history
    Clear,

    /// Delete a range of history entries
    Delete(DeleteCommand),

    /// Write the whole history to disk
    Save,

    /// Show or change runtime options
    Config(ConfigCommand),

    /// Stop recording the clipboard
    Pause,

    /// Resume recording the clipboard
    Resume,
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
