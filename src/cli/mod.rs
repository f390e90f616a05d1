//! CLI command definitions for extension-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::format::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and edit a file-backed extension configuration store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Storage directory (overrides settings and environment)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Storage namespace (overrides settings and environment)
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the merged configuration, or one key of it
    Get {
        /// Key to print (all keys if omitted)
        key: Option<String>,
    },

    /// Set one key and persist the merged configuration
    Set {
        key: String,
        /// JSON literal (true, 42, "text", [..]) or a plain string
        value: String,
    },

    /// Print the defaults the store merges over
    Defaults,

    /// Print the configuration on every change until interrupted
    Watch {
        /// Do not watch the storage file for edits by other processes
        #[arg(long)]
        no_external: bool,
    },

    /// Print the resolved storage file path
    Path,
}
