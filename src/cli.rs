//! CLI command definitions and handling
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// siteforge - build, serve and deploy a static site
#[derive(Parser, Debug)]
#[command(name = "siteforge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to siteforge.toml config file
    #[arg(short, long, global = true, env = "SITEFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Targets to run (shorthand for `siteforge run <target>...`)
    #[arg(trailing_var_arg = true)]
    pub targets: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more targets in order
    Run {
        /// Targets to run
        #[arg(required = true)]
        targets: Vec<String>,

        /// Show execution plan without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Serve the current output with live reload, without building first
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available targets
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: ListFormat,
    },

    /// Show the task stages of a target
    Graph {
        /// Target to show (default: `default`)
        target: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Write a starter siteforge.toml
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Validate siteforge.toml configuration
    Check,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
    Json,
}

/// Target run when no command or target is given
pub const DEFAULT_TARGET: &str = "default";

impl Cli {
    /// Get the effective command, treating bare target names as `run <target>`
    pub fn effective_command(&self) -> EffectiveCommand<'_> {
        if let Some(cmd) = &self.command {
            EffectiveCommand::Subcommand(cmd)
        } else if !self.targets.is_empty() {
            EffectiveCommand::RunTargets(&self.targets)
        } else {
            EffectiveCommand::Default
        }
    }
}

pub enum EffectiveCommand<'a> {
    Subcommand(&'a Commands),
    RunTargets(&'a [String]),
    /// No arguments: the dev pipeline
    Default,
}
