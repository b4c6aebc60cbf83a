//! Error types for siteforge
//!
//! Uses `miette` for pretty error reporting with help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for siteforge operations
#[derive(Error, Diagnostic, Debug)]
pub enum SiteError {
    #[error("Failed to parse configuration")]
    #[diagnostic(code(siteforge::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(siteforge::config::not_found),
        help("Drop --config to use the built-in layout, or run `siteforge init`")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {field} {reason}")]
    #[diagnostic(code(siteforge::config::invalid))]
    InvalidConfig { field: String, reason: String },

    #[error("Target '{name}' not found")]
    #[diagnostic(
        code(siteforge::target::not_found),
        help("Run `siteforge list` to see available targets")
    )]
    TargetNotFound { name: String, available: Vec<String> },

    #[error("Circular dependency detected: {cycle}")]
    #[diagnostic(code(siteforge::target::cycle))]
    CyclicDependency { cycle: String },

    #[error("Task '{task}' failed")]
    #[diagnostic(code(siteforge::exec::failed))]
    TaskFailed {
        task: String,
        #[help]
        reason: Option<String>,
    },

    #[error("Failed to remove {}", path.display())]
    #[diagnostic(code(siteforge::clean))]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid glob pattern '{pattern}'")]
    #[diagnostic(code(siteforge::glob))]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Command not found: {command}")]
    #[diagnostic(
        code(siteforge::exec::command_not_found),
        help("Ensure the command is installed and in your PATH")
    )]
    CommandNotFound { command: String },

    #[error("Command `{command}` failed with exit code {code}")]
    #[diagnostic(code(siteforge::exec::command_failed))]
    CommandFailed {
        command: String,
        code: i32,
        #[help]
        stderr: Option<String>,
    },

    #[error("Deploy failed: {message}")]
    #[diagnostic(
        code(siteforge::deploy),
        help("Run `siteforge build` first and check the [deploy] section")
    )]
    Deploy { message: String },

    #[error("Dev server error")]
    #[diagnostic(code(siteforge::serve))]
    Serve {
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error")]
    #[diagnostic(code(siteforge::io))]
    Io(#[from] std::io::Error),

    #[error("Watch error")]
    #[diagnostic(code(siteforge::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },
}

/// Result type alias for siteforge operations
pub type Result<T> = std::result::Result<T, SiteError>;
