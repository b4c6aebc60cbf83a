//! siteforge - a static-site build pipeline
//!
//! This crate provides both a CLI tool and a library for building a site
//! from a fixed source layout.
//!
//! # Features
//!
//! - **Handlebars pages** - Pages and partials rendered to indented HTML
//! - **SCSS styles** - Compiled with grass, prefixed and minified with lightningcss
//! - **Bundled scripts** - Relative imports concatenated, lowered and minified with oxc
//! - **Image optimisation** - oxipng, jpegtran and an SVG cleaner
//! - **Staged parallel builds** - Independent tasks of a stage run concurrently
//! - **Live reload** - Dev server with debounced source watching
//! - **Deploy** - Publish the output to a git branch
//!
//! # Layout
//!
//! ```text
//! src/pages/*.hbs            -> build/*.html
//! src/partials/**/*.hbs         (partials)
//! src/scss/style.scss        -> build/css/style.css, style.min.css
//! src/js/script.js           -> build/js/script.js, script.min.js
//! src/img/**/*.{png,jpg,svg} -> build/img/**
//! src/fonts/**               -> build/fonts/**
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use siteforge::{BuildContext, Config, Executor, ExecutorConfig, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _) = Config::load(None)?;
//!     let ctx = BuildContext::offline(config);
//!
//!     let executor = Executor::new(ctx, ExecutorConfig::default());
//!     executor.execute(&Target::find("build")?).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod graph;
pub mod reload;
pub mod server;
pub mod task;
pub mod tasks;
pub mod watch;

// Re-export main types
pub use config::Config;
pub use error::{Result, SiteError};
pub use executor::{Executor, ExecutorConfig, TaskResult};
pub use fingerprint::{fingerprint, Fingerprint};
pub use graph::{ExecutionPlan, Target, TaskGraph};
pub use reload::{LiveReload, NoReload, ReloadEvent, ReloadNotifier};
pub use task::{BuildContext, Task, TaskOutcome};
pub use watch::{DebounceQueue, WatchEvent, WatchRule};
