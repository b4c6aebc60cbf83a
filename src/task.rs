//! Build tasks and the context they run in

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::config::Config;
use crate::error::Result;
use crate::reload::{NoReload, ReloadEvent, ReloadNotifier};
use crate::tasks;

/// A unit of build work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Clean,
    Copy,
    Images,
    Html,
    Style,
    Scripts,
    Reload,
    Deploy,
}

impl Task {
    pub const ALL: [Task; 8] = [
        Task::Clean,
        Task::Copy,
        Task::Images,
        Task::Html,
        Task::Style,
        Task::Scripts,
        Task::Reload,
        Task::Deploy,
    ];

    /// Name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Copy => "copy",
            Task::Images => "images",
            Task::Html => "html",
            Task::Style => "style",
            Task::Scripts => "buildJs",
            Task::Reload => "reload",
            Task::Deploy => "deploy",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Task::Clean => "Remove the output directory",
            Task::Copy => "Copy fonts into the output tree",
            Task::Images => "Optimise png/jpg/svg images",
            Task::Html => "Render page templates to HTML",
            Task::Style => "Compile, prefix and minify the stylesheet",
            Task::Scripts => "Bundle, transpile and minify the script entry",
            Task::Reload => "Tell connected browsers to reload",
            Task::Deploy => "Publish the output directory to a git branch",
        }
    }

    pub fn from_name(name: &str) -> Option<Task> {
        Task::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Run the task to completion
    pub async fn run(self, ctx: &BuildContext) -> Result<TaskOutcome> {
        match self {
            Task::Clean => tasks::clean::run(ctx).await,
            Task::Copy => tasks::copy::run(ctx).await,
            Task::Images => tasks::images::run(ctx).await,
            Task::Html => tasks::templates::run(ctx).await,
            Task::Style => tasks::styles::run(ctx).await,
            Task::Scripts => tasks::scripts::run(ctx).await,
            Task::Reload => {
                ctx.notifier.notify(ReloadEvent::Reload);
                Ok(TaskOutcome::default())
            }
            Task::Deploy => tasks::deploy::run(ctx).await,
        }
    }
}

impl Serialize for Task {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared state handed to every task
#[derive(Clone)]
pub struct BuildContext {
    pub config: Arc<Config>,
    pub notifier: Arc<dyn ReloadNotifier>,
}

impl BuildContext {
    pub fn new(config: Config, notifier: Arc<dyn ReloadNotifier>) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
        }
    }

    /// Context for one-shot builds with no browser attached
    pub fn offline(config: Config) -> Self {
        Self::new(config, Arc::new(NoReload))
    }

    /// Record a non-fatal error: log it, keep it on the outcome, and push it
    /// to the browser overlay
    pub fn report(
        &self,
        task: Task,
        outcome: &mut TaskOutcome,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) {
        let problem = Problem {
            path: path.into(),
            message: message.into(),
        };
        tracing::warn!(task = %task, path = %problem.path.display(), "{}", problem.message);
        self.notifier.notify(ReloadEvent::Error {
            task: task.name().to_string(),
            message: problem.to_string(),
        });
        outcome.problems.push(problem);
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A per-file error the task recovered from
#[derive(Debug, Clone)]
pub struct Problem {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// What a task did
#[derive(Debug, Default)]
pub struct TaskOutcome {
    /// Files written, relative to the output root
    pub written: Vec<PathBuf>,
    /// Reported, recovered errors
    pub problems: Vec<Problem>,
}
