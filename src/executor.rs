//! Stage scheduler
//!
//! Runs a target's stages in order. Every task of a stage is spawned at
//! once and all of them settle before the next stage starts; a fatal error
//! ends the run after its stage has settled.

use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::error::{Result, SiteError};
use crate::fingerprint::fingerprint;
use crate::graph::{ExecutionPlan, Target};
use crate::task::{BuildContext, Task};

/// Result of executing a single task
#[derive(Debug)]
pub struct TaskResult {
    pub task: Task,
    pub success: bool,
    pub duration: Duration,
    /// Files written
    pub written: usize,
    /// Recovered per-file errors
    pub warnings: usize,
    pub error: Option<String>,
}

/// Executor configuration
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Show the plan without running it
    pub dry_run: bool,
    /// No spinners or result lines
    pub quiet: bool,
    /// Also print what each task wrote
    pub verbose: bool,
}

/// Task executor
pub struct Executor {
    ctx: BuildContext,
    exec_config: ExecutorConfig,
}

impl Executor {
    pub fn new(ctx: BuildContext, exec_config: ExecutorConfig) -> Self {
        Self { ctx, exec_config }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Run every stage of `target`
    pub async fn execute(&self, target: &Target) -> Result<Vec<TaskResult>> {
        let plan = ExecutionPlan::for_target(target)?;

        if self.exec_config.dry_run {
            self.print_dry_run(target, &plan);
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let multi_progress = MultiProgress::new();
        if self.exec_config.quiet {
            multi_progress.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut all_results = Vec::new();
        for stage in &plan.stages {
            let results = self.run_stage(stage, &multi_progress).await?;
            let failed = results
                .iter()
                .find(|r| !r.success)
                .map(|r| (r.task, r.error.clone()));

            for result in &results {
                self.print_task_result(result);
            }
            all_results.extend(results);

            if let Some((task, reason)) = failed {
                return Err(SiteError::TaskFailed {
                    task: task.name().to_string(),
                    reason,
                });
            }
        }

        if target.writes_output() {
            self.log_fingerprint().await;
        }

        self.print_summary(&all_results, started.elapsed());
        Ok(all_results)
    }

    /// Run `tasks` one after another, stopping at the first fatal error.
    /// Used by the watch loop, which only logs failures.
    ///
    /// A `Reload` after a task that reported errors is skipped so the
    /// browser keeps showing the error overlay.
    pub async fn run_sequence(&self, tasks: &[Task]) -> Vec<TaskResult> {
        let mut results: Vec<TaskResult> = Vec::new();
        for &task in tasks {
            if task == Task::Reload && results.iter().any(|r| r.warnings > 0) {
                tracing::debug!("reload skipped, errors are on screen");
                continue;
            }
            let result = run_task(task, &self.ctx).await;
            self.print_task_result(&result);
            let success = result.success;
            results.push(result);
            if !success {
                break;
            }
        }
        results
    }

    /// Spawn every task of a stage and wait for all of them
    async fn run_stage(
        &self,
        stage: &[Task],
        multi_progress: &MultiProgress,
    ) -> Result<Vec<TaskResult>> {
        let handles: Vec<_> = stage
            .iter()
            .map(|&task| {
                let ctx = self.ctx.clone();
                let pb = multi_progress.add(ProgressBar::new_spinner());
                pb.set_style(spinner_style());
                pb.set_message(format!("Running {}", task));
                pb.enable_steady_tick(Duration::from_millis(100));

                tokio::spawn(async move {
                    let result = run_task(task, &ctx).await;
                    pb.finish_and_clear();
                    result
                })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| SiteError::Io(std::io::Error::other(e.to_string()))))
            .collect()
    }

    async fn log_fingerprint(&self) {
        let root = self.ctx.config.output_dir();
        match tokio::task::spawn_blocking(move || fingerprint(&root)).await {
            Ok(Ok(fp)) => tracing::info!(files = fp.files, fingerprint = %fp, "output tree"),
            Ok(Err(e)) => tracing::warn!("could not fingerprint output: {}", e),
            Err(e) => tracing::warn!("fingerprint task failed: {}", e),
        }
    }

    /// Print dry-run execution plan
    fn print_dry_run(&self, target: &Target, plan: &ExecutionPlan) {
        println!(
            "{}",
            style(format!("Execution plan for '{}' (dry run):", target.name))
                .bold()
                .cyan()
        );
        println!();

        for (i, stage) in plan.stages.iter().enumerate() {
            let parallel_note = if stage.len() > 1 { " (parallel)" } else { "" };
            println!(
                "{} {}{}",
                style(format!("Stage {}:", i + 1)).bold(),
                stage
                    .iter()
                    .map(|t| t.name())
                    .collect::<Vec<_>>()
                    .join(", "),
                style(parallel_note).dim()
            );

            for task in stage {
                println!("    {} {}", style("→").dim(), task.description());
            }
        }

        if target.serve {
            let serve = &self.ctx.config.serve;
            println!(
                "{} serve on http://{}:{}",
                style("Then:").bold(),
                serve.host,
                serve.port
            );
        }
    }

    /// Print result of a single task
    fn print_task_result(&self, result: &TaskResult) {
        if self.exec_config.quiet {
            if let Some(error) = &result.error {
                eprintln!("{} {}: {}", style("✗").red(), result.task, error);
            }
            return;
        }

        let status = if !result.success {
            style("✗").red()
        } else if result.warnings > 0 {
            style("!").yellow()
        } else {
            style("✓").green()
        };

        let mut detail = format!("{:.2}s", result.duration.as_secs_f64());
        if self.exec_config.verbose || result.written > 0 {
            detail.push_str(&format!(", {} written", result.written));
        }
        if result.warnings > 0 {
            detail.push_str(&format!(", {} with errors", result.warnings));
        }

        println!(
            "{} {} {}",
            status,
            style(result.task).bold(),
            style(detail).dim()
        );

        if let Some(error) = &result.error {
            eprintln!("  {}", style(error).red());
        }
    }

    /// Print execution summary
    fn print_summary(&self, results: &[TaskResult], elapsed: Duration) {
        if self.exec_config.quiet {
            return;
        }
        println!();

        let warnings: usize = results.iter().map(|r| r.warnings).sum();
        println!(
            "{} {} tasks completed in {:.2}s ({} files with errors)",
            style("✓").green().bold(),
            results.len(),
            elapsed.as_secs_f64(),
            warnings
        );
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Run one task and turn its outcome into a result line
async fn run_task(task: Task, ctx: &BuildContext) -> TaskResult {
    let start = Instant::now();
    let outcome = task.run(ctx).await;
    let duration = start.elapsed();

    match outcome {
        Ok(outcome) => {
            tracing::debug!(task = %task, written = outcome.written.len(), "task finished");
            TaskResult {
                task,
                success: true,
                duration,
                written: outcome.written.len(),
                warnings: outcome.problems.len(),
                error: None,
            }
        }
        Err(e) => {
            let error = error_chain(&e);
            tracing::error!(task = %task, "{}", error);
            TaskResult {
                task,
                success: false,
                duration,
                written: 0,
                warnings: 0,
                error: Some(error),
            }
        }
    }
}

/// `outer: inner: root cause`
fn error_chain(error: &SiteError) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
