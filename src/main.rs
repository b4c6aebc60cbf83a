//! siteforge - build, serve and deploy a static site
//!
//! Runs the build pipeline's targets:
//! - Handlebars pages, SCSS, bundled scripts
//! - Image optimisation and font copying
//! - Live-reload dev server
//! - Git branch deploys

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands, EffectiveCommand, GraphFormat, ListFormat, DEFAULT_TARGET};
use siteforge::config::CONFIG_FILES;
use siteforge::{
    server, BuildContext, Config, ExecutionPlan, Executor, ExecutorConfig, LiveReload, Result,
    SiteError, Target, TaskGraph,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "siteforge=debug,tower_http=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Change working directory if specified
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    match cli.effective_command() {
        EffectiveCommand::Subcommand(cmd) => run_command(cmd, &cli).await,
        EffectiveCommand::RunTargets(targets) => run_targets(targets, false, &cli).await,
        EffectiveCommand::Default => run_targets(&[DEFAULT_TARGET.to_string()], false, &cli).await,
    }
}

async fn run_command(cmd: &Commands, cli: &Cli) -> Result<()> {
    match cmd {
        Commands::Run { targets, dry_run } => run_targets(targets, *dry_run, cli).await,

        Commands::Serve { port } => {
            let (mut config, _) = Config::load(cli.config.as_deref())?;
            if let Some(port) = port {
                config.serve.port = *port;
                config.validate()?;
            }
            let (executor, hub) = executor(config, false, cli);
            server::serve(executor, hub).await
        }

        Commands::List { format } => {
            print_target_list(format.clone());
            Ok(())
        }

        Commands::Graph { target, format } => {
            let target = Target::find(target.as_deref().unwrap_or(DEFAULT_TARGET))?;
            print_graph(&target, format.clone())
        }

        Commands::Init { force } => init_config(*force),

        Commands::Check => {
            let (config, path) = Config::load(cli.config.as_deref())?;
            let source = config.source_dir();

            match path {
                Some(path) => println!("{} {} is valid", style("✓").green(), path.display()),
                None => println!(
                    "{} no config file, using the default layout",
                    style("✓").green()
                ),
            }
            if !source.is_dir() {
                println!(
                    "{} source directory {} does not exist",
                    style("!").yellow(),
                    source.display()
                );
            }
            Ok(())
        }
    }
}

fn executor(config: Config, dry_run: bool, cli: &Cli) -> (Arc<Executor>, LiveReload) {
    let hub = LiveReload::new();
    let exec_config = ExecutorConfig {
        dry_run,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };
    let ctx = BuildContext::new(config, Arc::new(hub.clone()));
    (Arc::new(Executor::new(ctx, exec_config)), hub)
}

async fn run_targets(names: &[String], dry_run: bool, cli: &Cli) -> Result<()> {
    let targets = names
        .iter()
        .map(|name| Target::find(name))
        .collect::<Result<Vec<_>>>()?;

    let (config, _) = Config::load(cli.config.as_deref())?;
    let (executor, hub) = executor(config, dry_run, cli);

    for target in &targets {
        executor.execute(target).await?;

        if target.serve && !dry_run {
            // Never returns on its own
            return server::serve(executor.clone(), hub.clone()).await;
        }
    }

    Ok(())
}

fn stage_summary(target: &Target) -> String {
    let mut stages: Vec<String> = target
        .stages
        .iter()
        .map(|stage| {
            stage
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    if target.serve {
        stages.push("serve".to_string());
    }
    stages.join(" → ")
}

fn print_target_list(format: ListFormat) {
    let targets = Target::all();

    match format {
        ListFormat::Table => {
            println!("{}", style("Available targets:").bold());
            println!();

            let max_name_len = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);

            for target in &targets {
                print!(
                    "  {}{}  {}",
                    style(target.name).cyan().bold(),
                    " ".repeat(max_name_len - target.name.len()),
                    style(target.description).dim()
                );

                if target.stages.len() > 1 || target.serve {
                    print!(
                        " {}",
                        style(format!("[{}]", stage_summary(target))).yellow().dim()
                    );
                }

                println!();
            }
        }

        ListFormat::Json => {
            let mut map = serde_json::Map::new();
            for target in &targets {
                map.insert(
                    target.name.to_string(),
                    serde_json::json!({
                        "description": target.description,
                        "stages": target.stages,
                        "serve": target.serve,
                    }),
                );
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&map).unwrap_or_default()
            );
        }

        ListFormat::Plain => {
            for target in &targets {
                println!("{}", target.name);
            }
        }
    }
}

fn print_graph(target: &Target, format: GraphFormat) -> Result<()> {
    let graph = TaskGraph::for_target(target)?;
    let plan = ExecutionPlan::from_graph(&graph)?;

    match format {
        GraphFormat::Text => {
            println!(
                "{}",
                style(format!("Stages for '{}':", target.name)).bold()
            );
            println!();

            for (i, stage) in plan.stages.iter().enumerate() {
                println!("  {}", style(format!("Stage {}", i + 1)).bold());
                for &task in stage {
                    let deps = graph.dependencies(task);
                    if deps.is_empty() {
                        println!("    {}", style(task).cyan().bold());
                    } else {
                        println!(
                            "    {} {} {}",
                            style(task).cyan().bold(),
                            style("←").dim(),
                            deps.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
                        );
                    }
                }
            }

            if target.serve {
                println!("  {}", style("Then").bold());
                println!("    {} (watch + live reload)", style("serve").cyan().bold());
            }
        }

        GraphFormat::Dot => {
            println!("digraph siteforge {{");
            println!("  rankdir=LR;");
            println!("  node [shape=box];");

            for &task in &plan.tasks {
                let deps = graph.dependencies(task);
                if deps.is_empty() {
                    println!("  \"{}\";", task);
                }
                for dep in deps {
                    println!("  \"{}\" -> \"{}\";", dep, task);
                }
            }

            if target.serve {
                if let Some(last) = plan.stages.last() {
                    for task in last {
                        println!("  \"{}\" -> \"serve\";", task);
                    }
                }
            }

            println!("}}");
        }

        GraphFormat::Json => {
            let mut nodes = Vec::new();
            let mut edges = Vec::new();

            for &task in &plan.tasks {
                nodes.push(serde_json::json!({
                    "id": task.name(),
                    "description": task.description(),
                }));

                for dep in graph.dependencies(task) {
                    edges.push(serde_json::json!({
                        "from": dep.name(),
                        "to": task.name(),
                    }));
                }
            }

            let output = serde_json::json!({
                "target": target.name,
                "nodes": nodes,
                "edges": edges,
                "stages": plan.stages,
                "serve": target.serve,
            });

            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILES[0]);

    if path.exists() && !force {
        return Err(SiteError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", path.display()),
        )));
    }

    let template = r#"# siteforge.toml - static site build configuration
# Every key is optional; the values below are the defaults.

[paths]
source = "src"
output = "build"

[site]
# Free-form values available to templates as {{site.<key>}}
title = "My Site"

[styles]
entry = "scss/style.scss"
browsers = ["last 3 versions"]

[scripts]
entry = "js/script.js"
targets = "defaults"
live_reload = true

[images]
png_level = 3               # 0 (fast) to 6 (smallest)

[serve]
host = "127.0.0.1"
port = 3000
start_path = "index.html"
debounce_ms = 50

[deploy]
remote = "origin"
branch = "gh-pages"
# message = "Deploy site"
"#;

    std::fs::write(path, template)?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style(path.display()).bold()
    );

    Ok(())
}
