//! Script entry to `js/<name>.js` and `js/<name>.min.js`
//!
//! The relative-import graph is bundled first, then the whole bundle goes
//! through oxc: lowered for the configured browserslist query, printed,
//! and minified. Only syntax is lowered; no runtime polyfills are added.

use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{EnvOptions, TransformOptions, Transformer};

use crate::error::Result;
use crate::reload::ReloadEvent;
use crate::task::{BuildContext, Task, TaskOutcome};
use crate::tasks::bundle::bundle;
use crate::tasks::{min_name, write_file};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let entry = ctx.config.source_path(&ctx.config.scripts.entry);
    let targets = ctx.config.scripts.targets.clone();
    let mut outcome = TaskOutcome::default();

    let compiled = {
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || build(&entry, &targets))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?
    };

    let (js, min) = match compiled {
        Ok(pair) => pair,
        Err(message) => {
            ctx.report(Task::Scripts, &mut outcome, &entry, message);
            return Ok(outcome);
        }
    };

    let file_name = PathBuf::from(entry.file_stem().unwrap_or_default()).with_extension("js");
    let js_rel = Path::new("js").join(&file_name);
    let min_rel = Path::new("js").join(min_name(&file_name));

    write_file(&ctx.config.output_path(&js_rel), &js).await?;
    write_file(&ctx.config.output_path(&min_rel), &min).await?;
    outcome.written = vec![js_rel, min_rel];

    if ctx.config.scripts.live_reload {
        ctx.notifier
            .notify(ReloadEvent::changed(outcome.written.iter().cloned()));
    }

    tracing::debug!(bytes = js.len(), min_bytes = min.len(), "script bundle written");
    Ok(outcome)
}

/// Bundle, lower, then minify the lowered output
fn build(entry: &Path, targets: &str) -> std::result::Result<(String, String), String> {
    let bundled = bundle(entry)?;
    tracing::debug!(modules = bundled.modules.len(), "bundled script modules");

    let js = transpile(&bundled.code, entry, targets)?;
    let min = minify(&js)?;
    Ok((js, min))
}

fn first_error<E: std::fmt::Display>(errors: &[E]) -> std::result::Result<(), String> {
    match errors.first() {
        Some(error) => Err(error.to_string()),
        None => Ok(()),
    }
}

fn transpile(code: &str, path: &Path, targets: &str) -> std::result::Result<String, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();
    first_error(&ret.errors)?;
    let mut program = ret.program;

    let env = EnvOptions::from_browserslist_query(targets).map_err(|e| e.to_string())?;
    let options = TransformOptions { env, ..TransformOptions::default() };
    let (symbols, scopes) = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_symbol_table_and_scope_tree();
    let ret = Transformer::new(&allocator, path, &options).build_with_symbols_and_scopes(
        symbols,
        scopes,
        &mut program,
    );
    first_error(&ret.errors)?;

    Ok(Codegen::new().build(&program).code)
}

fn minify(code: &str) -> std::result::Result<String, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();
    first_error(&ret.errors)?;
    let mut program = ret.program;

    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_symbol_table(minified.symbol_table)
        .build(&program)
        .code)
}
