//! Page templates to HTML
//!
//! Pages are the top-level `pages/*.hbs` files; everything under
//! `partials/` is registered as a partial named by its path, so
//! `partials/layout/nav.hbs` is `{{> layout/nav}}`.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde_json::json;

use crate::error::Result;
use crate::reload::ReloadEvent;
use crate::task::{BuildContext, Task, TaskOutcome};
use crate::tasks::pretty::format_html;
use crate::tasks::{build_globset, collect_files, write_file};

const EXTENSION: &str = "hbs";

/// One rendered page, or the reason it failed
struct Rendered {
    source: PathBuf,
    stem: String,
    html: std::result::Result<String, String>,
}

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let mut outcome = TaskOutcome::default();
    let pages = page_files(&ctx.config.source_path("pages"));

    let partial_root = ctx.config.source_path("partials");
    let partial_globs = build_globset(&[format!("**/*.{}", EXTENSION)])?;
    let partials: Vec<(String, PathBuf)> = collect_files(&partial_root, &partial_globs)
        .into_iter()
        .map(|rel| (partial_name(&rel), partial_root.join(rel)))
        .collect();

    let site = serde_json::to_value(&ctx.config.site).unwrap_or_default();

    let (rendered, partial_errors) =
        tokio::task::spawn_blocking(move || render_all(&pages, &partials, &site))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;

    for (path, message) in partial_errors {
        ctx.report(Task::Html, &mut outcome, path, message);
    }

    let output = ctx.config.output_dir();
    for page in rendered {
        let html = match page.html {
            Ok(html) => html,
            Err(message) => {
                ctx.report(Task::Html, &mut outcome, &page.source, message);
                continue;
            }
        };

        let rel = PathBuf::from(format!("{}.html", page.stem));
        match write_file(&output.join(&rel), html).await {
            Ok(()) => outcome.written.push(rel),
            Err(e) => ctx.report(Task::Html, &mut outcome, &page.source, e.to_string()),
        }
    }

    if !outcome.written.is_empty() {
        ctx.notifier
            .notify(ReloadEvent::changed(outcome.written.iter().cloned()));
    }

    tracing::debug!(
        pages = outcome.written.len(),
        errors = outcome.problems.len(),
        "rendered pages"
    );
    Ok(outcome)
}

/// `pages/*.hbs`, non-recursive, sorted
fn page_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        EXTENSION
    );
    let mut pages: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect(),
        Err(e) => {
            tracing::warn!(%pattern, "bad page pattern: {}", e);
            Vec::new()
        }
    };
    pages.sort();
    pages
}

/// `layout/nav.hbs` -> `layout/nav`
fn partial_name(rel: &Path) -> String {
    rel.with_extension("")
        .to_string_lossy()
        .replace('\\', "/")
}

/// Render every page. Partial registration failures are returned alongside
/// so they can be reported; the pages still render.
fn render_all(
    pages: &[PathBuf],
    partials: &[(String, PathBuf)],
    site: &serde_json::Value,
) -> (Vec<Rendered>, Vec<(PathBuf, String)>) {
    let mut registry = Handlebars::new();
    let mut partial_errors = Vec::new();

    for (name, path) in partials {
        let registered = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|src| {
                registry
                    .register_partial(name, src)
                    .map_err(|e| e.to_string())
            });
        if let Err(message) = registered {
            partial_errors.push((path.clone(), message));
        }
    }

    let rendered = pages
        .iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let data = json!({ "page": stem, "site": site });
            let html = std::fs::read_to_string(source)
                .map_err(|e| e.to_string())
                .and_then(|src| {
                    registry
                        .render_template(&src, &data)
                        .map_err(|e| e.to_string())
                })
                .map(|html| format_html(&html));
            Rendered {
                source: source.clone(),
                stem,
                html,
            }
        })
        .collect();

    (rendered, partial_errors)
}
