//! Stylesheet entry to `css/<name>.css` and `css/<name>.min.css`
//!
//! `grass` compiles the SCSS (and resolves its imports), `lightningcss`
//! adds vendor prefixes for the configured browsers and does the
//! minification.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::error::Result;
use crate::reload::ReloadEvent;
use crate::task::{BuildContext, Task, TaskOutcome};
use crate::tasks::{min_name, write_file};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let entry = ctx.config.source_path(&ctx.config.styles.entry);
    let browsers = ctx.config.styles.browsers.clone();
    let mut outcome = TaskOutcome::default();

    let compiled = {
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || compile(&entry, &browsers))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?
    };

    let (css, min) = match compiled {
        Ok(pair) => pair,
        Err(message) => {
            ctx.report(Task::Style, &mut outcome, &entry, message);
            return Ok(outcome);
        }
    };

    let file_name = PathBuf::from(entry.file_stem().unwrap_or_default()).with_extension("css");
    let css_rel = Path::new("css").join(&file_name);
    let min_rel = Path::new("css").join(min_name(&file_name));

    write_file(&ctx.config.output_path(&css_rel), &css).await?;
    write_file(&ctx.config.output_path(&min_rel), &min).await?;
    outcome.written = vec![css_rel, min_rel];

    ctx.notifier
        .notify(ReloadEvent::changed(outcome.written.iter().cloned()));

    tracing::debug!(bytes = css.len(), min_bytes = min.len(), "stylesheet written");
    Ok(outcome)
}

/// Compile and prefix, then minify the prefixed result
fn compile(entry: &Path, browsers: &[String]) -> std::result::Result<(String, String), String> {
    let options = grass::Options::default().style(grass::OutputStyle::Expanded);
    let css = grass::from_path(entry, &options).map_err(|e| e.to_string())?;

    let targets = targets(browsers)?;
    let prefixed = process(&css, entry, targets, false)?;
    let minified = process(&prefixed, entry, targets, true)?;
    Ok((prefixed, minified))
}

fn targets(browsers: &[String]) -> std::result::Result<Targets, String> {
    let browsers = Browsers::from_browserslist(browsers).map_err(|e| e.to_string())?;
    Ok(browsers.map(Targets::from).unwrap_or_default())
}

fn process(
    css: &str,
    filename: &Path,
    targets: Targets,
    minify: bool,
) -> std::result::Result<String, String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string_lossy().into_owned(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;

    // Vendor prefixes are added by this pass; `minify` only picks the printer
    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;

    Ok(printed.code)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::reload::testing::RecordingNotifier;

    fn setup(scss: &[(&str, &str)]) -> (tempfile::TempDir, BuildContext, Arc<RecordingNotifier>) {
        let temp = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = BuildContext::new(Config::with_root(temp.path()), notifier.clone());
        for (rel, contents) in scss {
            let path = ctx.config.source_path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        (temp, ctx, notifier)
    }

    #[tokio::test]
    async fn test_writes_prefixed_and_minified_copies() {
        let (_temp, ctx, notifier) = setup(&[
            ("scss/_nav.scss", ".nav { a { color: #336699; } }\n"),
            (
                "scss/style.scss",
                "@import 'nav';\n$gap: 4px;\n.box {\n  margin: $gap * 2;\n  user-select: none;\n}\n",
            ),
        ]);

        let outcome = run(&ctx).await.unwrap();

        assert!(outcome.problems.is_empty());
        let css = std::fs::read_to_string(ctx.config.output_path("css/style.css")).unwrap();
        let min = std::fs::read_to_string(ctx.config.output_path("css/style.min.css")).unwrap();

        assert!(css.contains(".nav a"));
        assert!(css.contains("8px"));
        assert!(css.contains("-ms-user-select") || css.contains("-webkit-user-select"));
        assert!(min.len() <= css.len());
        assert!(!min.trim_end().contains('\n'));
        assert_eq!(
            notifier.events(),
            vec![ReloadEvent::Changed {
                paths: vec!["css/style.css".to_string(), "css/style.min.css".to_string()]
            }]
        );
    }

    #[tokio::test]
    async fn test_compile_error_is_reported_not_fatal() {
        let (_temp, ctx, notifier) = setup(&[("scss/style.scss", ".a { color: ; \n")]);

        let outcome = run(&ctx).await.unwrap();

        assert!(outcome.written.is_empty());
        assert_eq!(outcome.problems.len(), 1);
        assert!(!ctx.config.output_path("css/style.css").exists());
        assert!(matches!(notifier.events()[0], ReloadEvent::Error { .. }));
    }

    #[test]
    fn test_default_targets_resolve() {
        let targets = targets(&["last 3 versions".to_string()]).unwrap();
        assert!(targets.browsers.is_some());
    }
}
