//! Copy fonts from the source tree to the output tree, unchanged

use crate::config::FONT_EXTENSIONS;
use crate::error::Result;
use crate::task::{BuildContext, Task, TaskOutcome};
use crate::tasks::{build_globset, collect_files, extension_glob};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let source = ctx.config.source_dir();
    let output = ctx.config.output_dir();
    let globs = build_globset(&[extension_glob(FONT_EXTENSIONS)])?;

    let mut outcome = TaskOutcome::default();

    for rel in collect_files(&source, &globs) {
        let dest = output.join(&rel);
        let copied = async {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(source.join(&rel), &dest).await
        };

        match copied.await {
            Ok(_) => outcome.written.push(rel),
            Err(e) => ctx.report(Task::Copy, &mut outcome, &rel, e.to_string()),
        }
    }

    tracing::debug!(files = outcome.written.len(), "copied fonts");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_copy_preserves_relative_paths_for_every_extension() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::offline(Config::with_root(temp.path()));
        let src = ctx.config.source_dir();

        let mut expected = Vec::new();
        for (i, ext) in FONT_EXTENSIONS.iter().enumerate() {
            let rel = PathBuf::from(format!("fonts/family{}/face.{}", i, ext));
            std::fs::create_dir_all(src.join(&rel).parent().unwrap()).unwrap();
            std::fs::write(src.join(&rel), format!("font-{}", ext)).unwrap();
            expected.push(rel);
        }
        std::fs::create_dir_all(src.join("fonts")).unwrap();
        std::fs::write(src.join("fonts/LICENSE.txt"), "ofl").unwrap();

        let outcome = run(&ctx).await.unwrap();

        expected.sort();
        assert_eq!(outcome.written, expected);
        for rel in &expected {
            let ext = rel.extension().unwrap().to_string_lossy();
            let copied = std::fs::read_to_string(ctx.config.output_path(rel)).unwrap();
            assert_eq!(copied, format!("font-{}", ext));
        }
        assert!(!ctx.config.output_path("fonts/LICENSE.txt").exists());
    }

    #[tokio::test]
    async fn test_copy_leaves_unrelated_output_alone() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::offline(Config::with_root(temp.path()));
        let stale = ctx.config.output_path("fonts/old.woff");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        run(&ctx).await.unwrap();

        assert!(stale.exists());
    }
}
