//! Remove the output directory

use std::io::ErrorKind;

use crate::error::{Result, SiteError};
use crate::task::{BuildContext, TaskOutcome};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let output = ctx.config.output_dir();

    match tokio::fs::remove_dir_all(&output).await {
        Ok(()) => tracing::debug!(path = %output.display(), "removed output directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %output.display(), "output directory already absent")
        }
        Err(e) => {
            return Err(SiteError::Clean {
                path: output,
                source: e,
            })
        }
    }

    Ok(TaskOutcome::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_clean_removes_populated_output() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::offline(Config::with_root(temp.path()));
        let out = ctx.config.output_dir();
        std::fs::create_dir_all(out.join("css")).unwrap();
        std::fs::write(out.join("css/style.css"), "a{}").unwrap();
        std::fs::write(out.join("index.html"), "<p>").unwrap();

        run(&ctx).await.unwrap();

        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_clean_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::offline(Config::with_root(temp.path()));

        run(&ctx).await.unwrap();
        run(&ctx).await.unwrap();

        assert!(!ctx.config.output_dir().exists());
    }
}
