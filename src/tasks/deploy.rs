//! Publish the output tree to a git branch
//!
//! The branch is cloned into a scratch directory when it already exists so
//! its history is kept; otherwise an orphan branch is started. The scratch
//! worktree is replaced wholesale with the output tree, committed and
//! pushed.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::command;
use crate::error::{Result, SiteError};
use crate::task::{BuildContext, TaskOutcome};

pub async fn run(ctx: &BuildContext) -> Result<TaskOutcome> {
    let output = ctx.config.output_dir();
    if !output.is_dir() {
        return Err(SiteError::Deploy {
            message: format!("output directory {} does not exist", output.display()),
        });
    }

    let deploy = &ctx.config.deploy;
    let url = remote_url(&ctx.config.root, &deploy.remote).await?;
    let scratch = tempfile::tempdir()?;
    let dir = scratch.path();

    checkout_branch(dir, &url, &deploy.branch).await?;
    clear_worktree(dir).await?;
    let written = copy_tree(&output, dir).await?;

    git(dir, &["add", "--all"]).await?;
    let status = command::run_text("git", &["status", "--porcelain"], dir).await?;
    if status.is_empty() {
        tracing::info!(branch = %deploy.branch, "nothing to deploy, branch is up to date");
        return Ok(TaskOutcome::default());
    }

    let message = deploy.message.clone().unwrap_or_else(|| {
        format!(
            "Deploy {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    });
    git(dir, &["commit", "--quiet", "-m", &message]).await?;

    let refspec = format!("HEAD:refs/heads/{}", deploy.branch);
    git(dir, &["push", "--quiet", &url, &refspec]).await?;

    tracing::info!(branch = %deploy.branch, files = written.len(), "deployed");
    Ok(TaskOutcome {
        written,
        problems: Vec::new(),
    })
}

async fn git(dir: &Path, args: &[&str]) -> Result<()> {
    match command::run("git", args, dir).await {
        Ok(_) => Ok(()),
        Err(SiteError::CommandFailed {
            command,
            stderr: Some(stderr),
            ..
        }) => Err(SiteError::Deploy {
            message: format!("`{}` failed: {}", command, stderr),
        }),
        Err(e) => Err(e),
    }
}

/// A remote name is looked up in the project's git config; anything that
/// looks like a URL or a path is used as is
async fn remote_url(root: &Path, remote: &str) -> Result<String> {
    let literal = remote.contains("://")
        || remote.contains(':')
        || remote.starts_with('/')
        || remote.starts_with('.');
    if literal {
        return Ok(remote.to_string());
    }

    let key = format!("remote.{}.url", remote);
    command::run_text("git", &["config", "--get", &key], root)
        .await
        .map_err(|_| SiteError::Deploy {
            message: format!("git remote '{}' is not configured", remote),
        })
}

async fn checkout_branch(dir: &Path, url: &str, branch: &str) -> Result<()> {
    let cloned = command::run(
        "git",
        &["clone", "--quiet", "--depth", "1", "--branch", branch, url, "."],
        dir,
    )
    .await;

    match cloned {
        Ok(_) => Ok(()),
        Err(SiteError::CommandNotFound { command }) => Err(SiteError::CommandNotFound { command }),
        Err(e) => {
            tracing::debug!(%branch, "branch not cloned ({}), starting a new one", e);
            clear_worktree(dir).await?;
            git(dir, &["init", "--quiet"]).await?;
            git(dir, &["checkout", "--quiet", "--orphan", branch]).await
        }
    }
}

/// Remove everything except `.git`
async fn clear_worktree(dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == ".git" {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// Copy every file under `from` into `to`, returning relative paths
async fn copy_tree(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = WalkDir::new(from)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(from).ok().map(Path::to_path_buf))
        .collect();

    for rel in &files {
        let dest = to.join(rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(from.join(rel), dest).await?;
    }

    Ok(files)
}
