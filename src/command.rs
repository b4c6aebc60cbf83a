//! Running external tools
//!
//! The few tools without a Rust crate (`jpegtran`, `git`) are spawned as
//! child processes with piped output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{Result, SiteError};

/// Locate a program on `PATH`
pub fn find_program(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Run `program args...` in `cwd`, returning stdout. A non-zero exit is an
/// error carrying stderr.
pub async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<Vec<u8>> {
    let resolved = find_program(program).ok_or_else(|| SiteError::CommandNotFound {
        command: program.to_string(),
    })?;

    tracing::debug!(program, ?args, cwd = %cwd.display(), "spawning");

    let output = Command::new(resolved)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SiteError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            code: output.status.code().unwrap_or(1),
            stderr: (!stderr.is_empty()).then_some(stderr),
        });
    }

    Ok(output.stdout)
}

/// Like [`run`], with stdout decoded and trimmed
pub async fn run_text(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
    let stdout = run(program, args, cwd).await?;
    Ok(String::from_utf8_lossy(&stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let result = run("siteforge-no-such-tool", &[], Path::new(".")).await;
        assert!(matches!(result, Err(SiteError::CommandNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_and_failure() {
        let out = run_text("sh", &["-c", "echo hello"], Path::new(".")).await.unwrap();
        assert_eq!(out, "hello");

        let err = run("sh", &["-c", "echo bad >&2; exit 3"], Path::new("."))
            .await
            .unwrap_err();
        match err {
            SiteError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr.as_deref(), Some("bad"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
