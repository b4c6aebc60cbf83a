//! Task implementations, one module per delegated tool
//!
//! Shared helpers here cover glob selection and mirrored writes.

pub mod bundle;
pub mod clean;
pub mod copy;
pub mod deploy;
pub mod images;
pub mod pretty;
pub mod scripts;
pub mod styles;
pub mod templates;

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{Result, SiteError};

/// Compile glob patterns into one matcher
pub fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = Glob::new(pattern).map_err(|e| SiteError::Glob {
            pattern: pattern.to_string(),
            source: e,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SiteError::Glob {
        pattern: patterns
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join(", "),
        source: e,
    })
}

/// `**/*.{a,b}` for a list of extensions
pub fn extension_glob(extensions: &[&str]) -> String {
    format!("**/*.{{{}}}", extensions.join(","))
}

/// Files under `root` whose root-relative path matches `globs`, sorted.
/// A missing root yields nothing.
pub fn collect_files(root: &Path, globs: &GlobSet) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|rel| globs.is_match(rel))
        .collect();

    files.sort();
    files
}

/// Write bytes, creating parent directories first
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// `style.css` -> `style.min.css`
pub fn min_name(file_name: &Path) -> PathBuf {
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.extension() {
        Some(ext) => PathBuf::from(format!("{}.min.{}", stem, ext.to_string_lossy())),
        None => PathBuf::from(format!("{}.min", stem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_glob() {
        assert_eq!(extension_glob(&["png", "jpg"]), "**/*.{png,jpg}");
    }

    #[test]
    fn test_min_name() {
        assert_eq!(min_name(Path::new("style.css")), PathBuf::from("style.min.css"));
        assert_eq!(min_name(Path::new("script.js")), PathBuf::from("script.min.js"));
    }

    #[test]
    fn test_collect_files_matches_relative_paths() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("a/b")).unwrap();
        std::fs::write(temp.path().join("a/b/x.woff"), b"x").unwrap();
        std::fs::write(temp.path().join("top.ttf"), b"t").unwrap();
        std::fs::write(temp.path().join("a/skip.txt"), b"s").unwrap();

        let globs = build_globset(&[extension_glob(&["woff", "ttf"])]).unwrap();
        let files = collect_files(temp.path(), &globs);

        assert_eq!(
            files,
            vec![PathBuf::from("a/b/x.woff"), PathBuf::from("top.ttf")]
        );
    }

    #[test]
    fn test_collect_files_missing_root() {
        let globs = build_globset(&["**/*"]).unwrap();
        assert!(collect_files(Path::new("/definitely/not/here"), &globs).is_empty());
    }

    #[test]
    fn test_bad_glob_is_reported() {
        assert!(matches!(
            build_globset(&["a/{b"]),
            Err(SiteError::Glob { .. })
        ));
    }
}
