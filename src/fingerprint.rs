//! Content digest of the output tree
//!
//! Hashes every file's root-relative path and bytes, in sorted path order,
//! so two builds of the same sources give the same digest.

use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Digest of a directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: blake3::Hash,
    pub files: usize,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hash.to_hex())
    }
}

/// Hash the tree under `root`. A missing root hashes as empty.
pub fn fingerprint(root: &Path) -> std::io::Result<Fingerprint> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    paths.sort();

    let mut hasher = blake3::Hasher::new();
    for rel in &paths {
        let name = rel.to_string_lossy().replace('\\', "/");
        let contents = std::fs::read(root.join(rel))?;
        // Length prefixes keep `a` + `bc` distinct from `ab` + `c`
        hasher.update(&(name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update(&(contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok(Fingerprint {
        hash: hasher.finalize(),
        files: paths.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_same_tree_same_digest() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for root in [a.path(), b.path()] {
            write(root, "index.html", "<p>hi</p>");
            write(root, "css/style.css", "a{}");
        }

        let fa = fingerprint(a.path()).unwrap();
        let fb = fingerprint(b.path()).unwrap();
        assert_eq!(fa, fb);
        assert_eq!(fa.files, 2);
    }

    #[test]
    fn test_contents_and_names_both_count() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path(), "a.txt", "one");
        let before = fingerprint(temp.path()).unwrap();

        write(temp.path(), "a.txt", "two");
        let edited = fingerprint(temp.path()).unwrap();
        assert_ne!(before, edited);

        std::fs::rename(temp.path().join("a.txt"), temp.path().join("b.txt")).unwrap();
        let renamed = fingerprint(temp.path()).unwrap();
        assert_ne!(edited, renamed);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let fp = fingerprint(&temp.path().join("build")).unwrap();
        assert_eq!(fp.files, 0);
    }
}
