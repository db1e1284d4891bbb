//! Filesystem helpers
//!
//! Directory-ensure, existence checks and pattern-based file deletion used
//! by the screenshot pipeline.

use crate::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Ensure `path` exists and is a directory.
///
/// Idempotent: an existing directory is accepted as-is; an existing
/// non-directory at the same path is a configuration error.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::configuration(format!(
            "Path exists but is not a directory: {}",
            path.display()
        ))),
        Err(_) => {
            tokio::fs::create_dir_all(path).await?;
            debug!("Created directory: {}", path.display());
            Ok(())
        }
    }
}

/// Check whether a path exists.
pub async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Match a file name against a simple glob pattern.
///
/// `*` matches any run of characters (including empty); every other
/// character matches literally. No `?`, no character classes.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = name.chars().collect();

    // Iterative wildcard matcher with single-star backtracking.
    let (mut p, mut t) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while t < txt.len() {
        if p < pat.len() && (pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }

    p == pat.len()
}

/// Delete regular files in `dir` whose name matches `pattern`.
///
/// Non-recursive; subdirectories are skipped. Returns the number of files
/// deleted. A missing directory deletes nothing and is not an error.
pub async fn remove_matching(dir: &Path, pattern: &str) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(0),
    };

    let mut deleted = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if glob_match(pattern, &name) {
            tokio::fs::remove_file(entry.path()).await?;
            debug!("Deleted: {}", entry.path().display());
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_literal() {
        assert!(glob_match("smoke.png", "smoke.png"));
        assert!(!glob_match("smoke.png", "smoke.jpg"));
    }

    #[test]
    fn test_glob_star() {
        assert!(glob_match("*.png", "smoke.png"));
        assert!(glob_match("*.png", ".png"));
        assert!(glob_match("error-*.png", "error-2024-01-01T00-00-00-click.png"));
        assert!(!glob_match("error-*.png", "smoke.png"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("*.png", "smoke.png.bak"));
    }

    #[tokio::test]
    async fn test_ensure_dir_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("shots");

        ensure_dir(&dir).await.unwrap();
        assert!(exists(&dir).await);
        ensure_dir(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_dir_rejects_file_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("shots");
        tokio::fs::write(&file, b"not a dir").await.unwrap();

        let result = ensure_dir(&file).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_remove_matching_counts() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "keep.txt"] {
            tokio::fs::write(tmp.path().join(name), b"x").await.unwrap();
        }
        tokio::fs::create_dir(tmp.path().join("sub.png")).await.unwrap();

        let deleted = remove_matching(tmp.path(), "*.png").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(exists(&tmp.path().join("keep.txt")).await);
        assert!(exists(&tmp.path().join("sub.png")).await);
    }

    #[tokio::test]
    async fn test_remove_matching_missing_dir() {
        let deleted = remove_matching(Path::new("/nonexistent/pagepilot-test"), "*.png")
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }
}
