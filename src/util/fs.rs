//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{glob, Pattern};

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Find files *and directories* matching glob patterns directly under `base`.
///
/// `base` itself is escaped, so prefixes containing glob metacharacters are
/// matched literally. Results keep pattern order; duplicates are dropped.
pub fn glob_entries(base: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let escaped_base = Pattern::escape(&base.to_string_lossy());
    let mut results: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let full_pattern = format!("{}/{}", escaped_base.trim_end_matches('/'), pattern);

        for entry in
            glob(&full_pattern).with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) => {
                    if !results.contains(&path) {
                        results.push(path);
                    }
                }
                Err(e) => {
                    tracing::warn!("glob error: {}", e);
                }
            }
        }
    }

    Ok(results)
}

/// Whether `path` is a symlink whose target does not exist.
pub fn is_broken_symlink(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink() && !path.exists(),
        Err(_) => false,
    }
}

/// Whether `path` itself is a symlink (the target is not followed).
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Whether anything, including a dangling symlink, exists at `path`.
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Resolve exactly one level of symlink.
///
/// Relative link targets are interpreted relative to the link's directory.
/// Paths that are not symlinks are returned unchanged.
pub fn read_link_once(path: &Path) -> Result<PathBuf> {
    if !is_symlink(path) {
        return Ok(path.to_path_buf());
    }

    let target = fs::read_link(path)
        .with_context(|| format!("failed to read symlink: {}", path.display()))?;

    if target.is_absolute() {
        Ok(target)
    } else {
        Ok(path.parent().unwrap_or(Path::new("/")).join(target))
    }
}

/// Canonicalize `path` if it exists.
pub fn canonical_if_exists(path: &Path) -> Option<PathBuf> {
    path.canonicalize().ok()
}

/// Create a symlink (platform-aware).
#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

/// Remove a registry entry: unlink a symlink, or delete a real directory tree.
pub fn remove_entry(path: &Path) -> Result<()> {
    if is_symlink(path) {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove symlink: {}", path.display()))
    } else if path.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("failed to remove file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_glob_entries_matches_files_and_dirs() {
        let tmp = TempDir::new().unwrap();
        let inc = tmp.path().join("include");
        fs::create_dir_all(inc.join("openmpi")).unwrap();
        fs::write(inc.join("mpi.h"), "").unwrap();
        fs::write(inc.join("mpif.h"), "").unwrap();
        fs::write(inc.join("stdio.h"), "").unwrap();

        let found = glob_entries(&inc, &["mpi*.h", "openmpi", "mpi.h"]).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["mpi.h", "mpif.h", "openmpi"]);
    }

    #[test]
    fn test_glob_entries_missing_base_is_empty() {
        let tmp = TempDir::new().unwrap();
        let found = glob_entries(&tmp.path().join("libexec"), &["*"]).unwrap();
        assert!(found.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_detection() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        let link = tmp.path().join("link");
        fs::create_dir(&target).unwrap();
        symlink(&target, &link).unwrap();

        assert!(is_symlink(&link));
        assert!(!is_broken_symlink(&link));

        fs::remove_dir(&target).unwrap();
        assert!(is_broken_symlink(&link));
        assert!(entry_exists(&link));
        assert!(!link.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_link_once_relative() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        symlink(Path::new("real"), &tmp.path().join("alias")).unwrap();

        let resolved = read_link_once(&tmp.path().join("alias")).unwrap();
        assert_eq!(resolved, tmp.path().join("real"));

        let plain = read_link_once(&tmp.path().join("real")).unwrap();
        assert_eq!(plain, tmp.path().join("real"));
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_entry_keeps_symlink_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("file"), "x").unwrap();
        let link = tmp.path().join("link");
        symlink(&target, &link).unwrap();

        remove_entry(&link).unwrap();
        assert!(!entry_exists(&link));
        assert!(target.join("file").exists());

        remove_entry(&target).unwrap();
        assert!(!target.exists());
    }
}
