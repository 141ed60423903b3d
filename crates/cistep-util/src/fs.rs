//! Filesystem scanning and cleanup helpers for cistep.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::error::UtilError;

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Return the current user's home directory.
///
/// Resolves via `HOME` (Unix) or `USERPROFILE` (Windows).
///
/// # Errors
/// Returns an error if neither environment variable is set.
pub fn user_home() -> Result<PathBuf, UtilError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .ok_or(UtilError::NoHomeDir)
}

/// Collect every directory under `root` whose name is one of `names`, sorted by path.
///
/// A matching directory is not descended into: its whole subtree goes with it.
///
/// # Errors
/// Returns an error if any directory in the tree cannot be read.
pub fn collect_dirs_named(root: &Path, names: &[&str]) -> Result<Vec<PathBuf>, UtilError> {
    let mut dirs = Vec::new();
    walk(root, &mut |path, is_dir| {
        if !is_dir {
            return Visit::Continue;
        }
        let matched = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| names.contains(&n));
        if matched {
            dirs.push(path.to_path_buf());
            Visit::Prune
        } else {
            Visit::Continue
        }
    })?;
    dirs.sort();
    tracing::debug!(root = %root.display(), ?names, found = dirs.len(), "scanned for directories");
    Ok(dirs)
}

/// Collect every file under `root` whose file name matches the glob `pattern`, sorted by path.
///
/// # Errors
/// Returns an error if the pattern is invalid or any directory cannot be read.
pub fn collect_files_matching(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    let matcher = Pattern::new(pattern).map_err(|e| UtilError::GlobPattern {
        pattern: pattern.to_owned(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    walk(root, &mut |path, is_dir| {
        if !is_dir
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| matcher.matches(n))
        {
            files.push(path.to_path_buf());
        }
        Visit::Continue
    })?;
    files.sort();
    tracing::debug!(root = %root.display(), pattern, found = files.len(), "scanned for files");
    Ok(files)
}

/// Collect all files with the given `extension` under `dir`, recursively, sorted by path.
///
/// # Errors
/// Returns an error if `dir` cannot be read.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    let mut files = Vec::new();
    walk(dir, &mut |path, is_dir| {
        if !is_dir
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            files.push(path.to_path_buf());
        }
        Visit::Continue
    })?;
    files.sort();
    Ok(files)
}

enum Visit {
    Continue,
    Prune,
}

/// Depth-first walk calling `visit` for every entry below `dir`.
///
/// Symlinked directories are reported as files so the walk never loops.
fn walk(dir: &Path, visit: &mut dyn FnMut(&Path, bool) -> Visit) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_dir = file_type.is_dir();
        if let Visit::Continue = visit(&path, is_dir) {
            if is_dir {
                walk(&path, visit)?;
            }
        }
    }

    Ok(())
}
