//! Post-session checks on the filesystem.
//!
//! fds2ascii can exit 0 without writing anything, so the exit status alone
//! never counts as success.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Present(PathBuf),
    Missing(PathBuf),
    Empty(PathBuf),
}

/// Check that `path` exists and holds at least one byte.
pub fn verify_output(path: &Path) -> Verification {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Verification::Present(path.to_path_buf()),
        Ok(meta) if meta.is_file() => Verification::Empty(path.to_path_buf()),
        _ => Verification::Missing(path.to_path_buf()),
    }
}

/// Remove a leftover staged file so an old export can't pass verification.
///
/// Returns `Ok(true)` when a file was actually removed.
pub fn clear_stale(staged: &Path) -> io::Result<bool> {
    match fs::remove_file(staged) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Move the staged file into its final location, if the tool produced one.
///
/// Returns `Ok(false)` when there was nothing to move.
pub fn collect(staged: &Path, final_path: &Path) -> io::Result<bool> {
    if !staged.exists() {
        return Ok(false);
    }
    if staged == final_path {
        return Ok(true);
    }
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(staged, final_path).is_err() {
        // Cross-device moves can't rename.
        fs::copy(staged, final_path)?;
        fs::remove_file(staged)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_reports_present_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("5.csv");
        let empty = dir.path().join("6.csv");
        fs::write(&full, "x,y\n").unwrap();
        fs::write(&empty, "").unwrap();

        assert_eq!(verify_output(&full), Verification::Present(full.clone()));
        assert_eq!(verify_output(&empty), Verification::Empty(empty.clone()));
        let missing = dir.path().join("7.csv");
        assert_eq!(verify_output(&missing), Verification::Missing(missing.clone()));
        assert_eq!(
            verify_output(dir.path()),
            Verification::Missing(dir.path().to_path_buf())
        );
    }

    #[test]
    fn collect_moves_into_group_dir() {
        let results = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let staged = results.path().join("3.csv");
        let final_path = out.path().join("group_2").join("3.csv");
        fs::write(&staged, "data").unwrap();

        assert!(collect(&staged, &final_path).unwrap());
        assert!(!staged.exists());
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "data");
    }

    #[test]
    fn collect_without_staged_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("3.csv");
        assert!(!collect(&staged, &dir.path().join("out.csv")).unwrap());
    }

    #[test]
    fn clear_stale_reports_whether_it_removed_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("0.csv");
        assert!(!clear_stale(&staged).unwrap());
        fs::write(&staged, "old").unwrap();
        assert!(clear_stale(&staged).unwrap());
        assert!(!staged.exists());
    }
}
