//! Per-process preview directory: `<support>/Previews/<pid>/`.
//!
//! Everything written here lives only as long as the process. The sidecar
//! removes its own directory on exit and sweeps directories left behind by
//! earlier processes on startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::AppError;

const PREVIEWS_DIR: &str = "Previews";
const MOVIE_FILE_STEM: &str = "preview_temp";

fn previews_root(support_dir: &Path) -> PathBuf {
    support_dir.join(PREVIEWS_DIR)
}

pub fn preview_dir(support_dir: &Path) -> PathBuf {
    previews_root(support_dir).join(std::process::id().to_string())
}

fn ensure_preview_dir(support_dir: &Path) -> Result<PathBuf, AppError> {
    let dir = preview_dir(support_dir);
    fs::create_dir_all(&dir).map_err(|e| {
        AppError::no_output_target(format!("cannot create {}: {}", dir.display(), e))
    })?;
    Ok(dir)
}

fn remove_stale(path: &Path) -> Result<(), AppError> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!(
                target: "tiny_preview::temp",
                "removed stale preview file {}",
                path.display()
            );
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::no_output_target(format!(
            "cannot remove stale {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Resolves `preview_temp.<extension>` in the preview directory, creating the
/// directory and removing a leftover file from an earlier request.
pub fn prepare_movie_output(support_dir: &Path, extension: &str) -> Result<PathBuf, AppError> {
    let dir = ensure_preview_dir(support_dir)?;
    let path = dir.join(format!("{}.{}", MOVIE_FILE_STEM, extension));
    remove_stale(&path)?;
    Ok(path)
}

/// Resolves the PNG path a still is exported to.
pub fn prepare_still_output(support_dir: &Path, index: u32) -> Result<PathBuf, AppError> {
    let dir = ensure_preview_dir(support_dir)?;
    let path = dir.join(format!("preview_still_{}.png", index));
    remove_stale(&path)?;
    Ok(path)
}

/// Removes this process's preview directory. Call on exit.
pub fn cleanup_preview_dir(support_dir: &Path) {
    let dir = preview_dir(support_dir);
    match fs::remove_dir_all(&dir) {
        Ok(()) => log::debug!(
            target: "tiny_preview::temp",
            "removed preview dir {}",
            dir.display()
        ),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            target: "tiny_preview::temp",
            "failed to remove preview dir {}: {}",
            dir.display(),
            e
        ),
    }
}

/// Removes preview directories of other processes not modified within
/// `max_age`. Returns how many were removed.
pub fn cleanup_stale_preview_dirs(support_dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = fs::read_dir(previews_root(support_dir)) else {
        return 0;
    };
    let own = std::process::id().to_string();
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy() == own {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_dir() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        let path = entry.path();
        if fs::remove_dir_all(&path).is_ok() {
            log::info!(
                target: "tiny_preview::temp",
                "removed stale preview dir {}",
                path.display()
            );
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_output_lives_in_pid_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = prepare_movie_output(root.path(), "m4v").expect("output");
        assert_eq!(
            path,
            root.path()
                .join("Previews")
                .join(std::process::id().to_string())
                .join("preview_temp.m4v")
        );
        assert!(path.parent().is_some_and(Path::is_dir));
    }

    #[test]
    fn stale_movie_is_removed() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = prepare_movie_output(root.path(), "mkv").expect("output");
        fs::write(&first, b"old preview").expect("write stale");
        let second = prepare_movie_output(root.path(), "mkv").expect("output");
        assert_eq!(first, second);
        assert!(!second.exists());
    }

    #[test]
    fn unwritable_root_has_no_output_target() {
        let root = tempfile::tempdir().expect("tempdir");
        let blocker = root.path().join("file");
        fs::write(&blocker, b"not a dir").expect("write blocker");
        let err = prepare_movie_output(&blocker, "m4v").expect_err("should fail");
        assert!(matches!(err, AppError::NoOutputTarget(_)));
    }

    #[test]
    fn stale_dirs_of_other_processes_are_swept() {
        let root = tempfile::tempdir().expect("tempdir");
        let other = root.path().join("Previews").join("999999999");
        fs::create_dir_all(&other).expect("other dir");
        let own = prepare_movie_output(root.path(), "m4v").expect("own dir");

        let removed = cleanup_stale_preview_dirs(root.path(), Duration::ZERO);
        assert_eq!(removed, 1);
        assert!(!other.exists());
        assert!(own.parent().is_some_and(Path::exists));

        cleanup_preview_dir(root.path());
        assert!(!preview_dir(root.path()).exists());
    }

    #[test]
    fn recent_dirs_are_kept() {
        let root = tempfile::tempdir().expect("tempdir");
        let other = root.path().join("Previews").join("999999998");
        fs::create_dir_all(&other).expect("other dir");
        let removed = cleanup_stale_preview_dirs(root.path(), Duration::from_secs(3600));
        assert_eq!(removed, 0);
        assert!(other.exists());
    }
}
