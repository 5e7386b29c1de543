//! Locating the ffmpeg and ffprobe binaries.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::AppError;

/// Env override checked before any search.
pub const FFMPEG_PATH_ENV: &str = "TINY_PREVIEW_FFMPEG";

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

fn find_in_path() -> Option<PathBuf> {
    let locator = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };
    let output = Command::new(locator).arg("ffmpeg").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(PathBuf::from(first))
    }
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

/// Resolution order: env override, common install paths, then PATH.
fn resolve_ffmpeg_path(env_override: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(path) = env_override {
        if path.exists() {
            log::debug!(
                target: "tiny_preview::ffmpeg::discovery",
                "FFmpeg path from {}: {}",
                FFMPEG_PATH_ENV,
                path.display()
            );
            return Ok(path);
        }
        log::warn!(
            target: "tiny_preview::ffmpeg::discovery",
            "{} points to a missing file: {}",
            FFMPEG_PATH_ENV,
            path.display()
        );
    }

    if let Some(path) = common_paths().into_iter().find(|p| p.exists()) {
        log::debug!(
            target: "tiny_preview::ffmpeg::discovery",
            "FFmpeg found in common path: {}",
            path.display()
        );
        return Ok(path);
    }

    if let Some(path) = find_in_path().filter(|p| p.exists()) {
        log::debug!(
            target: "tiny_preview::ffmpeg::discovery",
            "FFmpeg found in PATH: {}",
            path.display()
        );
        return Ok(path);
    }

    log::error!(
        target: "tiny_preview::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(AppError::FfmpegNotFound(format!(
        "FFmpeg not found. Install it or set {} to the ffmpeg binary.",
        FFMPEG_PATH_ENV
    )))
}

/// FFmpeg path, resolved once per process.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let env_override = std::env::var_os(FFMPEG_PATH_ENV).map(PathBuf::from);
    let path = resolve_ffmpeg_path(env_override)?;
    Ok(FFMPEG_PATH_CACHE.get_or_init(|| path).as_path())
}

/// ffprobe paths to try next to `ffmpeg_path`: suffixed first, then plain.
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(parent) = ffmpeg_path.parent() else {
        return vec![];
    };
    let exe = if cfg!(target_os = "windows") { ".exe" } else { "" };
    let mut candidates = Vec::with_capacity(2);
    if let Some(suffix) = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix("ffmpeg"))
        .filter(|suffix| !suffix.is_empty())
    {
        candidates.push(parent.join(format!("ffprobe{}{}", suffix, exe)));
    }
    candidates.push(parent.join(format!("ffprobe{}", exe)));
    candidates
}

pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    let candidates = ffprobe_candidates(ffmpeg);
    candidates
        .iter()
        .find(|c| c.exists())
        .cloned()
        .ok_or_else(|| {
            AppError::FfmpegNotFound(format!(
                "ffprobe not found next to {}",
                ffmpeg.display()
            ))
        })
}
