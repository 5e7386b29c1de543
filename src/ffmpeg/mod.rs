//! FFmpeg-backed engine: title probing, still extraction and preview encodes.

mod args;
pub mod discovery;
mod engine;
mod error;
mod frames;
pub mod probe;
mod progress;

pub use args::{build_preview_args, build_still_args, loglevel_for, video_filter};
pub use engine::{FfmpegEngine, FfmpegEngineFactory};
pub use error::{FfmpegErrorPayload, parse_ffmpeg_error};
pub use frames::FfmpegFrameSource;
pub use probe::probe_title;

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}
