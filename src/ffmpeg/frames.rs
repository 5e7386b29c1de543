//! Still extraction by running ffmpeg once per frame.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::RwLock;

use super::args::build_still_args;
use super::discovery::get_ffmpeg_path;
use crate::engine::FrameSource;
use crate::frame::RawFrame;
use crate::job::{CropRect, Geometry, Title, seek_point_seconds};

/// Frame source over scanned titles. Seek points are spread the same way the
/// movie encoder spreads them, so still N and clip N start at the same spot.
pub struct FfmpegFrameSource {
    titles: RwLock<HashMap<u32, Title>>,
    images_count: AtomicU32,
}

impl FfmpegFrameSource {
    pub fn new(images_count: u32) -> Self {
        Self {
            titles: RwLock::new(HashMap::new()),
            images_count: AtomicU32::new(images_count.max(1)),
        }
    }

    /// Registers (or replaces) a scanned title.
    pub fn add_title(&self, title: Title) {
        self.titles.write().insert(title.index, title);
    }

    pub fn title(&self, index: u32) -> Option<Title> {
        self.titles.read().get(&index).cloned()
    }

    pub fn images_count(&self) -> u32 {
        self.images_count.load(Ordering::Relaxed)
    }

    /// Must match the count the stills are requested against. A
    /// [`PreviewImageStore`](crate::PreviewImageStore) built over this source
    /// sets it.
    pub fn set_images_count(&self, images_count: u32) {
        self.images_count.store(images_count.max(1), Ordering::Relaxed);
    }
}

impl FrameSource for FfmpegFrameSource {
    fn extract_frame(
        &self,
        title_index: u32,
        preview_index: u32,
        geometry: &Geometry,
        crop: &CropRect,
        deinterlace: bool,
    ) -> Option<RawFrame> {
        let title = self.title(title_index)?;
        let ffmpeg = match get_ffmpeg_path() {
            Ok(path) => path,
            Err(e) => {
                log::warn!(target: "tiny_preview::ffmpeg::frames", "extract_frame: {}", e);
                return None;
            }
        };

        let seek = seek_point_seconds(title.duration_secs, preview_index + 1, self.images_count());
        let args = build_still_args(
            &title.source,
            (title.width, title.height),
            seek,
            geometry,
            crop,
            deinterlace,
        );
        log::debug!(
            target: "tiny_preview::ffmpeg::frames",
            "extract_frame: title={}, index={}, seek={:.3}",
            title_index,
            preview_index,
            seek
        );

        let mut cmd = Command::new(ffmpeg);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                log::warn!(
                    target: "tiny_preview::ffmpeg::frames",
                    "Failed to spawn FFmpeg for still: {}",
                    e
                );
                return None;
            }
        };

        if !output.status.success() {
            log::warn!(
                target: "tiny_preview::ffmpeg::frames",
                "Still extraction failed (code={:?}): {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let expected = geometry.width as usize * geometry.height as usize * 4;
        if output.stdout.len() != expected {
            log::warn!(
                target: "tiny_preview::ffmpeg::frames",
                "Still has {} bytes, expected {}",
                output.stdout.len(),
                expected
            );
            return None;
        }
        Some(RawFrame::packed(geometry.width, geometry.height, output.stdout))
    }

    fn set_seek_points(&self, images_count: u32) {
        self.set_images_count(images_count);
    }
}
