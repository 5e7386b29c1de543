//! Encode settings a preview is rendered against.
//!
//! This is the slice of the job/title model the preview pipeline reads. It is
//! owned by the caller; the pipeline never mutates it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine time base: ticks per second.
pub const TICK_RATE: u64 = 90_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Title {
    pub index: u32,
    pub source: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

/// Pixels removed from each edge of the source picture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRect {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl CropRect {
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Size left after cropping a `width` x `height` picture. Never below 1x1.
    pub fn cropped_size(&self, width: u32, height: u32) -> (u32, u32) {
        let w = width.saturating_sub(self.left.saturating_add(self.right)).max(1);
        let h = height.saturating_sub(self.top.saturating_add(self.bottom)).max(1);
        (w, h)
    }
}

/// Output picture size. `par_num`/`par_den` is the pixel aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_par")]
    pub par_num: u32,
    #[serde(default = "default_par")]
    pub par_den: u32,
}

fn default_par() -> u32 {
    1
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            par_num: 1,
            par_den: 1,
        }
    }

    /// Same size with square pixels. Stills are always extracted this way;
    /// aspect correction is left to whoever displays them.
    pub fn square_pixels(&self) -> Self {
        Self {
            par_num: 1,
            par_den: 1,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    #[serde(default)]
    pub deinterlace: bool,
    #[serde(default)]
    pub decomb: bool,
}

impl FilterSettings {
    /// Whether frames pulled for previews should be deinterlaced.
    pub fn wants_deinterlace(&self) -> bool {
        self.deinterlace || self.decomb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
    WebM,
}

impl Container {
    /// File extension for a preview movie, or None when previews cannot be
    /// written in this container.
    pub fn preview_extension(self) -> Option<&'static str> {
        match self {
            Container::Mp4 => Some("m4v"),
            Container::Mkv => Some("mkv"),
            Container::WebM => None,
        }
    }

    /// Muxer name passed to ffmpeg's `-f`.
    pub fn muxer(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mkv => "matroska",
            Container::WebM => "webm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeJob {
    pub title: Title,
    #[serde(default)]
    pub crop: CropRect,
    pub geometry: Geometry,
    #[serde(default)]
    pub filters: FilterSettings,
    pub container: Container,
}

/// Parameters of one preview-movie encode. Built per request and moved into
/// the engine instance on submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewJobSpec {
    pub job: EncodeJob,
    pub output_path: PathBuf,
    pub container: Container,
    /// 1-based seek point the clip starts at.
    pub start_at_preview: u32,
    pub seek_points: u32,
    /// Stop point in engine ticks, relative to the start.
    pub pts_to_stop: u64,
}

impl PreviewJobSpec {
    pub fn new(
        job: &EncodeJob,
        output_path: PathBuf,
        preview_index: u32,
        images_count: u32,
        duration_secs: u32,
    ) -> Self {
        Self {
            job: job.clone(),
            output_path,
            container: job.container,
            start_at_preview: preview_index + 1,
            seek_points: images_count,
            pts_to_stop: u64::from(duration_secs) * TICK_RATE,
        }
    }

    /// Offset into the title where the clip begins, in seconds.
    pub fn start_seconds(&self) -> f64 {
        seek_point_seconds(
            self.job.title.duration_secs,
            self.start_at_preview,
            self.seek_points,
        )
    }

    pub fn duration_seconds(&self) -> f64 {
        self.pts_to_stop as f64 / TICK_RATE as f64
    }
}

/// Position of 1-based seek point `point` among `count` points spread evenly
/// over `title_duration`, excluding both ends.
pub fn seek_point_seconds(title_duration: f64, point: u32, count: u32) -> f64 {
    if !title_duration.is_finite() || title_duration <= 0.0 {
        return 0.0;
    }
    title_duration * f64::from(point) / f64::from(count + 1)
}

#[cfg(test)]
pub(crate) fn sample_job(container: Container) -> EncodeJob {
    EncodeJob {
        title: Title {
            index: 1,
            source: PathBuf::from("/media/source.mkv"),
            duration_secs: 110.0,
            width: 1920,
            height: 1080,
        },
        crop: CropRect::default(),
        geometry: Geometry::new(1280, 720),
        filters: FilterSettings::default(),
        container,
    }
}
