//! FFmpeg argument builders for stills and preview clips.

use std::path::Path;

use super::path_to_string;
use crate::job::{CropRect, Geometry, PreviewJobSpec};

/// FFmpeg `-loglevel` for an engine log level: 0 quiet-ish, 1 normal, 2+ verbose.
pub fn loglevel_for(level: u8) -> &'static str {
    match level {
        0 => "error",
        1 => "info",
        _ => "debug",
    }
}

/// `-vf` chain applied to both stills and clips: crop, deinterlace, scale.
pub fn video_filter(
    source_size: (u32, u32),
    crop: &CropRect,
    geometry: &Geometry,
    deinterlace: bool,
) -> String {
    let mut filters = Vec::with_capacity(4);
    if !crop.is_empty() {
        let (w, h) = crop.cropped_size(source_size.0, source_size.1);
        filters.push(format!("crop={}:{}:{}:{}", w, h, crop.left, crop.top));
    }
    if deinterlace {
        filters.push("yadif".to_string());
    }
    filters.push(format!("scale={}:{}", geometry.width, geometry.height));
    if geometry.par_num != geometry.par_den {
        filters.push(format!("setsar={}/{}", geometry.par_num, geometry.par_den));
    }
    filters.join(",")
}

fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// Reads exactly one frame at `seek_secs` as packed 32-bit words on stdout.
pub fn build_still_args(
    source: &Path,
    source_size: (u32, u32),
    seek_secs: f64,
    geometry: &Geometry,
    crop: &CropRect,
    deinterlace: bool,
) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format_secs(seek_secs),
        "-i".to_string(),
        path_to_string(source),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        video_filter(source_size, crop, &geometry.square_pixels(), deinterlace),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb32".to_string(),
        "pipe:1".to_string(),
    ]
}

/// Encodes the clip described by `spec`; progress goes to stdout.
pub fn build_preview_args(spec: &PreviewJobSpec, log_level: u8) -> Vec<String> {
    let job = &spec.job;
    let title = &job.title;
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        loglevel_for(log_level).to_string(),
        "-ss".to_string(),
        format_secs(spec.start_seconds()),
        "-i".to_string(),
        path_to_string(&title.source),
        "-t".to_string(),
        format_secs(spec.duration_seconds()),
        "-vf".to_string(),
        video_filter(
            (title.width, title.height),
            &job.crop,
            &job.geometry,
            job.filters.wants_deinterlace(),
        ),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-f".to_string(),
        spec.container.muxer().to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-nostats".to_string(),
        "-y".to_string(),
        path_to_string(&spec.output_path),
    ]
}
