//! Title scanning through ffprobe.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::discovery::get_ffprobe_path;
use crate::error::AppError;
use crate::job::Title;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

fn parse_seconds(s: Option<&String>) -> Option<f64> {
    s.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Builds a title from ffprobe JSON. The container duration is preferred,
/// falling back to the video stream's.
pub fn parse_title(json: &str, index: u32, source: &Path) -> Result<Title, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::from(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let video = output
        .streams
        .as_ref()
        .and_then(|streams| streams.iter().find(|s| s.codec_type.as_deref() == Some("video")))
        .ok_or_else(|| {
            AppError::from(format!("No video stream in {}", source.display()))
        })?;

    let duration_secs = parse_seconds(output.format.as_ref().and_then(|f| f.duration.as_ref()))
        .or_else(|| parse_seconds(video.duration.as_ref()))
        .unwrap_or(0.0);

    Ok(Title {
        index,
        source: source.to_path_buf(),
        duration_secs,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
    })
}

/// Runs ffprobe on `source` and returns it as title `index`.
pub fn probe_title(source: &Path, index: u32) -> Result<Title, AppError> {
    let ffprobe = get_ffprobe_path()?;
    log::debug!(
        target: "tiny_preview::ffmpeg::probe",
        "probe_title: source={}",
        source.display()
    );

    let output = Command::new(&ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(source)
        .output()
        .map_err(|e| AppError::from(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::from(format!("ffprobe failed: {}", stderr.trim())));
    }

    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::from("ffprobe output was not valid UTF-8"))?;
    parse_title(&json, index, source)
}
