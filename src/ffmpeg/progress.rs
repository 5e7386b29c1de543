//! Parsing of ffmpeg's `-progress pipe:1` output into engine events.
//!
//! FFmpeg writes `key=value` lines in blocks, each closed by
//! `progress=continue` or, once encoding is finished, `progress=end`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::engine::{EngineEvent, ProgressInfo};

static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([a-z_]+)\s*=\s*(\S*)\s*$").expect("invalid progress regex")
});

/// Accumulates one progress block at a time.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    target_secs: f64,
    frames: u64,
    reported_fps: f64,
    out_time_secs: f64,
    speed: f64,
    last_frames: u64,
    last_elapsed: Duration,
}

impl ProgressTracker {
    /// `target_secs` is the clip length being encoded.
    pub(crate) fn new(target_secs: f64) -> Self {
        Self {
            target_secs,
            frames: 0,
            reported_fps: 0.0,
            out_time_secs: 0.0,
            speed: 0.0,
            last_frames: 0,
            last_elapsed: Duration::ZERO,
        }
    }

    /// Feeds one line. `elapsed` is wall time since the encode started.
    /// Returns `Working` at the end of each block and `Muxing` on the last one.
    pub(crate) fn feed(&mut self, line: &str, elapsed: Duration) -> Option<EngineEvent> {
        let caps = KEY_VALUE_RE.captures(line)?;
        let value = &caps[2];
        match &caps[1] {
            "frame" => {
                if let Ok(frames) = value.parse() {
                    self.frames = frames;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.reported_fps = fps;
                }
            }
            // Both are microseconds; out_time_ms is misnamed by ffmpeg.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_secs = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "speed" => {
                if let Ok(speed) = value.trim_end_matches('x').parse() {
                    self.speed = speed;
                }
            }
            "progress" if value == "end" => return Some(EngineEvent::Muxing),
            "progress" => return Some(EngineEvent::Working(self.snapshot(elapsed))),
            _ => {}
        }
        None
    }

    fn snapshot(&mut self, elapsed: Duration) -> ProgressInfo {
        let progress = if self.target_secs > 0.0 {
            (self.out_time_secs / self.target_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let dt = elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        let rate_current = if dt > 0.0 && self.frames >= self.last_frames {
            (self.frames - self.last_frames) as f64 / dt
        } else {
            self.reported_fps
        };
        let rate_average = if self.reported_fps > 0.0 {
            self.reported_fps
        } else if elapsed.as_secs_f64() > 0.0 {
            self.frames as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        self.last_frames = self.frames;
        self.last_elapsed = elapsed;

        let remaining_media = (self.target_secs - self.out_time_secs).max(0.0);
        let eta_total = if self.speed > 0.0 {
            (remaining_media / self.speed).round() as u64
        } else {
            0
        };

        ProgressInfo {
            progress,
            rate_current,
            rate_average,
            eta_hours: (eta_total / 3600) as u32,
            eta_minutes: ((eta_total % 3600) / 60) as u32,
            eta_seconds: (eta_total % 60) as u32,
        }
    }
}
