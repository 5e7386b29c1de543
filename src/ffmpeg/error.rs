//! Map FFmpeg exit codes to user-friendly messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure.
//! Stderr is kept as detail for debugging.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

const ELLIPSIS: &str = "…";
const SUMMARY_MAX_LEN: usize = 120;

pub fn parse_ffmpeg_error(stderr: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = match exit_code {
        Some(-1) => "FFmpeg not found or failed to start.".to_string(),
        Some(1) => "FFmpeg failed.".to_string(),
        Some(69) => "Encoding rate limit exceeded.".to_string(),
        Some(123 | 255) => "Encoding was stopped.".to_string(),
        Some(code) => format!("FFmpeg failed (exit code {}).", code),
        None => last_line_truncated(stderr, SUMMARY_MAX_LEN),
    };
    FfmpegErrorPayload {
        summary,
        detail: stderr.trim().to_string(),
    }
}

/// FFmpeg prints the fatal error last, so the last non-empty line is the one
/// worth showing.
fn last_line_truncated(stderr: &str, max_len: usize) -> String {
    let line = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.len() <= max_len {
        return line.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &line[..cut], ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_exit_codes() {
        assert_eq!(parse_ffmpeg_error("", Some(1)).summary, "FFmpeg failed.");
        assert_eq!(parse_ffmpeg_error("", Some(255)).summary, "Encoding was stopped.");
        assert!(parse_ffmpeg_error("", Some(-1)).summary.contains("failed to start"));
    }

    #[test]
    fn unknown_code_keeps_stderr_as_detail() {
        let p = parse_ffmpeg_error("Invalid data found when processing input\n", Some(42));
        assert_eq!(p.summary, "FFmpeg failed (exit code 42).");
        assert_eq!(p.detail, "Invalid data found when processing input");
    }

    #[test]
    fn no_code_uses_last_stderr_line() {
        let p = parse_ffmpeg_error("Input #0, matroska\nConversion failed!\n\n", None);
        assert_eq!(p.summary, "Conversion failed!");
    }

    #[test]
    fn long_line_is_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let p = parse_ffmpeg_error(&long, None);
        assert!(p.summary.len() <= SUMMARY_MAX_LEN);
        assert!(p.summary.ends_with('…'));
    }
}
