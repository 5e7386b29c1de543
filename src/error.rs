//! Error type shared by the preview pipeline, the ffmpeg engine and the sidecar.
//! Implements Display and Serialize for the frontend.

use crate::ffmpeg::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Preview index {index} is out of range (0..{count})")]
    InvalidIndex { index: u32, count: u32 },

    #[error("A preview movie is already being encoded")]
    AlreadyRunning,

    #[error("No output target for preview movie: {0}")]
    NoOutputTarget(String),

    #[error("Engine failed: {0}")]
    EngineFailed(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg failed (code {code}): {stderr}")]
    FfmpegFailed { code: i32, stderr: String },

    #[error("Aborted")]
    Aborted,
}

impl AppError {
    pub fn invalid_index(index: u32, count: u32) -> Self {
        Self::InvalidIndex { index, count }
    }

    pub fn no_output_target(reason: impl Into<String>) -> Self {
        Self::NoOutputTarget(reason.into())
    }

    pub fn ffmpeg_failed(code: i32, stderr: impl Into<String>) -> Self {
        Self::FfmpegFailed {
            code,
            stderr: stderr.into(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AppError::FfmpegFailed { code, stderr } => {
                let payload = parse_ffmpeg_error(stderr, Some(*code));
                let json =
                    serde_json::json!({ "summary": payload.summary, "detail": payload.detail });
                serializer.serialize_str(&json.to_string())
            }
            _ => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        if s == "Aborted" {
            AppError::Aborted
        } else {
            AppError::FfmpegFailed {
                code: -1,
                stderr: s,
            }
        }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
