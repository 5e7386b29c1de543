mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod frame;
mod generator;
pub mod job;
pub mod session;
mod store;
pub mod temp;

pub use config::PreviewConfig;
pub use engine::{
    DoneStatus, EngineEvent, EngineFactory, EngineInstance, EventSink, FrameSource, ProgressInfo,
};
pub use error::AppError;
pub use frame::{PreviewImage, RawFrame, convert};
pub use generator::PreviewGenerator;
pub use job::{Container, CropRect, EncodeJob, FilterSettings, Geometry, PreviewJobSpec, Title};
pub use session::{PreviewDelegate, PreviewEncodeSession, SessionState, progress_text};
pub use store::PreviewImageStore;
