#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tiny_preview_core::error::AppError;
use tiny_preview_core::{
    Container, CropRect, DoneStatus, EncodeJob, EngineEvent, EngineFactory, EngineInstance,
    EventSink, FilterSettings, FrameSource, Geometry, PreviewConfig, PreviewDelegate,
    PreviewJobSpec, RawFrame, Title,
};

pub const WAIT: Duration = Duration::from_secs(5);
/// How long to wait before concluding no further callback is coming.
pub const QUIET: Duration = Duration::from_millis(150);

pub fn job(container: Container) -> EncodeJob {
    EncodeJob {
        title: Title {
            index: 1,
            source: PathBuf::from("/media/feature.mkv"),
            duration_secs: 110.0,
            width: 1920,
            height: 1080,
        },
        crop: CropRect::default(),
        geometry: Geometry::new(64, 36),
        filters: FilterSettings::default(),
        container,
    }
}

pub fn config(support_dir: &Path, images_count: u32) -> PreviewConfig {
    PreviewConfig {
        images_count: Some(images_count),
        engine_log_level: Some(0),
        support_dir: Some(support_dir.to_path_buf()),
    }
}

/// State shared between a [`FakeEngineFactory`] and every instance it made.
#[derive(Default)]
pub struct FakeEngineState {
    pub created: AtomicUsize,
    pub submitted: Mutex<Vec<PreviewJobSpec>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    /// Report `Done(Cancelled)` when stopped, as a real engine does.
    pub done_on_stop: AtomicBool,
    last_sink: Mutex<Option<EventSink>>,
}

/// Scripted engine: the test drives events through [`FakeEngineFactory::emit`].
#[derive(Clone, Default)]
pub struct FakeEngineFactory {
    pub state: Arc<FakeEngineState>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `event` through the sink of the most recently subscribed
    /// instance. Returns false once that subscription is detached.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let sink = self.state.last_sink.lock().clone();
        sink.is_some_and(|sink| sink.emit(event))
    }

    /// Sink of the most recently subscribed instance.
    pub fn last_sink(&self) -> Option<EventSink> {
        self.state.last_sink.lock().clone()
    }

    pub fn submitted(&self) -> Vec<PreviewJobSpec> {
        self.state.submitted.lock().clone()
    }

    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.state.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }
}

pub struct FakeEngine {
    state: Arc<FakeEngineState>,
    sink: Option<EventSink>,
}

impl EngineFactory for FakeEngineFactory {
    type Instance = FakeEngine;

    fn create_instance(&self, _log_level: u8) -> Result<FakeEngine, AppError> {
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::EngineFailed("no engine".to_string()));
        }
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine {
            state: Arc::clone(&self.state),
            sink: None,
        })
    }
}

impl EngineInstance for FakeEngine {
    fn submit(&mut self, spec: PreviewJobSpec) -> Result<(), AppError> {
        self.state.submitted.lock().push(spec);
        Ok(())
    }

    fn subscribe(&mut self, sink: EventSink) {
        *self.state.last_sink.lock() = Some(sink.clone());
        self.sink = Some(sink);
    }

    fn unsubscribe(&mut self) {
        self.state.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.sink = None;
    }

    fn start(&mut self) -> Result<(), AppError> {
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(AppError::EngineFailed("start refused".to_string()));
        }
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        if self.state.done_on_stop.load(Ordering::SeqCst)
            && let Some(sink) = &self.sink
        {
            sink.emit(EngineEvent::Done(DoneStatus::Cancelled));
        }
    }
}

/// Frame source producing solid frames; the red channel encodes the index.
#[derive(Default)]
pub struct FakeFrameSource {
    pub calls: AtomicUsize,
    pub last_deinterlace: AtomicBool,
    pub seek_points: AtomicU32,
    /// Indices for which no frame is available.
    pub missing: Mutex<Vec<u32>>,
}

impl FakeFrameSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// One 0xAARRGGBB word in host order.
pub fn pixel_word(r: u8, g: u8, b: u8) -> [u8; 4] {
    (0xFF00_0000u32 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)).to_ne_bytes()
}

impl FrameSource for FakeFrameSource {
    fn extract_frame(
        &self,
        _title_index: u32,
        preview_index: u32,
        geometry: &Geometry,
        _crop: &CropRect,
        deinterlace: bool,
    ) -> Option<RawFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_deinterlace.store(deinterlace, Ordering::SeqCst);
        if self.missing.lock().contains(&preview_index) {
            return None;
        }
        let word = pixel_word(preview_index as u8, 0x20, 0x30);
        let pixels = geometry.width as usize * geometry.height as usize;
        let data = word.iter().copied().cycle().take(pixels * 4).collect();
        Some(RawFrame::packed(geometry.width, geometry.height, data))
    }

    fn set_seek_points(&self, images_count: u32) {
        self.seek_points.store(images_count, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DelegateCall {
    Progress(f64, String),
    Ready(PathBuf),
    Cancelled,
    Failed(String),
}

impl DelegateCall {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DelegateCall::Progress(..))
    }
}

/// Delegate that forwards every callback to a channel.
pub struct RecordingDelegate {
    tx: Sender<DelegateCall>,
}

impl RecordingDelegate {
    pub fn new() -> (Arc<Self>, Receiver<DelegateCall>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl PreviewDelegate for RecordingDelegate {
    fn on_progress(&self, percent: f64, info: &str) {
        let _ = self.tx.send(DelegateCall::Progress(percent, info.to_string()));
    }

    fn on_movie_ready(&self, path: &Path) {
        let _ = self.tx.send(DelegateCall::Ready(path.to_path_buf()));
    }

    fn on_movie_cancelled(&self) {
        let _ = self.tx.send(DelegateCall::Cancelled);
    }

    fn on_movie_failed(&self, error: &AppError) {
        let _ = self.tx.send(DelegateCall::Failed(error.to_string()));
    }
}

/// Receives calls until the first terminal one, returning all of them.
pub fn until_terminal(rx: &Receiver<DelegateCall>) -> Vec<DelegateCall> {
    let mut calls = Vec::new();
    loop {
        let call = rx.recv_timeout(WAIT).expect("terminal callback");
        let terminal = call.is_terminal();
        calls.push(call);
        if terminal {
            return calls;
        }
    }
}

/// Temp dir plus a resolved ffmpeg, for tests that run the real binary.
pub struct IntegrationEnv {
    pub ffmpeg: PathBuf,
    dir: tempfile::TempDir,
}

impl IntegrationEnv {
    pub fn new() -> Self {
        let ffmpeg = tiny_preview_core::ffmpeg::discovery::get_ffmpeg_path()
            .expect("FFmpeg not found")
            .to_path_buf();
        let dir = tempfile::tempdir().expect("tempdir");
        Self { ffmpeg, dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes a 320x240 test pattern clip.
    pub fn with_test_video(&self, name: &str, duration_secs: f32) -> PathBuf {
        let output_path = self.path(name);
        let status = std::process::Command::new(&self.ffmpeg)
            .args([
                "-loglevel",
                "error",
                "-y",
                "-f",
                "lavfi",
                "-i",
                &format!("testsrc=duration={}:size=320x240:rate=30", duration_secs),
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                output_path.to_string_lossy().as_ref(),
            ])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .expect("failed to create test video");
        assert!(status.success(), "ffmpeg failed to create test video");
        output_path
    }
}
