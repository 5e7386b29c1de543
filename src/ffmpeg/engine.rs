//! Engine instances backed by an ffmpeg child process.
//!
//! Each instance runs at most one encode. A worker thread parses the progress
//! stream on stdout and reports through the subscribed sink; stderr is kept
//! (bounded) so a failure can be summarized.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use parking_lot::Mutex;

use super::args::build_preview_args;
use super::discovery::get_ffmpeg_path;
use super::error::parse_ffmpeg_error;
use super::progress::ProgressTracker;
use crate::engine::{DoneStatus, EngineEvent, EngineFactory, EngineInstance, EventSink};
use crate::error::AppError;
use crate::job::PreviewJobSpec;

/// Keep only the last N bytes of stderr.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Creates [`FfmpegEngine`]s using the ffmpeg found by discovery.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngineFactory {
    ffmpeg_path: Option<PathBuf>,
}

impl FfmpegEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `path` instead of searching for ffmpeg.
    pub fn with_ffmpeg_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: Some(path.into()),
        }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    type Instance = FfmpegEngine;

    fn create_instance(&self, log_level: u8) -> Result<FfmpegEngine, AppError> {
        let ffmpeg = match &self.ffmpeg_path {
            Some(path) => path.clone(),
            None => get_ffmpeg_path()?.to_path_buf(),
        };
        Ok(FfmpegEngine::new(ffmpeg, log_level))
    }
}

type SharedSink = Arc<Mutex<Option<EventSink>>>;

pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    log_level: u8,
    spec: Option<PreviewJobSpec>,
    sink: SharedSink,
    child: Arc<Mutex<Option<Child>>>,
    killed: Arc<AtomicBool>,
    started: bool,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: PathBuf, log_level: u8) -> Self {
        Self {
            ffmpeg,
            log_level,
            spec: None,
            sink: Arc::new(Mutex::new(None)),
            child: Arc::new(Mutex::new(None)),
            killed: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }
}

fn emit(sink: &SharedSink, event: EngineEvent) {
    let current = sink.lock().clone();
    if let Some(sink) = current {
        sink.emit(event);
    }
}

fn collect_stderr<R: Read + Send + 'static>(
    reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::with_capacity(256);
        while reader.read_until(b'\n', &mut line).unwrap_or(0) > 0 {
            let mut guard = buffer.lock();
            guard.extend_from_slice(&line);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            line.clear();
        }
    })
}

impl EngineInstance for FfmpegEngine {
    fn submit(&mut self, spec: PreviewJobSpec) -> Result<(), AppError> {
        if self.started {
            return Err(AppError::EngineFailed(
                "engine instance already started".to_string(),
            ));
        }
        self.spec = Some(spec);
        Ok(())
    }

    fn subscribe(&mut self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn unsubscribe(&mut self) {
        self.sink.lock().take();
    }

    fn start(&mut self) -> Result<(), AppError> {
        if self.started {
            return Err(AppError::EngineFailed(
                "engine instance already started".to_string(),
            ));
        }
        let spec = self
            .spec
            .take()
            .ok_or_else(|| AppError::EngineFailed("no job submitted".to_string()))?;
        let args = build_preview_args(&spec, self.log_level);
        log::debug!(
            target: "tiny_preview::ffmpeg::engine",
            "Spawning FFmpeg: path={}, output={}",
            self.ffmpeg.display(),
            spec.output_path.display()
        );

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::EngineFailed(format!("Failed to spawn FFmpeg: {}", e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::EngineFailed(
                "Failed to capture FFmpeg output".to_string(),
            ));
        };
        *self.child.lock() = Some(child);
        self.started = true;

        let stderr_buffer = Arc::new(Mutex::new(Vec::new()));
        let stderr_handle = collect_stderr(stderr, Arc::clone(&stderr_buffer));
        let sink = Arc::clone(&self.sink);
        let child_slot = Arc::clone(&self.child);
        let killed = Arc::clone(&self.killed);
        let target_secs = spec.duration_seconds();

        let worker = thread::Builder::new()
            .name("tiny-preview-encode".to_string())
            .spawn(move || {
                let started_at = Instant::now();
                let mut tracker = ProgressTracker::new(target_secs);
                let mut reader = BufReader::new(stdout);
                let mut line = String::with_capacity(64);
                while reader.read_line(&mut line).unwrap_or(0) > 0 {
                    if let Some(event) = tracker.feed(&line, started_at.elapsed()) {
                        emit(&sink, event);
                    }
                    line.clear();
                }
                let _ = stderr_handle.join();

                let child = child_slot.lock().take();
                let status = child.map(|mut c| c.wait());
                let stderr = String::from_utf8_lossy(&stderr_buffer.lock()).to_string();
                let done = match status {
                    _ if killed.load(Ordering::Acquire) => DoneStatus::Cancelled,
                    Some(Ok(status)) if status.success() => DoneStatus::Completed,
                    Some(Ok(status)) => {
                        let payload = parse_ffmpeg_error(&stderr, status.code());
                        log::error!(
                            target: "tiny_preview::ffmpeg::engine",
                            "FFmpeg failed (code={:?}): {}",
                            status.code(),
                            payload.detail
                        );
                        DoneStatus::Failed(payload.summary)
                    }
                    Some(Err(e)) => DoneStatus::Failed(format!("Failed to wait for FFmpeg: {}", e)),
                    None => DoneStatus::Cancelled,
                };
                log::info!(
                    target: "tiny_preview::ffmpeg::engine",
                    "FFmpeg preview finished: {:?}",
                    done
                );
                emit(&sink, EngineEvent::Done(done));
            });

        if let Err(e) = worker {
            self.stop();
            if let Some(mut child) = self.child.lock().take() {
                let _ = child.wait();
            }
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut guard = self.child.lock();
        if let Some(child) = guard.as_mut() {
            log::info!(target: "tiny_preview::ffmpeg::engine", "Terminating FFmpeg process");
            self.killed.store(true, Ordering::Release);
            let _ = child.kill();
        }
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
