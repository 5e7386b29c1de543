//! Preview-movie encode session.
//!
//! ```text
//! Idle --create_movie--> Working --muxing--> Muxing
//!                           |                  |
//!                           +------done--------+--> Terminating --> Idle
//! ```
//!
//! The session owns the engine instance for the lifetime of one request.
//! `cancel` only sets a flag and asks the engine to stop; the transition back
//! to `Idle` and the terminal callback happen when the engine reports done.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::{EngineEventBridge, EventHandler, Subscription};
use crate::config::PreviewConfig;
use crate::engine::{DoneStatus, EngineEvent, EngineFactory, EngineInstance, ProgressInfo};
use crate::error::AppError;
use crate::job::{EncodeJob, PreviewJobSpec};
use crate::temp;

const MUXING_TEXT: &str = "Muxing Preview…";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Working,
    Muxing,
    Terminating,
}

impl SessionState {
    /// Whether an encode is in flight (or still tearing down).
    pub fn is_busy(self) -> bool {
        self != SessionState::Idle
    }
}

/// Caller-side notifications. All methods run on the event dispatcher thread,
/// one at a time.
///
/// The session is already back in [`SessionState::Idle`] when a terminal
/// callback (`on_movie_ready`, `on_movie_cancelled`, `on_movie_failed`) runs,
/// so `state()` reads `Idle` there and `create_movie` may be called directly.
pub trait PreviewDelegate: Send + Sync + 'static {
    fn on_progress(&self, percent: f64, info: &str);

    fn on_movie_ready(&self, path: &Path);

    fn on_movie_cancelled(&self);

    /// The engine finished without producing a movie and no cancel was requested.
    fn on_movie_failed(&self, error: &AppError) {
        log::warn!(
            target: "tiny_preview::session",
            "preview movie failed: {}",
            error
        );
    }
}

struct SessionSlot<I> {
    state: SessionState,
    cancelled: bool,
    engine: Option<I>,
    subscription: Option<Subscription>,
    output_path: Option<PathBuf>,
}

struct SessionShared<F: EngineFactory> {
    factory: F,
    delegate: Arc<dyn PreviewDelegate>,
    images_count: u32,
    engine_log_level: u8,
    support_dir: PathBuf,
    bridge: EngineEventBridge,
    slot: Mutex<SessionSlot<F::Instance>>,
}

pub struct PreviewEncodeSession<F: EngineFactory> {
    shared: Arc<SessionShared<F>>,
}

impl<F: EngineFactory> PreviewEncodeSession<F> {
    pub fn new(
        factory: F,
        config: &PreviewConfig,
        delegate: Arc<dyn PreviewDelegate>,
    ) -> Result<Self, AppError> {
        let (bridge, dispatcher) = EngineEventBridge::new();
        let shared = Arc::new(SessionShared {
            factory,
            delegate,
            images_count: config.effective_images_count(),
            engine_log_level: config.effective_engine_log_level(),
            support_dir: config.effective_support_dir(),
            bridge,
            slot: Mutex::new(SessionSlot {
                state: SessionState::Idle,
                cancelled: false,
                engine: None,
                subscription: None,
                output_path: None,
            }),
        });
        dispatcher.spawn(Arc::downgrade(&shared))?;
        Ok(Self { shared })
    }

    pub fn state(&self) -> SessionState {
        self.shared.slot.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_busy()
    }

    pub fn images_count(&self) -> u32 {
        self.shared.images_count
    }

    pub fn support_dir(&self) -> &Path {
        &self.shared.support_dir
    }

    /// Starts encoding a `duration_secs` clip beginning at still `index`.
    /// Returns the path the movie will be written to. On error nothing has
    /// changed and no engine instance is left behind.
    pub fn create_movie(
        &self,
        job: &EncodeJob,
        index: u32,
        duration_secs: u32,
    ) -> Result<PathBuf, AppError> {
        let shared = &self.shared;
        let mut slot = shared.slot.lock();
        if slot.state != SessionState::Idle {
            return Err(AppError::AlreadyRunning);
        }
        if index >= shared.images_count {
            return Err(AppError::invalid_index(index, shared.images_count));
        }

        let extension = job.container.preview_extension().ok_or_else(|| {
            AppError::no_output_target(format!(
                "{:?} container cannot hold a preview movie",
                job.container
            ))
        })?;
        let output_path = temp::prepare_movie_output(&shared.support_dir, extension)?;
        let spec = PreviewJobSpec::new(
            job,
            output_path.clone(),
            index,
            shared.images_count,
            duration_secs,
        );
        log::info!(
            target: "tiny_preview::session",
            "create_movie: index={}, duration={}s, start_at_preview={}, pts_to_stop={}, output={}",
            index,
            duration_secs,
            spec.start_at_preview,
            spec.pts_to_stop,
            output_path.display()
        );

        let mut engine = shared.factory.create_instance(shared.engine_log_level)?;
        engine.submit(spec)?;
        let (subscription, sink) = shared.bridge.attach();
        engine.subscribe(sink);
        slot.cancelled = false;
        if let Err(err) = engine.start() {
            log::error!(
                target: "tiny_preview::session",
                "create_movie: engine failed to start: {}",
                err
            );
            subscription.detach();
            engine.unsubscribe();
            return Err(err);
        }

        slot.engine = Some(engine);
        slot.subscription = Some(subscription);
        slot.output_path = Some(output_path.clone());
        slot.state = SessionState::Working;
        Ok(output_path)
    }

    /// Asks a running encode to stop. No-op when idle or already terminating.
    pub fn cancel(&self) {
        let mut slot = self.shared.slot.lock();
        if !matches!(slot.state, SessionState::Working | SessionState::Muxing) {
            return;
        }
        log::info!(target: "tiny_preview::session", "cancel requested");
        slot.cancelled = true;
        if let Some(engine) = slot.engine.as_mut() {
            engine.stop();
        }
    }
}

impl<F: EngineFactory> SessionShared<F> {
    fn on_working(&self, info: &ProgressInfo) {
        if self.slot.lock().state != SessionState::Working {
            return;
        }
        let (percent, text) = progress_text(info);
        self.delegate.on_progress(percent, &text);
    }

    fn on_muxing(&self) {
        {
            let mut slot = self.slot.lock();
            if slot.state != SessionState::Working {
                return;
            }
            slot.state = SessionState::Muxing;
        }
        self.delegate.on_progress(100.0, MUXING_TEXT);
    }

    fn on_done(&self, status: DoneStatus) {
        let (engine, output_path, cancelled) = {
            let mut slot = self.slot.lock();
            if !matches!(slot.state, SessionState::Working | SessionState::Muxing) {
                log::debug!(
                    target: "tiny_preview::session",
                    "ignoring done in state {:?}",
                    slot.state
                );
                return;
            }
            slot.state = SessionState::Terminating;
            if let Some(subscription) = slot.subscription.take() {
                subscription.detach();
            }
            (slot.engine.take(), slot.output_path.take(), slot.cancelled)
        };

        if let Some(mut engine) = engine {
            engine.unsubscribe();
            engine.stop();
        }

        {
            let mut slot = self.slot.lock();
            slot.cancelled = false;
            slot.state = SessionState::Idle;
        }

        log::info!(
            target: "tiny_preview::session",
            "preview movie finished: status={:?}, cancelled={}",
            status,
            cancelled
        );
        if cancelled {
            self.delegate.on_movie_cancelled();
            return;
        }
        match (status, output_path) {
            (DoneStatus::Completed, Some(path)) => self.delegate.on_movie_ready(&path),
            (DoneStatus::Completed, None) => self
                .delegate
                .on_movie_failed(&AppError::no_output_target("output path was lost")),
            (DoneStatus::Cancelled, _) => self.delegate.on_movie_failed(&AppError::Aborted),
            (DoneStatus::Failed(reason), _) => {
                self.delegate.on_movie_failed(&AppError::EngineFailed(reason))
            }
        }
    }
}

impl<F: EngineFactory> EventHandler for SessionShared<F> {
    fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Working(info) => self.on_working(&info),
            EngineEvent::Muxing => self.on_muxing(),
            EngineEvent::Done(status) => self.on_done(status),
        }
    }
}

impl<F: EngineFactory> Drop for SessionShared<F> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut();
        if let Some(subscription) = slot.subscription.take() {
            subscription.detach();
        }
        if let Some(mut engine) = slot.engine.take() {
            log::debug!(
                target: "tiny_preview::session",
                "stopping engine of dropped session"
            );
            engine.unsubscribe();
            engine.stop();
        }
    }
}

/// Percentage and status line for a working event.
pub fn progress_text(info: &ProgressInfo) -> (f64, String) {
    let percent = (info.progress * 100.0).clamp(0.0, 100.0);
    let mut text = format!("Encoding preview:  {:.2} %", percent);
    if info.rate_average > 0.0 {
        let _ = write!(
            text,
            " ({:.2} fps, avg {:.2} fps, ETA {:02}h{:02}m{:02}s)",
            info.rate_current,
            info.rate_average,
            info.eta_hours,
            info.eta_minutes,
            info.eta_seconds
        );
    }
    (percent, text)
}
