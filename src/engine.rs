//! Seams to the transcoding engine.
//!
//! The pipeline only sees these traits. `crate::ffmpeg` provides the
//! implementation backed by an external ffmpeg binary; tests script their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use crate::error::AppError;
use crate::frame::RawFrame;
use crate::job::{CropRect, Geometry, PreviewJobSpec};

/// Payload of a "working" event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressInfo {
    /// Fraction done, 0.0 to 1.0.
    pub progress: f64,
    /// Frames per second over the last interval.
    pub rate_current: f64,
    pub rate_average: f64,
    pub eta_hours: u32,
    pub eta_minutes: u32,
    pub eta_seconds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoneStatus {
    Completed,
    /// Stopped on request.
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Working(ProgressInfo),
    Muxing,
    Done(DoneStatus),
}

/// Extracts single decoded frames from a scanned title. Called synchronously
/// on the thread asking for the still.
pub trait FrameSource: Send + Sync {
    fn extract_frame(
        &self,
        title_index: u32,
        preview_index: u32,
        geometry: &Geometry,
        crop: &CropRect,
        deinterlace: bool,
    ) -> Option<RawFrame>;

    /// Number of seek points `preview_index` is spread over. Sources that
    /// compute seek times themselves must use this count.
    fn set_seek_points(&self, _images_count: u32) {}
}

/// Creates engine instances dedicated to one preview encode each.
pub trait EngineFactory: Send + Sync + 'static {
    type Instance: EngineInstance;

    fn create_instance(&self, log_level: u8) -> Result<Self::Instance, AppError>;
}

/// One independent engine context with its own threads.
///
/// Events must only be sent through the sink given to `subscribe`, and the
/// engine must emit exactly one `Done` for every successful `start`.
pub trait EngineInstance: Send + 'static {
    fn submit(&mut self, spec: PreviewJobSpec) -> Result<(), AppError>;
    fn subscribe(&mut self, sink: EventSink);
    fn unsubscribe(&mut self);
    fn start(&mut self) -> Result<(), AppError>;
    /// Requests a stop. Returns immediately; `Done` follows asynchronously.
    fn stop(&mut self);
}

pub(crate) struct Envelope {
    pub(crate) subscription: u64,
    pub(crate) event: EngineEvent,
}

/// Sending half of one event subscription. Cheap to clone; every clone goes
/// quiet once the subscription is detached.
#[derive(Clone)]
pub struct EventSink {
    subscription: u64,
    active: Arc<AtomicBool>,
    sender: Sender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(subscription: u64, active: Arc<AtomicBool>, sender: Sender<Envelope>) -> Self {
        Self {
            subscription,
            active,
            sender,
        }
    }

    /// Queues `event` for delivery. Returns false when the subscription is
    /// detached or the receiving side is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.sender
            .send(Envelope {
                subscription: self.subscription,
                event,
            })
            .is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
