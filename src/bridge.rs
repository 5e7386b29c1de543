//! Delivery of engine events to the preview session.
//!
//! Every engine instance gets its own [`EventSink`], but all sinks feed one
//! channel drained by a single dispatcher thread. Handlers therefore run one
//! at a time, in emission order, and never reentrantly. Only envelopes from
//! the currently attached subscription are delivered.

use std::io;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::engine::{EngineEvent, Envelope, EventSink};

const NO_SUBSCRIPTION: u64 = 0;

/// Receives events on the dispatcher thread.
pub(crate) trait EventHandler: Send + Sync + 'static {
    fn handle_event(&self, event: EngineEvent);
}

pub(crate) struct EngineEventBridge {
    sender: Sender<Envelope>,
    current: Arc<AtomicU64>,
    next_subscription: AtomicU64,
}

/// Receiving half, consumed by [`Dispatcher::spawn`].
pub(crate) struct Dispatcher {
    receiver: Receiver<Envelope>,
    current: Arc<AtomicU64>,
}

/// Handle to an attached subscription. Detaching is idempotent.
pub(crate) struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    current: Arc<AtomicU64>,
}

impl EngineEventBridge {
    pub(crate) fn new() -> (Self, Dispatcher) {
        let (sender, receiver) = unbounded();
        let current = Arc::new(AtomicU64::new(NO_SUBSCRIPTION));
        let bridge = Self {
            sender,
            current: Arc::clone(&current),
            next_subscription: AtomicU64::new(1),
        };
        (bridge, Dispatcher { receiver, current })
    }

    /// Starts a new subscription, superseding any previous one.
    pub(crate) fn attach(&self) -> (Subscription, EventSink) {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.current.store(id, Ordering::Release);
        log::debug!(
            target: "tiny_preview::bridge",
            "attached subscription {}",
            id
        );
        let sink = EventSink::new(id, Arc::clone(&active), self.sender.clone());
        let subscription = Subscription {
            id,
            active,
            current: Arc::clone(&self.current),
        };
        (subscription, sink)
    }
}

impl Subscription {
    pub(crate) fn detach(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            let _ = self.current.compare_exchange(
                self.id,
                NO_SUBSCRIPTION,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            log::debug!(
                target: "tiny_preview::bridge",
                "detached subscription {}",
                self.id
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Dispatcher {
    /// Runs the dispatch loop on a dedicated thread. The loop ends when every
    /// sender is gone or the handler has been dropped.
    pub(crate) fn spawn<H: EventHandler>(self, handler: Weak<H>) -> io::Result<()> {
        thread::Builder::new()
            .name("tiny-preview-events".to_string())
            .spawn(move || self.run(handler))?;
        Ok(())
    }

    fn run<H: EventHandler>(self, handler: Weak<H>) {
        while let Ok(envelope) = self.receiver.recv() {
            if envelope.subscription != self.current.load(Ordering::Acquire) {
                log::trace!(
                    target: "tiny_preview::bridge",
                    "dropping {:?} from stale subscription {}",
                    envelope.event,
                    envelope.subscription
                );
                continue;
            }
            let Some(handler) = handler.upgrade() else {
                break;
            };
            handler.handle_event(envelope.event);
        }
        log::debug!(target: "tiny_preview::bridge", "dispatcher stopped");
    }
}
