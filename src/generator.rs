//! Caller-facing preview generator: stills plus one preview movie at a time,
//! both rendered against the current job settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PreviewConfig;
use crate::engine::{EngineFactory, FrameSource};
use crate::error::AppError;
use crate::frame::PreviewImage;
use crate::job::EncodeJob;
use crate::session::{PreviewDelegate, PreviewEncodeSession, SessionState};
use crate::store::PreviewImageStore;

pub struct PreviewGenerator<S: FrameSource, F: EngineFactory> {
    job: EncodeJob,
    store: PreviewImageStore<S>,
    session: PreviewEncodeSession<F>,
}

impl<S: FrameSource, F: EngineFactory> PreviewGenerator<S, F> {
    /// `source` is the engine instance used for scanning; movie encodes get
    /// dedicated instances from `factory` so a scan is never blocked.
    pub fn new(
        job: EncodeJob,
        source: Arc<S>,
        factory: F,
        config: &PreviewConfig,
        delegate: Arc<dyn PreviewDelegate>,
    ) -> Result<Self, AppError> {
        let store = PreviewImageStore::new(source, config.effective_images_count());
        let session = PreviewEncodeSession::new(factory, config, delegate)?;
        log::debug!(
            target: "tiny_preview::generator",
            "generator ready: title={}, images_count={}",
            job.title.index,
            store.images_count()
        );
        Ok(Self {
            job,
            store,
            session,
        })
    }

    pub fn job(&self) -> &EncodeJob {
        &self.job
    }

    /// Replaces the settings used for new stills and movies. Cached stills
    /// are kept; call [`purge_image_cache`](Self::purge_image_cache) when the
    /// change affects the picture.
    pub fn set_job(&mut self, job: EncodeJob) {
        self.job = job;
    }

    pub fn images_count(&self) -> u32 {
        self.store.images_count()
    }

    pub fn image_at(
        &mut self,
        index: u32,
        cache_result: bool,
    ) -> Result<Option<Arc<PreviewImage>>, AppError> {
        self.store.get_image(&self.job, index, cache_result)
    }

    pub fn cached_image_count(&self) -> usize {
        self.store.cached_count()
    }

    pub fn purge_image_cache(&mut self) {
        self.store.purge();
    }

    pub fn create_movie(&self, index: u32, duration_secs: u32) -> Result<PathBuf, AppError> {
        self.session.create_movie(&self.job, index, duration_secs)
    }

    pub fn cancel_movie(&self) {
        self.session.cancel();
    }

    pub fn movie_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn support_dir(&self) -> &Path {
        self.session.support_dir()
    }
}
