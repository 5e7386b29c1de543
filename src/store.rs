//! Cache of converted stills, keyed by preview index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::FrameSource;
use crate::error::AppError;
use crate::frame::{self, PreviewImage};
use crate::job::EncodeJob;

/// Stills are keyed by index only. Callers must [`purge`](Self::purge) after
/// changing settings that affect the picture.
pub struct PreviewImageStore<S: FrameSource> {
    source: Arc<S>,
    images_count: u32,
    images: HashMap<u32, Arc<PreviewImage>>,
}

impl<S: FrameSource> PreviewImageStore<S> {
    pub fn new(source: Arc<S>, images_count: u32) -> Self {
        source.set_seek_points(images_count);
        Self {
            source,
            images_count,
            images: HashMap::new(),
        }
    }

    pub fn images_count(&self) -> u32 {
        self.images_count
    }

    pub fn cached_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the still at `index`, extracting it on a miss. `Ok(None)` means
    /// the engine could not produce a frame. With `cache_result` false a fresh
    /// still is neither stored nor replaces a cached one.
    pub fn get_image(
        &mut self,
        job: &EncodeJob,
        index: u32,
        cache_result: bool,
    ) -> Result<Option<Arc<PreviewImage>>, AppError> {
        if index >= self.images_count {
            return Err(AppError::invalid_index(index, self.images_count));
        }

        if let Some(image) = self.images.get(&index) {
            log::trace!(target: "tiny_preview::store", "cache hit: index={}", index);
            return Ok(Some(Arc::clone(image)));
        }

        let deinterlace = job.filters.wants_deinterlace();
        let geometry = job.geometry.square_pixels();
        log::debug!(
            target: "tiny_preview::store",
            "extracting still: title={}, index={}, {}x{}, deinterlace={}",
            job.title.index,
            index,
            geometry.width,
            geometry.height,
            deinterlace
        );
        let raw = self.source.extract_frame(
            job.title.index,
            index,
            &geometry,
            &job.crop,
            deinterlace,
        );
        let Some(image) = frame::convert(raw.as_ref(), &geometry).map(Arc::new) else {
            log::warn!(
                target: "tiny_preview::store",
                "no frame available: title={}, index={}",
                job.title.index,
                index
            );
            return Ok(None);
        };

        if cache_result {
            self.images.insert(index, Arc::clone(&image));
        }
        Ok(Some(image))
    }

    pub fn purge(&mut self) {
        log::debug!(
            target: "tiny_preview::store",
            "purging {} cached still(s)",
            self.images.len()
        );
        self.images = HashMap::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use crate::job::{Container, CropRect, Geometry, sample_job};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<(u32, u32, Geometry, bool)>>,
        fail: bool,
    }

    impl FrameSource for CountingSource {
        fn extract_frame(
            &self,
            title_index: u32,
            preview_index: u32,
            geometry: &Geometry,
            _crop: &CropRect,
            deinterlace: bool,
        ) -> Option<RawFrame> {
            self.calls
                .lock()
                .push((title_index, preview_index, *geometry, deinterlace));
            if self.fail {
                return None;
            }
            let pixels = (geometry.width * geometry.height) as usize;
            let word = 0xFF_00_00_00u32 | preview_index;
            let data = std::iter::repeat_n(word.to_ne_bytes(), pixels)
                .flatten()
                .collect();
            Some(RawFrame::packed(geometry.width, geometry.height, data))
        }
    }

    fn small_job() -> EncodeJob {
        let mut job = sample_job(Container::Mp4);
        job.geometry = Geometry {
            width: 4,
            height: 2,
            par_num: 32,
            par_den: 27,
        };
        job
    }

    #[test]
    fn extraction_requests_square_pixels_and_title() {
        let source = Arc::new(CountingSource::default());
        let mut store = PreviewImageStore::new(Arc::clone(&source), 10);
        let image = store
            .get_image(&small_job(), 2, true)
            .expect("valid index")
            .expect("frame");
        assert_eq!((image.width(), image.height()), (4, 2));
        assert_eq!(&image.rgb()[..3], &[0, 0, 2]);

        let calls = source.calls.lock();
        assert_eq!(calls.len(), 1);
        let (title, index, geometry, deinterlace) = calls[0];
        assert_eq!((title, index), (1, 2));
        assert_eq!((geometry.par_num, geometry.par_den), (1, 1));
        assert!(!deinterlace);
    }

    #[test]
    fn decomb_enables_deinterlaced_extraction() {
        let source = Arc::new(CountingSource::default());
        let mut store = PreviewImageStore::new(Arc::clone(&source), 10);
        let mut job = small_job();
        job.filters.decomb = true;
        store.get_image(&job, 0, true).expect("valid index");
        assert!(source.calls.lock()[0].3);
    }

    #[test]
    fn uncached_request_extracts_every_time() {
        let source = Arc::new(CountingSource::default());
        let mut store = PreviewImageStore::new(Arc::clone(&source), 10);
        let job = small_job();
        let a = store.get_image(&job, 1, false).expect("ok").expect("frame");
        let b = store.get_image(&job, 1, false).expect("ok").expect("frame");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.cached_count(), 0);
        assert_eq!(source.calls.lock().len(), 2);
    }

    #[test]
    fn failed_extraction_is_not_cached() {
        let source = Arc::new(CountingSource {
            fail: true,
            ..CountingSource::default()
        });
        let mut store = PreviewImageStore::new(Arc::clone(&source), 10);
        let result = store.get_image(&small_job(), 3, true).expect("valid index");
        assert!(result.is_none());
        assert_eq!(store.cached_count(), 0);
    }

    #[test]
    fn out_of_range_index_is_rejected_without_extraction() {
        let source = Arc::new(CountingSource::default());
        let mut store = PreviewImageStore::new(Arc::clone(&source), 10);
        let err = store.get_image(&small_job(), 10, true).expect_err("invalid");
        assert!(matches!(
            err,
            AppError::InvalidIndex {
                index: 10,
                count: 10
            }
        ));
        assert!(source.calls.lock().is_empty());
    }
}
