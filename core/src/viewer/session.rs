//! An open comic: decoded-page cache plus read-ahead around the page being shown.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, MemoryCache};
use crate::codec::DecodedImage;
use crate::config::ShelfConfig;
use crate::error::ShelfError;
use crate::pipeline::queue::PrefetchQueue;
use crate::pipeline::resize::shrink_to_fit;
use crate::stats::StatsCollector;
use crate::types::{CacheBudget, ComicId, ImageDimensions, ImageKey, PageId, PrefetchPolicy};

use super::Result;
use super::source::PageSource;

/// Cache and read-ahead settings for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewerOptions {
    pub budget: CacheBudget,
    pub prefetch: PrefetchPolicy,
    /// Decoded pages larger than this are downscaled before caching.
    pub viewport: Option<ImageDimensions>,
}

impl ViewerOptions {
    pub fn from_config(config: &ShelfConfig) -> Self {
        Self { budget: config.cache_budget(), prefetch: config.prefetch, viewport: config.viewport }
    }
}

#[derive(Debug)]
struct ViewerState {
    cache: MemoryCache,
    queue: PrefetchQueue,
    last_index: Option<u32>,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    stopped: bool,
}

/// Wakes a [`super::PrefetchWorker`] when a page request queues new read-ahead work.
#[derive(Debug, Default)]
pub(crate) struct PrefetchSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl PrefetchSignal {
    pub(crate) fn notify(&self) {
        self.state.lock().pending = true;
        self.condvar.notify_all();
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = SignalState::default();
    }

    pub(crate) fn stop(&self) {
        self.state.lock().stopped = true;
        self.condvar.notify_all();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Block until work is signalled. Returns `false` once stopped.
    pub(crate) fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        while !state.pending && !state.stopped {
            self.condvar.wait(&mut state);
        }
        if state.stopped {
            return false;
        }
        state.pending = false;
        true
    }
}

/// Page access for one open comic.
///
/// [`ComicViewer::page`] serves a page from the cache or decodes it, and re-plans the read-ahead
/// window around it. Queued neighbours are decoded by [`ComicViewer::run_prefetch`], either
/// inline or on a [`super::PrefetchWorker`].
#[derive(Debug)]
pub struct ComicViewer {
    comic: ComicId,
    source: Box<dyn PageSource>,
    options: ViewerOptions,
    stats: Arc<StatsCollector>,
    state: Mutex<ViewerState>,
    signal: Arc<PrefetchSignal>,
}

impl ComicViewer {
    pub fn new(
        comic: ComicId,
        source: Box<dyn PageSource>,
        options: ViewerOptions,
        stats: Arc<StatsCollector>,
    ) -> Self {
        let state = ViewerState {
            cache: MemoryCache::new(options.budget),
            queue: PrefetchQueue::new(),
            last_index: None,
        };
        Self {
            comic,
            source,
            options,
            stats,
            state: Mutex::new(state),
            signal: Arc::new(PrefetchSignal::default()),
        }
    }

    pub fn comic(&self) -> ComicId {
        self.comic
    }

    pub fn page_count(&self) -> u32 {
        self.source.page_count()
    }

    pub fn page_name(&self, index: u32) -> Option<&std::path::Path> {
        self.source.page_name(index)
    }

    /// The decoded frame of page `index`.
    pub fn page(&self, index: u32) -> Result<Arc<DecodedImage>> {
        let count = self.page_count();
        if index >= count {
            return Err(ShelfError::PageOutOfRange { index, count }.into());
        }

        let page = PageId { comic: self.comic, index };
        let key = ImageKey::for_page(&page);

        let cached = {
            let mut state = self.state.lock();
            let velocity = match state.last_index {
                Some(last) => index as f32 - last as f32,
                None => 1.0,
            };
            state.last_index = Some(index);
            state.queue.plan_window(&page, count, self.options.prefetch, velocity);
            self.stats.update_prefetch_pending(state.queue.len());
            state.cache.get(&key).map(|entry| Arc::clone(&entry.image))
        };
        self.signal.notify();

        self.stats.record_cache_lookup(cached.is_some());
        if let Some(image) = cached {
            return Ok(image);
        }

        let image = self.decode(index)?;
        self.store(page, key, Arc::clone(&image));
        Ok(image)
    }

    /// Decode up to `max_tasks` queued neighbours that are not cached yet. Returns the number of
    /// tasks taken from the queue.
    pub fn run_prefetch(&self, max_tasks: usize) -> usize {
        let mut taken = 0;
        while taken < max_tasks {
            let Some((token, task)) = self.state.lock().queue.next_task() else {
                break;
            };
            taken += 1;

            let key = ImageKey::for_page(&task.page);
            if !self.state.lock().cache.contains(&key) {
                match self.decode(task.page.index) {
                    Ok(image) => {
                        self.store(task.page, key, image);
                        self.stats.record_prefetched();
                    }
                    Err(err) => {
                        let page = task.page.index;
                        warn!(comic = %self.comic, page, error = ?err, "prefetch failed");
                    }
                }
            }

            let mut state = self.state.lock();
            state.queue.complete(&token);
            self.stats.update_prefetch_pending(state.queue.len());
        }
        taken
    }

    pub fn is_cached(&self, index: u32) -> bool {
        let key = ImageKey::for_page(&PageId { comic: self.comic, index });
        self.state.lock().cache.contains(&key)
    }

    /// Read-ahead tasks queued and not yet taken.
    pub fn pending_prefetch(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn cached_bytes(&self) -> usize {
        self.state.lock().cache.bytes_used()
    }

    pub(crate) fn signal(&self) -> Arc<PrefetchSignal> {
        Arc::clone(&self.signal)
    }

    fn decode(&self, index: u32) -> Result<Arc<DecodedImage>> {
        let started = Instant::now();
        let mut image = self.source.load(index)?;
        if let Some(bounds) = self.options.viewport {
            image = shrink_to_fit(image, bounds)?;
        }
        let elapsed = started.elapsed();
        self.stats.record_decode(elapsed);
        debug!(comic = %self.comic, page = index, ms = elapsed.as_millis() as u64, "decoded page");
        Ok(Arc::new(image))
    }

    fn store(&self, page: PageId, key: ImageKey, image: Arc<DecodedImage>) {
        let mut state = self.state.lock();
        if !state.cache.insert(key, CacheEntry::new(page, image)) {
            debug!(comic = %self.comic, page = page.index, "page exceeds the cache budget");
        }
        let budget = state.cache.budget().bytes_max as u64;
        self.stats.update_cache_usage(state.cache.bytes_used() as u64, budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::shelf_error;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Solid 2x2 pages, counting how often each is decoded.
    #[derive(Debug)]
    struct CountingSource {
        pages: u32,
        loads: AtomicUsize,
        fail_on: Option<u32>,
    }

    impl CountingSource {
        fn new(pages: u32) -> Self {
            Self { pages, loads: AtomicUsize::new(0), fail_on: None }
        }
    }

    impl PageSource for CountingSource {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn page_name(&self, _index: u32) -> Option<&Path> {
            None
        }

        fn load(&self, index: u32) -> Result<DecodedImage> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(index) {
                anyhow::bail!("corrupt page {index}");
            }
            Ok(DecodedImage {
                dimensions: ImageDimensions { width: 2, height: 2 },
                pixels: vec![index as u8; 16],
            })
        }
    }

    fn viewer(
        source: CountingSource,
        options: ViewerOptions,
    ) -> (Arc<ComicViewer>, Arc<StatsCollector>) {
        let stats = Arc::new(StatsCollector::new());
        let viewer = ComicViewer::new(ComicId(1), Box::new(source), options, Arc::clone(&stats));
        (Arc::new(viewer), stats)
    }

    #[test]
    fn repeated_requests_hit_the_cache() -> Result<()> {
        let (viewer, stats) = viewer(CountingSource::new(4), ViewerOptions::default());
        let first = viewer.page(0)?;
        let second = viewer.page(0)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.pixels()[0], 0);

        let snap = stats.snapshot();
        assert_eq!(snap.cache_requests, 2);
        assert!((snap.cache_hit_ratio - 0.5).abs() < f32::EPSILON);
        Ok(())
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        let (viewer, _) = viewer(CountingSource::new(2), ViewerOptions::default());
        let err = viewer.page(2).unwrap_err();
        assert!(matches!(
            shelf_error(&err),
            Some(ShelfError::PageOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn prefetch_fills_the_window_ahead() -> Result<()> {
        let options = ViewerOptions {
            prefetch: PrefetchPolicy { ahead: 2, behind: 1 },
            ..ViewerOptions::default()
        };
        let (viewer, _) = viewer(CountingSource::new(10), options);

        viewer.page(4)?;
        assert_eq!(viewer.pending_prefetch(), 3);
        assert_eq!(viewer.run_prefetch(usize::MAX), 3);

        for index in [3, 4, 5, 6] {
            assert!(viewer.is_cached(index), "page {index} should be cached");
        }
        assert!(!viewer.is_cached(7));
        assert_eq!(viewer.pending_prefetch(), 0);
        Ok(())
    }

    #[test]
    fn run_prefetch_respects_the_task_limit() -> Result<()> {
        let options = ViewerOptions {
            prefetch: PrefetchPolicy { ahead: 3, behind: 0 },
            ..ViewerOptions::default()
        };
        let (viewer, _) = viewer(CountingSource::new(10), options);
        viewer.page(0)?;
        assert_eq!(viewer.run_prefetch(1), 1);
        assert!(viewer.is_cached(1));
        assert_eq!(viewer.pending_prefetch(), 2);
        Ok(())
    }

    #[test]
    fn prefetch_failures_are_skipped() -> Result<()> {
        let mut source = CountingSource::new(5);
        source.fail_on = Some(1);
        let options = ViewerOptions {
            prefetch: PrefetchPolicy { ahead: 2, behind: 0 },
            ..ViewerOptions::default()
        };
        let (viewer, _) = viewer(source, options);

        viewer.page(0)?;
        assert_eq!(viewer.run_prefetch(8), 2);
        assert!(!viewer.is_cached(1));
        assert!(viewer.is_cached(2));
        assert!(viewer.page(1).is_err());
        Ok(())
    }

    #[test]
    fn budget_evicts_least_recently_used_pages() -> Result<()> {
        let options = ViewerOptions {
            budget: CacheBudget { bytes_max: 32 },
            prefetch: PrefetchPolicy { ahead: 0, behind: 0 },
            viewport: None,
        };
        let (viewer, stats) = viewer(CountingSource::new(5), options);

        viewer.page(0)?;
        viewer.page(1)?;
        viewer.page(0)?;
        viewer.page(2)?;

        assert!(viewer.is_cached(0));
        assert!(!viewer.is_cached(1));
        assert!(viewer.is_cached(2));
        assert_eq!(viewer.cached_bytes(), 32);
        assert_eq!(stats.snapshot().cache_bytes_used, 32);
        Ok(())
    }

    #[test]
    fn viewport_downscales_large_pages() -> Result<()> {
        #[derive(Debug)]
        struct Large;
        impl PageSource for Large {
            fn page_count(&self) -> u32 {
                1
            }
            fn page_name(&self, _index: u32) -> Option<&Path> {
                None
            }
            fn load(&self, _index: u32) -> Result<DecodedImage> {
                Ok(DecodedImage {
                    dimensions: ImageDimensions { width: 400, height: 200 },
                    pixels: vec![255; 400 * 200 * 4],
                })
            }
        }

        let options = ViewerOptions {
            viewport: Some(ImageDimensions { width: 100, height: 100 }),
            ..ViewerOptions::default()
        };
        let viewer = ComicViewer::new(ComicId(3), Box::new(Large), options, Arc::default());
        let page = viewer.page(0)?;
        assert_eq!(page.dimensions, ImageDimensions { width: 100, height: 50 });
        Ok(())
    }
}
