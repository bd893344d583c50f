//! Background thread that decodes read-ahead pages for a viewer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use tracing::{debug, warn};

use super::Result;
use super::session::{ComicViewer, PrefetchSignal};

/// Tasks decoded between checks of the stop flag.
const DEFAULT_BATCH: usize = 2;

/// Drains a viewer's prefetch queue whenever a page request signals new work. The thread stops
/// on [`PrefetchWorker::stop`] or when the worker is dropped.
#[derive(Debug)]
pub struct PrefetchWorker {
    signal: Arc<PrefetchSignal>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchWorker {
    pub fn spawn(viewer: Arc<ComicViewer>) -> Result<Self> {
        Self::spawn_with_batch(viewer, DEFAULT_BATCH)
    }

    pub fn spawn_with_batch(viewer: Arc<ComicViewer>, batch: usize) -> Result<Self> {
        let signal = viewer.signal();
        signal.reset();
        let thread_signal = Arc::clone(&signal);
        let batch = batch.max(1);

        let handle = thread::Builder::new()
            .name(format!("shelf-prefetch-{}", viewer.comic()))
            .spawn(move || {
                debug!(comic = %viewer.comic(), "prefetch worker started");
                while thread_signal.wait_for_work() {
                    while !thread_signal.is_stopped() && viewer.run_prefetch(batch) > 0 {}
                }
                debug!(comic = %viewer.comic(), "prefetch worker stopped");
            })
            .context("spawning prefetch worker")?;

        Ok(Self { signal, handle: Some(handle) })
    }

    /// Ask the thread to finish and wait for it.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("prefetch worker panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PrefetchWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::codec::DecodedImage;
    use crate::stats::StatsCollector;
    use crate::types::{ComicId, ImageDimensions, PrefetchPolicy};
    use crate::viewer::{PageSource, ViewerOptions};

    #[derive(Debug)]
    struct Blank(u32);

    impl PageSource for Blank {
        fn page_count(&self) -> u32 {
            self.0
        }

        fn page_name(&self, _index: u32) -> Option<&std::path::Path> {
            None
        }

        fn load(&self, _index: u32) -> Result<DecodedImage> {
            Ok(DecodedImage {
                dimensions: ImageDimensions { width: 1, height: 1 },
                pixels: vec![0; 4],
            })
        }
    }

    fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn worker_decodes_pages_after_a_request() -> Result<()> {
        let options = ViewerOptions {
            prefetch: PrefetchPolicy { ahead: 3, behind: 0 },
            ..ViewerOptions::default()
        };
        let stats = Arc::new(StatsCollector::new());
        let source = Box::new(Blank(10));
        let viewer = Arc::new(ComicViewer::new(ComicId(5), source, options, Arc::clone(&stats)));
        let mut worker = PrefetchWorker::spawn(Arc::clone(&viewer))?;
        assert!(worker.is_running());

        viewer.page(0)?;
        assert!(wait_until(|| (1..=3).all(|index| viewer.is_cached(index))));
        assert!(wait_until(|| stats.snapshot().prefetched_pages == 3));

        worker.stop();
        assert!(!worker.is_running());
        Ok(())
    }

    #[test]
    fn dropping_the_worker_stops_the_thread() -> Result<()> {
        let viewer = Arc::new(ComicViewer::new(
            ComicId(6),
            Box::new(Blank(2)),
            ViewerOptions::default(),
            Arc::default(),
        ));
        let worker = PrefetchWorker::spawn(Arc::clone(&viewer))?;
        drop(worker);
        assert_eq!(Arc::strong_count(&viewer), 1);
        Ok(())
    }
}
