//! Runtime counters for the page viewer and the folder scanner.
//!
//! Viewers report decode latency, cache lookups, and read-ahead progress; the library reports
//! scan totals. `shelf stats` prints [`StatsCollector::snapshot`] as JSON.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::library::ScanReport;

/// Decode timings kept for the latency percentiles.
const LATENCY_SAMPLES: usize = 240;

/// Ring of the most recent decode timings in milliseconds.
#[derive(Debug)]
struct LatencyWindow(VecDeque<f32>);

impl LatencyWindow {
    fn record(&mut self, ms: f32) {
        if self.0.len() == LATENCY_SAMPLES {
            self.0.pop_front();
        }
        self.0.push_back(ms);
    }

    /// Nearest-rank percentile; zero before the first sample.
    fn percentile(&self, quantile: f32) -> f32 {
        let mut sorted: Vec<f32> = self.0.iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_by(f32::total_cmp);
        let rank = (quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f32).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }
}

#[derive(Debug)]
struct Counters {
    started_at: Instant,
    decode_ms: LatencyWindow,
    cache_requests: u64,
    cache_hits: u64,
    cache_bytes_used: u64,
    cache_bytes_capacity: u64,
    prefetch_pending: usize,
    prefetched_pages: u64,
    scans_completed: u64,
    comics_discovered: u64,
    comics_added: u64,
    comics_removed: u64,
    files_skipped: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            decode_ms: LatencyWindow(VecDeque::with_capacity(LATENCY_SAMPLES)),
            cache_requests: 0,
            cache_hits: 0,
            cache_bytes_used: 0,
            cache_bytes_capacity: 0,
            prefetch_pending: 0,
            prefetched_pages: 0,
            scans_completed: 0,
            comics_discovered: 0,
            comics_added: 0,
            comics_removed: 0,
            files_skipped: 0,
        }
    }
}

/// Counters shared by a library, its viewers, and the scan scheduler.
#[derive(Debug, Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decode(&self, duration: Duration) {
        self.counters.lock().decode_ms.record(duration.as_secs_f32() * 1_000.0);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let mut counters = self.counters.lock();
        counters.cache_requests += 1;
        counters.cache_hits += u64::from(hit);
    }

    pub fn update_cache_usage(&self, used_bytes: u64, capacity_bytes: u64) {
        let mut counters = self.counters.lock();
        counters.cache_bytes_used = used_bytes;
        counters.cache_bytes_capacity = capacity_bytes;
    }

    pub fn update_prefetch_pending(&self, pending: usize) {
        self.counters.lock().prefetch_pending = pending;
    }

    pub fn record_prefetched(&self) {
        self.counters.lock().prefetched_pages += 1;
    }

    pub fn record_scan(&self, report: &ScanReport) {
        let mut counters = self.counters.lock();
        counters.scans_completed += 1;
        counters.comics_discovered += report.discovered as u64;
        counters.comics_added += report.added as u64;
        counters.comics_removed += report.removed as u64;
        counters.files_skipped += report.skipped as u64;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock();
        let hit_ratio = match counters.cache_requests {
            0 => 0.0,
            requests => counters.cache_hits as f32 / requests as f32,
        };

        StatsSnapshot {
            timestamp_ms: crate::now_ms(),
            uptime_ms: counters.started_at.elapsed().as_millis() as u64,
            decode_time_ms_p50: counters.decode_ms.percentile(0.50),
            decode_time_ms_p95: counters.decode_ms.percentile(0.95),
            cache_hit_ratio: hit_ratio,
            cache_requests: counters.cache_requests,
            cache_bytes_used: counters.cache_bytes_used,
            cache_bytes_capacity: counters.cache_bytes_capacity,
            prefetch_pending: counters.prefetch_pending,
            prefetched_pages: counters.prefetched_pages,
            scans_completed: counters.scans_completed,
            comics_discovered: counters.comics_discovered,
            comics_added: counters.comics_added,
            comics_removed: counters.comics_removed,
            files_skipped: counters.files_skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp_ms: i64,
    pub uptime_ms: u64,
    pub decode_time_ms_p50: f32,
    pub decode_time_ms_p95: f32,
    pub cache_hit_ratio: f32,
    pub cache_requests: u64,
    pub cache_bytes_used: u64,
    pub cache_bytes_capacity: u64,
    pub prefetch_pending: usize,
    pub prefetched_pages: u64,
    pub scans_completed: u64,
    pub comics_discovered: u64,
    pub comics_added: u64,
    pub comics_removed: u64,
    pub files_skipped: u64,
}
