//! Background folder scans.
//!
//! [`ScanScheduler`] owns one worker thread that runs [`Library::scan_folder`] for queued roots in
//! FIFO order. A root that is already waiting is not queued twice.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::Result;
use crate::library::{Library, ScanReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running(PathBuf),
}

/// Result of the most recent scan of a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(ScanReport),
    /// The scan failed; holds the rendered error chain.
    Failed(String),
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: VecDeque<PathBuf>,
    running: Option<PathBuf>,
    outcomes: HashMap<PathBuf, JobOutcome>,
    shutdown: bool,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_none()
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<SchedulerState>,
    work: Condvar,
    idle: Condvar,
}

#[derive(Debug)]
pub struct ScanScheduler {
    library: Arc<Library>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ScanScheduler {
    pub fn start(library: Arc<Library>) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker_library = Arc::clone(&library);

        let handle = thread::Builder::new()
            .name("shelf-scan".into())
            .spawn(move || run_worker(&worker_library, &worker_shared))
            .context("spawning scan worker")?;

        Ok(Self { library, shared, handle: Some(handle) })
    }

    /// Queue a scan of `root`. Returns `false` when that root is already waiting or the scheduler
    /// has shut down.
    pub fn enqueue(&self, root: &Path) -> bool {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let mut state = self.shared.state.lock();
        if state.shutdown || state.queue.contains(&root) {
            return false;
        }
        debug!(root = %root.display(), "queued scan");
        state.queue.push_back(root);
        self.shared.work.notify_one();
        true
    }

    /// Queue every granted folder; returns how many were newly queued.
    pub fn enqueue_all(&self) -> Result<usize> {
        let folders = self.library.folders()?;
        Ok(folders.iter().filter(|folder| self.enqueue(&folder.root)).count())
    }

    pub fn status(&self) -> JobStatus {
        match &self.shared.state.lock().running {
            Some(root) => JobStatus::Running(root.clone()),
            None => JobStatus::Idle,
        }
    }

    /// Roots waiting to be scanned, excluding the one running.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn last_report(&self, root: &Path) -> Option<JobOutcome> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        self.shared.state.lock().outcomes.get(&root).cloned()
    }

    /// Block until nothing is queued or running. Returns `false` if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Drop queued work, let the running scan finish, and join the worker.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.queue.clear();
        }
        self.shared.work.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("scan worker panicked");
            }
        }
    }
}

impl Drop for ScanScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(library: &Library, shared: &Shared) {
    info!("scan worker started");
    loop {
        let root = {
            let mut state = shared.state.lock();
            while state.queue.is_empty() && !state.shutdown {
                shared.work.wait(&mut state);
            }
            if state.shutdown {
                break;
            }
            let Some(root) = state.queue.pop_front() else {
                continue;
            };
            state.running = Some(root.clone());
            root
        };

        let outcome = match library.scan_folder(&root) {
            Ok(report) => JobOutcome::Completed(report),
            Err(err) => {
                warn!(root = %root.display(), error = ?err, "background scan failed");
                JobOutcome::Failed(format!("{err:#}"))
            }
        };

        let mut state = shared.state.lock();
        state.running = None;
        state.outcomes.insert(root, outcome);
        if state.is_idle() {
            shared.idle.notify_all();
        }
    }

    let mut state = shared.state.lock();
    state.running = None;
    shared.idle.notify_all();
    info!("scan worker stopped");
}
