//! Read-ahead planning for the page viewer.
//!
//! Every page request re-centres the window: pages inside `PrefetchPolicy` around the current
//! page are queued by closeness, biased towards the direction the reader is moving.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{PageId, PrefetchPolicy, RequestToken};

/// Velocity beyond this many pages per step adds no further bias.
const MAX_SPEED: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchTask {
    pub page: PageId,
    /// Signed offset from the page being read; positive is ahead.
    pub distance: i32,
    pub priority: f64,
}

/// Pages waiting to be decoded, best first, plus the tasks handed out to a worker.
#[derive(Debug, Default)]
pub struct PrefetchQueue {
    pending: VecDeque<PrefetchTask>,
    in_flight: HashMap<RequestToken, PageId>,
    last_token: u64,
}

impl PrefetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Replace the pending tasks with the window around `center`. `velocity` is the signed page
    /// delta of the latest navigation step. Pages already handed out are left alone.
    pub fn plan_window(
        &mut self,
        center: &PageId,
        total_pages: u32,
        policy: PrefetchPolicy,
        velocity: f32,
    ) {
        self.pending.clear();
        if total_pages == 0 {
            return;
        }

        let busy: HashSet<PageId> = self.in_flight.values().copied().collect();
        let first = center.index.saturating_sub(policy.behind);
        let last = center.index.saturating_add(policy.ahead).min(total_pages - 1);

        let mut tasks: Vec<PrefetchTask> = (first..=last)
            .filter(|&index| index != center.index)
            .filter_map(|index| {
                let page = PageId { comic: center.comic, index };
                let distance = index as i32 - center.index as i32;
                let priority = priority(distance, velocity);
                (priority > 0.0 && !busy.contains(&page))
                    .then_some(PrefetchTask { page, distance, priority })
            })
            .collect();

        // Ties go to the page ahead of the reader.
        tasks.sort_by(|a, b| {
            b.priority.total_cmp(&a.priority).then_with(|| b.distance.cmp(&a.distance))
        });
        self.pending = tasks.into();
    }

    /// Take the best pending task. The page stays reserved until the token is completed.
    pub fn next_task(&mut self) -> Option<(RequestToken, PrefetchTask)> {
        let task = self.pending.pop_front()?;
        self.last_token = self.last_token.wrapping_add(1).max(1);
        let token = RequestToken::new(self.last_token);
        self.in_flight.insert(token, task.page);
        Some((token, task))
    }

    /// Release a task handed out by [`next_task`](Self::next_task). Returns `false` for unknown
    /// or already released tokens.
    pub fn complete(&mut self, token: &RequestToken) -> bool {
        self.in_flight.remove(token).is_some()
    }

    pub fn cancel(&mut self, token: &RequestToken) -> bool {
        self.complete(token)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Closer pages score higher; pages in the direction of travel get up to half a point extra and
/// pages behind lose as much.
fn priority(distance: i32, velocity: f32) -> f64 {
    let closeness = 1.0 / (f64::from(distance.unsigned_abs()) + 1.0);
    let speed = f64::from(velocity.abs()).min(MAX_SPEED);
    let aligned = if velocity == 0.0 {
        0.0
    } else {
        f64::from(distance.signum()) * f64::from(velocity.signum())
    };
    let score = closeness + aligned * speed / (2.0 * MAX_SPEED);
    if score.is_finite() { score.max(0.0) } else { 0.0 }
}
