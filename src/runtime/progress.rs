use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts claims discovered by the current recovery cycle and how many of
/// them have reached a terminal pipeline outcome.
///
/// Both counters are reset at the start of every cycle. `resumed` only moves
/// forward, once per input, and never exceeds `discovered` for a well-formed
/// cycle.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    discovered: AtomicUsize,
    resumed: AtomicUsize,
    cycle_open: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub discovered: usize,
    pub resumed: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.cycle_open.store(false, Ordering::SeqCst);
        self.discovered.store(0, Ordering::SeqCst);
        self.resumed.store(0, Ordering::SeqCst);
    }

    pub fn track_discovered(&self, count: usize) {
        self.discovered.store(count, Ordering::SeqCst);
        self.cycle_open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn track_resumed(&self) {
        self.resumed.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn discovered(&self) -> usize {
        self.discovered.load(Ordering::SeqCst)
    }

    pub fn resumed(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            discovered: self.discovered(),
            resumed: self.resumed(),
        }
    }

    /// True once the current cycle recorded its discovered count and every
    /// discovered claim has been resumed.
    pub fn is_caught_up(&self) -> bool {
        self.cycle_open.load(Ordering::SeqCst) && self.resumed() >= self.discovered()
    }

    /// Resolves once [`ProgressTracker::is_caught_up`] holds.
    pub async fn wait_until_resumed(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_caught_up() {
                return;
            }
            notified.await;
        }
    }
}
