//! Duplicate suppression keyed on the packet checksum.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// How long a checksum suppresses repeats.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Checksums seen recently, with their first arrival time.
#[derive(Clone)]
pub struct DedupHistory {
    seen: Arc<DashMap<u32, Instant>>,
    window: Duration,
}

impl DedupHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            window,
        }
    }

    /// Record an arrival. Returns true if the checksum is new, or its last
    /// record has aged out of the window.
    pub fn check_and_record(&self, checksum: u32) -> bool {
        let now = Instant::now();
        let mut fresh = true;
        self.seen
            .entry(checksum)
            .and_modify(|first_seen| {
                if now.duration_since(*first_seen) < self.window {
                    fresh = false;
                } else {
                    *first_seen = now;
                }
            })
            .or_insert(now);
        fresh
    }

    /// Drop every entry older than the window. Returns how many went.
    pub fn sweep(&self) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen.retain(|_, first_seen| first_seen.elapsed() < window);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Sweep every window/10 until shutdown.
    pub async fn sweep_loop(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.window / 10);
        loop {
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = interval.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        tracing::trace!(removed, remaining = self.len(), "swept dedup history");
                    }
                }
            }
        }
    }
}

impl Default for DedupHistory {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn repeat_within_window_is_suppressed() {
        let history = DedupHistory::default();
        assert!(history.check_and_record(0xdead_beef));
        assert!(!history.check_and_record(0xdead_beef));
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!history.check_and_record(0xdead_beef));
        assert!(history.check_and_record(0x1234));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_after_window_is_fresh() {
        let history = DedupHistory::default();
        assert!(history.check_and_record(7));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(history.check_and_record(7));
        assert!(!history.check_and_record(7));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_only_stale_entries() {
        let history = DedupHistory::default();
        history.check_and_record(1);
        tokio::time::advance(Duration::from_secs(6)).await;
        history.check_and_record(2);
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(history.sweep(), 1);
        assert_eq!(history.len(), 1);
        assert!(!history.check_and_record(2));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_loop_stops_on_shutdown() {
        let history = DedupHistory::default();
        history.check_and_record(1);
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(history.clone().sweep_loop(rx));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(history.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
