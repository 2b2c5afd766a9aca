//! Minimum-interval enforcement for token polling.
//!
//! Kept apart from the device code record so polling the record itself stays
//! free of side effects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Last accepted poll per device code.
#[derive(Debug)]
pub struct PollLimiter {
    interval: Duration,
    last_poll: DashMap<String, Instant>,
}

impl PollLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: DashMap::new(),
        }
    }

    /// Record a poll at `now`. Returns `false` when the previous accepted poll
    /// was less than one interval ago; the timestamp is left unchanged then.
    pub fn check_at(&self, device_code: &str, now: Instant) -> bool {
        match self.last_poll.entry(device_code.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                if now.saturating_duration_since(*slot.get()) < self.interval {
                    return false;
                }
                slot.insert(now);
                true
            }
        }
    }

    pub fn check(&self, device_code: &str) -> bool {
        self.check_at(device_code, Instant::now())
    }

    /// Forget a code, e.g. once its token has been handed out.
    pub fn forget(&self, device_code: &str) {
        self.last_poll.remove(device_code);
    }

    /// Drop entries idle for longer than `max_idle`.
    pub fn prune(&self, max_idle: Duration) {
        let now = Instant::now();
        self.last_poll
            .retain(|_, last| now.saturating_duration_since(*last) <= max_idle);
    }

    pub fn len(&self) -> usize {
        self.last_poll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_poll.is_empty()
    }

    /// Spawn a periodic prune task.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        every: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                limiter.prune(max_idle);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_is_always_accepted() {
        let limiter = PollLimiter::new(Duration::from_secs(5));
        assert!(limiter.check("d1"));
        assert!(limiter.check("d2"));
    }

    #[test]
    fn polls_inside_interval_are_rejected() {
        let limiter = PollLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(limiter.check_at("d1", t0));
        assert!(!limiter.check_at("d1", t0 + Duration::from_secs(2)));
        // A rejected poll does not push the window forward.
        assert!(limiter.check_at("d1", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn forget_and_prune_drop_entries() {
        let limiter = PollLimiter::new(Duration::from_secs(5));
        limiter.check("d1");
        limiter.check("d2");
        limiter.forget("d1");
        assert_eq!(limiter.len(), 1);
        limiter.prune(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        limiter.prune(Duration::ZERO);
        assert!(limiter.is_empty());
    }
}
