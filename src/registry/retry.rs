//! Escalating, externally resettable retry delays.
//!
//! Reconciliation is level-triggered on a coarse poll interval. The ladder
//! lets a resource that was just unblocked by a dependency converge within a
//! second or two, without polling fast forever: each consecutive failure
//! climbs one rung until the counter reaches its cap, after which the poll
//! interval applies. Dependency events reset the counter.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Delay table for the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay at counter 0.
    pub very_short: Duration,
    /// Delay while the counter is below the cap.
    pub short: Duration,
    /// Delay at the cap.
    pub poll_interval: Duration,
    /// Counter ceiling.
    pub cap: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            very_short: Duration::from_secs(1),
            short: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
            cap: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay for a counter value.
    pub fn delay_for(&self, counter: u32) -> Duration {
        if counter == 0 {
            self.very_short
        } else if counter < self.cap {
            self.short
        } else {
            self.poll_interval
        }
    }
}

/// Ladder statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LadderStats {
    pub entries: usize,
    /// Entries whose counter reached the cap.
    pub saturated: usize,
}

/// Per-resource retry counters.
#[derive(Debug, Default)]
pub struct RetryLadder {
    policy: RetryPolicy,
    counters: Mutex<HashMap<String, u32>>,
}

impl RetryLadder {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before the next attempt for `name`, climbing one rung.
    ///
    /// Unknown names start at the bottom of the ladder.
    pub fn next_delay(&self, name: &str) -> Duration {
        let mut counters = self.counters.lock();
        let counter = counters.entry(name.to_string()).or_insert(0);
        let delay = self.policy.delay_for(*counter);
        if *counter < self.policy.cap {
            *counter += 1;
        }
        delay
    }

    /// Back to the bottom rung.
    pub fn reset(&self, name: &str) {
        self.counters.lock().insert(name.to_string(), 0);
    }

    /// Create an entry at the bottom rung unless one exists.
    pub fn track(&self, name: &str) {
        self.counters.lock().entry(name.to_string()).or_insert(0);
    }

    pub fn forget(&self, name: &str) {
        self.counters.lock().remove(name);
    }

    pub fn counter(&self, name: &str) -> Option<u32> {
        self.counters.lock().get(name).copied()
    }

    pub fn stats(&self) -> LadderStats {
        let counters = self.counters.lock();
        LadderStats {
            entries: counters.len(),
            saturated: counters.values().filter(|c| **c >= self.policy.cap).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_escalates_then_caps() {
        let ladder = RetryLadder::new(RetryPolicy::default());
        let delays: Vec<u64> = (0..5).map(|_| ladder.next_delay("scope/default/ipam.ni1").as_secs()).collect();
        assert_eq!(delays, vec![1, 5, 5, 60, 60]);
        assert_eq!(ladder.counter("scope/default/ipam.ni1"), Some(3));
    }

    #[test]
    fn test_reset_returns_to_bottom() {
        let ladder = RetryLadder::new(RetryPolicy::default());
        for _ in 0..4 {
            ladder.next_delay("claim/default/ipam.ni1.c1");
        }
        ladder.reset("claim/default/ipam.ni1.c1");
        assert_eq!(ladder.next_delay("claim/default/ipam.ni1.c1"), Duration::from_secs(1));
    }

    #[test]
    fn test_track_does_not_reset() {
        let ladder = RetryLadder::new(RetryPolicy::default());
        ladder.next_delay("a");
        ladder.next_delay("a");
        ladder.track("a");
        assert_eq!(ladder.counter("a"), Some(2));
        ladder.track("b");
        assert_eq!(ladder.counter("b"), Some(0));
        ladder.forget("b");
        assert_eq!(ladder.counter("b"), None);
    }

    #[test]
    fn test_stats() {
        let ladder = RetryLadder::new(RetryPolicy {
            cap: 1,
            ..Default::default()
        });
        ladder.next_delay("a");
        ladder.track("b");
        let stats = ladder.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.saturated, 1);
    }
}
