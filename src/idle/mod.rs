//! Idle-shutdown policy for the GPU host.
//!
//! Samples the visible queue depth on a fixed cadence and stops the host
//! after a full window of consecutive idle samples. Leased messages are
//! invisible to the depth gauge, so the detector cannot fire while a job
//! is being processed.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;
use crate::services::{host::HostController, queue::JobQueue};

/// Counts consecutive idle depth samples. Fires once when the window
/// completes, then starts over.
pub struct IdleTracker {
    required: u32,
    threshold: u64,
    streak: u32,
}

impl IdleTracker {
    pub fn new(required: u32, threshold: u64) -> Self {
        Self {
            required: required.max(1),
            threshold,
            streak: 0,
        }
    }

    /// Record one depth sample. Returns true when the idle window
    /// completes.
    pub fn observe(&mut self, depth: u64) -> bool {
        if depth <= self.threshold {
            self.streak += 1;
            if self.streak >= self.required {
                self.streak = 0;
                return true;
            }
        } else {
            self.streak = 0;
        }
        false
    }

    /// A failed sample: unknown depth never counts toward shutdown.
    pub fn sample_failed(&mut self) {
        self.streak = 0;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Sampling loop. Runs until ctrl-c.
pub async fn run(queue: Arc<JobQueue>, host: Arc<HostController>, config: &AppConfig) {
    let mut tracker = IdleTracker::new(config.idle_periods, config.idle_threshold);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.idle_sample));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping idle detector");
                break;
            }
            _ = ticker.tick() => {
                match queue.depth().await {
                    Ok(depth) => {
                        metrics::gauge!("dispatch_queue_depth").set(depth as f64);
                        tracing::debug!(depth, streak = tracker.streak(), "queue depth sampled");
                        if tracker.observe(depth) {
                            tracing::info!(
                                periods = config.idle_periods,
                                sample_secs = config.idle_sample,
                                "queue idle for the full window, stopping host"
                            );
                            match host.stop().await {
                                Ok(host_state) => {
                                    tracing::info!(observed = %host_state, "host stop processed");
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "host stop failed, will retry after another idle window");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "queue depth sample failed");
                        tracker.sample_failed();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_the_full_window() {
        let mut tracker = IdleTracker::new(6, 0);
        for _ in 0..5 {
            assert!(!tracker.observe(0));
        }
        assert!(tracker.observe(0));
    }

    #[test]
    fn busy_sample_resets_the_streak() {
        let mut tracker = IdleTracker::new(3, 0);
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(4));
        // Window restarts: needs three more idle samples.
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(0));
        assert!(tracker.observe(0));
    }

    #[test]
    fn fires_once_then_starts_a_new_window() {
        let mut tracker = IdleTracker::new(2, 0);
        assert!(!tracker.observe(0));
        assert!(tracker.observe(0));
        // The next sample must not fire again immediately.
        assert!(!tracker.observe(0));
        assert!(tracker.observe(0));
    }

    #[test]
    fn failed_sample_resets_the_streak() {
        let mut tracker = IdleTracker::new(2, 0);
        assert!(!tracker.observe(0));
        tracker.sample_failed();
        assert!(!tracker.observe(0));
        assert!(tracker.observe(0));
    }

    #[test]
    fn threshold_bounds_what_counts_as_idle() {
        let mut tracker = IdleTracker::new(2, 1);
        assert!(!tracker.observe(1));
        assert!(tracker.observe(0));

        let mut tracker = IdleTracker::new(2, 1);
        assert!(!tracker.observe(1));
        assert!(!tracker.observe(2));
        assert!(!tracker.observe(1));
        assert!(tracker.observe(1));
    }

    #[test]
    fn zero_period_config_still_requires_one_sample() {
        let mut tracker = IdleTracker::new(0, 0);
        assert!(tracker.observe(0));
    }
}
