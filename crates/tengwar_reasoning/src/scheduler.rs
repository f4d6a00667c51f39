//! Thought pacing
//!
//! Computes the pause before the next daemon cycle: emotion-driven after a
//! success, the same pace plus exponential backoff after consecutive backend
//! failures.

use rand::Rng;
use std::time::Duration;
use tengwar_core::config::DaemonConfig;
use tengwar_core::EmotionalState;

/// State-aware scheduler for the thought loop.
pub struct ThoughtScheduler {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub jitter: Duration,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl ThoughtScheduler {
    pub fn from_config(config: &DaemonConfig) -> Self {
        let secs = |v: f64| Duration::from_secs_f64(v.max(0.0));
        let min_interval = secs(config.min_interval_secs);
        Self {
            min_interval,
            max_interval: secs(config.max_interval_secs).max(min_interval),
            jitter: secs(config.jitter_secs),
            backoff_base: secs(config.backoff_base_secs),
            max_backoff: secs(config.max_backoff_secs),
        }
    }

    /// Interval without jitter: `max` at tempo 0, `min` at tempo 1.
    pub fn base_interval(&self, state: &EmotionalState) -> Duration {
        let tempo = state.tempo().clamp(0.0, 1.0) as f64;
        let min = self.min_interval.as_secs_f64();
        let max = self.max_interval.as_secs_f64();
        Duration::from_secs_f64(max - (max - min) * tempo)
    }

    /// Pause after a successful thought, jittered, never below `min_interval`.
    pub fn next_interval(&self, state: &EmotionalState) -> Duration {
        let base = self.base_interval(state).as_secs_f64();
        let jitter = self.jitter.as_secs_f64();
        let offset = if jitter > 0.0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let secs = (base + offset).max(self.min_interval.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Pause after the `failures`-th consecutive failure: `base · 2^(k−1)`, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = (failures - 1).min(30);
        let secs = self.backoff_base.as_secs_f64() * 2f64.powi(exp as i32);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Pause after a backend failure. Always longer than any jittered
    /// success interval for the same state until the cap is reached.
    pub fn retry_interval(&self, state: &EmotionalState, failures: u32) -> Duration {
        let delay = self.base_interval(state) + self.jitter + self.backoff(failures);
        let cap = self.max_backoff.max(self.max_interval + self.jitter);
        delay.min(cap)
    }
}
