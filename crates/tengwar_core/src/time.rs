//! Temporal awareness: pure functions over timestamps.
//!
//! Nothing here reads the clock on its own; callers pass `now` so every
//! function stays deterministic under test.

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Qualitative size of a stretch of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Moments,
    Minutes,
    Hours,
    Days,
}

impl TimeBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Moments => "moments",
            TimeBucket::Minutes => "minutes",
            TimeBucket::Hours => "hours",
            TimeBucket::Days => "days",
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket thresholds and the decay multiplier each bucket carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeBuckets {
    /// Below this many seconds a gap is "moments".
    pub minutes_after_secs: u64,
    pub hours_after_secs: u64,
    pub days_after_secs: u64,
    pub multiplier_moments: f32,
    pub multiplier_minutes: f32,
    pub multiplier_hours: f32,
    pub multiplier_days: f32,
}

impl Default for TimeBuckets {
    fn default() -> Self {
        Self {
            minutes_after_secs: 60,
            hours_after_secs: 3600,
            days_after_secs: 86_400,
            multiplier_moments: 1.0,
            multiplier_minutes: 1.0,
            multiplier_hours: 1.5,
            multiplier_days: 2.0,
        }
    }
}

impl TimeBuckets {
    pub fn classify(&self, elapsed: Duration) -> TimeBucket {
        let secs = elapsed.as_secs();
        if secs >= self.days_after_secs {
            TimeBucket::Days
        } else if secs >= self.hours_after_secs {
            TimeBucket::Hours
        } else if secs >= self.minutes_after_secs {
            TimeBucket::Minutes
        } else {
            TimeBucket::Moments
        }
    }

    pub fn decay_multiplier(&self, bucket: TimeBucket) -> f32 {
        let m = match bucket {
            TimeBucket::Moments => self.multiplier_moments,
            TimeBucket::Minutes => self.multiplier_minutes,
            TimeBucket::Hours => self.multiplier_hours,
            TimeBucket::Days => self.multiplier_days,
        };
        if m.is_finite() {
            m.max(0.0)
        } else {
            1.0
        }
    }
}

/// Time elapsed from `then` to `now`; zero when `then` lies in the future.
pub fn elapsed_since(then: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

/// Elapsed time as fractional hours.
pub fn hours(d: Duration) -> f64 {
    d.as_secs_f64() / 3600.0
}

/// Human phrasing: "42 seconds", "5 minutes", "2h 10m", "3d 4h".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        format!("{} minutes", secs / 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

pub fn period_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "late night",
    }
}

/// Derived view of where "now" sits relative to first boot and the last conversation.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalContext {
    pub now: DateTime<Utc>,
    pub since_first_boot: Option<Duration>,
    pub since_last_interaction: Option<Duration>,
    pub silence: Option<TimeBucket>,
}

impl TemporalContext {
    pub fn derive(
        now: DateTime<Utc>,
        first_boot: Option<DateTime<Utc>>,
        last_interaction: Option<DateTime<Utc>>,
        buckets: &TimeBuckets,
    ) -> Self {
        let since_last_interaction = last_interaction.map(|t| elapsed_since(t, now));
        Self {
            now,
            since_first_boot: first_boot.map(|t| elapsed_since(t, now)),
            since_last_interaction,
            silence: since_last_interaction.map(|d| buckets.classify(d)),
        }
    }

    /// Multi-line description suitable for a prompt.
    pub fn describe(&self) -> String {
        let local = self.now.with_timezone(&Local);
        let mut lines = vec![format!(
            "Current time: {} ({})",
            local.format("%A, %B %d %Y, %H:%M"),
            period_of_day(local.hour())
        )];
        match self.since_first_boot {
            Some(d) => lines.push(format!("Alive for: {}", format_duration(d))),
            None => lines.push("This is the very first moment of existence.".to_string()),
        }
        match self.since_last_interaction {
            Some(d) => lines.push(format!("Last human interaction: {} ago", format_duration(d))),
            None => lines.push("No human has spoken yet.".to_string()),
        }
        lines.join("\n")
    }
}
