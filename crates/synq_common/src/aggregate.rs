//! Aggregation Engine
//!
//! Turns raw activity labels into ranked counts, and ranked counts into the
//! percentage / elapsed-time shares the dashboard shows.
//!
//! Ranking: count descending, ties broken by the first occurrence of the
//! label in the input. The relational driver reproduces the same order
//! store-side, so both backends rank identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ActivityCount;

/// Interval the collectors sample at unless configured otherwise
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 5;

/// Count occurrences of each label, ranked by count then first occurrence.
pub fn count_labels<I, S>(labels: I) -> Vec<ActivityCount>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<ActivityCount> = Vec::new();

    for label in labels {
        let label = label.as_ref();
        match index.get(label) {
            Some(&slot) => counts[slot].samples += 1,
            None => {
                index.insert(label.to_string(), counts.len());
                counts.push(ActivityCount::new(label, 1));
            }
        }
    }

    // Stable sort keeps first-occurrence order among equal counts
    counts.sort_by(|a, b| b.samples.cmp(&a.samples));
    counts
}

/// `count / total * 100`, rounded to two decimals. Zero total yields zero.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Time represented by a number of fixed-interval samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElapsedTime {
    pub total_seconds: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl ElapsedTime {
    pub fn from_samples(samples: u64, interval_secs: u64) -> Self {
        let total_seconds = samples.saturating_mul(interval_secs);
        Self {
            total_seconds,
            hours: total_seconds / 3600,
            minutes: (total_seconds % 3600) / 60,
        }
    }

    /// "2h 05m" style, used by the CLI
    pub fn short(&self) -> String {
        format!("{}h {:02}m", self.hours, self.minutes)
    }
}

/// One label's share of the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityShare {
    /// Presentation label ("Unknown" for empty windows)
    pub label: String,
    pub samples: u64,
    pub percentage: f64,
    pub elapsed: ElapsedTime,
}

/// Dashboard-ready view of an aggregation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub total_samples: u64,
    pub sample_interval_secs: u64,
    pub total_elapsed: ElapsedTime,
    pub shares: Vec<ActivityShare>,
}

impl ActivitySummary {
    pub fn from_counts(counts: &[ActivityCount], sample_interval_secs: u64) -> Self {
        let total_samples: u64 = counts.iter().map(|c| c.samples).sum();

        let shares = counts
            .iter()
            .map(|c| ActivityShare {
                label: c.display_label().to_string(),
                samples: c.samples,
                percentage: percentage(c.samples, total_samples),
                elapsed: ElapsedTime::from_samples(c.samples, sample_interval_secs),
            })
            .collect();

        Self {
            total_samples,
            sample_interval_secs,
            total_elapsed: ElapsedTime::from_samples(total_samples, sample_interval_secs),
            shares,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}
